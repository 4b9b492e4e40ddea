//! Append-only commitment accumulator.
//!
//! This crate provides the fixed-depth note commitment tree, incremental
//! witnesses for individual leaves and authentication paths that can be
//! verified against a root or advanced as later leaves arrive.

pub mod error;
pub mod hash;
pub mod path;
pub mod tree;
pub mod witness;

pub use error::AccumError;
pub use hash::{compress_nodes, Blake2bCombine, Combine, Node, TreeHasher};
pub use path::{AuthPath, IndexCursor};
pub use tree::Tree;
pub use witness::Witness;
