//! Ledger primitives: keys, assets, outputs, transactions, canonical
//! encodings, digests and protocol parameters.

pub mod types;
pub mod encode;
pub mod digest;
pub mod error;
pub mod params;
pub mod wire;

// Re-export all public items from modules for convenience
pub use types::*;
pub use encode::*;
pub use digest::*;
pub use error::*;
pub use wire::*;
