//! Ledger node: configuration, logging, the chain collaborator and the
//! block processor tying ledger state, wallet and checkpoints together.

pub mod chain;
pub mod config;
pub mod error;
pub mod handle;
pub mod node;
pub mod telemetry;

pub use chain::{Chain, Header, MemChain};
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use handle::{Snapshot, StateHandle};
pub use node::Node;
