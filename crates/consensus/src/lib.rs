//! Ledger state, transaction validation and block processing.

pub mod balance;
pub mod digest;
pub mod error;
pub mod mempool;
pub mod package;
pub mod state;
pub mod store;
pub mod verify;

pub use balance::CkState;
pub use digest::*;
pub use error::{LedgerError, Result};
pub use mempool::*;
pub use package::PkgState;
pub use state::{BlockRecord, FinalizedBlock, LedgerState, OutState, STATE_V1};
pub use store::{KvStore, MemStore};
#[cfg(feature = "rocksdb")]
pub use store::RocksStore;
pub use verify::Validator;
