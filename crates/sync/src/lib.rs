//! Wallet-side witness state: owned output tracking, checkpoints and their
//! retention.

pub mod checkpoint;
pub mod error;
pub mod wallet;

pub use checkpoint::{checkpoint_name, parse_checkpoint_name, CheckpointDir, Retention, CHECKPOINT_V1};
pub use error::{Result, WalletError};
pub use wallet::{BlockScan, TrackedOutput, Wallet, WalletState};
