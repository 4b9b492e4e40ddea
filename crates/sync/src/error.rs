use std::path::PathBuf;

use accum::AccumError;
use consensus::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    /// Tracked witnesses disagree with the ledger. The caller must stop.
    #[error("wallet invariant violated: {0}")]
    Invariant(String),
    #[error("checkpoint I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed checkpoint {path:?}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },
    #[error("unknown output {0}")]
    UnknownOutput(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl WalletError {
    pub fn is_invariant(&self) -> bool {
        match self {
            WalletError::Invariant(_) => true,
            WalletError::Ledger(e) => matches!(e, LedgerError::Invariant(_)),
            _ => false,
        }
    }
}

impl From<AccumError> for WalletError {
    fn from(e: AccumError) -> Self { WalletError::Invariant(e.to_string()) }
}

pub type Result<T> = core::result::Result<T, WalletError>;
