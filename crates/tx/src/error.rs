use consensus::LedgerError;
use pcd::{OracleError, PoolError};
use primitives::Reject;
use sync::WalletError;
use thiserror::Error;

/// Why a transaction could not be built. Nothing is marked used on failure.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("input {0} is not an unspent output of the sender")]
    UnknownInput(String),
    /// The request itself breaks a consensus rule (balance, limits, ranges).
    #[error("request rejected: {0}")]
    Rejected(#[from] Reject),
    #[error("package {id}: {reason}")]
    Package { id: String, reason: String },
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = core::result::Result<T, GenError>;
