use consensus::LedgerError;
use pcd::PoolError;
use sync::WalletError;
use thiserror::Error;
use tx::GenError;

#[derive(Debug, Error)]
pub enum NodeError {
    /// The block or transaction was refused; the ledger is unchanged.
    #[error("rejected: {0}")]
    Rejected(LedgerError),
    /// Ledger or wallet state can no longer be trusted.
    #[error("fatal: {0}")]
    Fatal(String),
    /// A previous fatal error stopped the node.
    #[error("node halted")]
    Halted,
    #[error("chain: {0}")]
    Chain(String),
    #[error(transparent)]
    Wallet(WalletError),
    #[error(transparent)]
    Generate(#[from] GenError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl NodeError {
    pub fn is_fatal(&self) -> bool { matches!(self, NodeError::Fatal(_) | NodeError::Halted) }

    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            NodeError::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LedgerError> for NodeError {
    fn from(e: LedgerError) -> Self {
        if e.is_fatal() {
            NodeError::Fatal(e.to_string())
        } else {
            NodeError::Rejected(e)
        }
    }
}

impl From<WalletError> for NodeError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::Ledger(l) => l.into(),
            e if e.is_invariant() => NodeError::Fatal(e.to_string()),
            e => NodeError::Wallet(e),
        }
    }
}

pub type Result<T> = core::result::Result<T, NodeError>;
