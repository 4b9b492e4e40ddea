use accum::AccumError;
use primitives::{Reject, Rejection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The transaction is invalid against the current state. No state was touched.
    #[error("transaction rejected: {0}")]
    Rejected(#[from] Rejection),
    /// Ledger structures disagree with each other. The node must stop.
    #[error("ledger invariant violated: {0}")]
    Invariant(String),
    /// The durable store failed or returned undecodable data. The node must stop.
    #[error("store failure: {0}")]
    Store(String),
}

impl LedgerError {
    /// Whether the caller has to abort instead of dropping the transaction.
    pub fn is_fatal(&self) -> bool { !matches!(self, LedgerError::Rejected(_)) }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            LedgerError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Reject> for LedgerError {
    fn from(r: Reject) -> Self { LedgerError::Rejected(r.into()) }
}

impl From<AccumError> for LedgerError {
    fn from(e: AccumError) -> Self { LedgerError::Invariant(e.to_string()) }
}

pub type Result<T> = core::result::Result<T, LedgerError>;
