//! Transaction rejection reasons shared by the validator and the ledger.

use thiserror::Error;

/// Why a transaction was not admitted. Rejections never mutate state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Reject {
    #[error("nullifier already spent: {0}")]
    NullifierReuse(String),
    #[error("unknown anchor: {0}")]
    UnknownAnchor(String),
    #[error("input refers to unknown output: {0}")]
    UnknownInput(String),
    #[error("invalid proof: {0}")]
    InvalidProof(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("balance mismatch: {0}")]
    BalanceMismatch(String),
    #[error("package id already exists: {0}")]
    PackageExists(String),
    #[error("no open package with id {0}")]
    PackageMissing(String),
    #[error("value out of range: {0}")]
    ValueRange(String),
    #[error("too many {what}: {count} > {max}")]
    TooMany { what: &'static str, count: usize, max: usize },
    #[error("malformed transaction: {0}")]
    Malformed(String),
}

/// One or more rejection reasons. Stateless checks report all failures,
/// stateful checks report the first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection(pub Vec<Reject>);

impl std::error::Error for Rejection {}

impl core::fmt::Display for Rejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 { f.write_str("; ")?; }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

impl From<Reject> for Rejection {
    fn from(r: Reject) -> Self { Rejection(vec![r]) }
}

impl Rejection {
    pub fn reasons(&self) -> &[Reject] { &self.0 }

    pub fn contains(&self, pred: impl Fn(&Reject) -> bool) -> bool { self.0.iter().any(pred) }
}
