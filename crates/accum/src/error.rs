use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccumError {
    #[error("tree is full")]
    TreeFull,
    #[error("tree is empty")]
    Empty,
    /// Structural corruption. Callers treat this as fatal.
    #[error("accumulator invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = core::result::Result<T, AccumError>;
