use thiserror::Error;

/// Failures reported by the cryptographic oracle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The prover was handed a witness that does not satisfy the statement.
    #[error("invalid witness: {0}")]
    InvalidWitness(String),
    #[error("invalid proof: {0}")]
    InvalidProof(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("balance does not verify: {0}")]
    Balance(String),
    #[error("malformed encoding: {0}")]
    Encoding(String),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    /// At least one task failed or panicked. Partial results are discarded.
    #[error("{failed} of {total} proof tasks failed; first: {first}")]
    Failed { failed: usize, total: usize, first: OracleError },
    #[error("failed to start proof runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
