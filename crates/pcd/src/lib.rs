//! Proof oracle boundary and the worker pool that drives it.
//!
//! `Oracle` is the only place proof-system math is reached from the ledger;
//! `DevOracle` is a deterministic stand-in for development and tests.

pub mod dev;
pub mod error;
pub mod oracle;
pub mod pool;

pub use dev::DevOracle;
pub use error::{OracleError, PoolError};
pub use oracle::{random_scalar, BalanceDesc, BalanceSig, Oracle, OutputWitness, PkgWitness, SpendWitness};
pub use pool::{Batch, PoolConfig, TaskHandle, WorkerPool};
