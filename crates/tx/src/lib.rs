//! Transaction generation: balance pre-check, proof batch, assembly and
//! signing.

pub mod error;
pub mod generate;

pub use error::{GenError, Result};
pub use generate::{select_inputs, Generator, PkgAction, Reception, TxParam};
