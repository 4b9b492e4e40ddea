//! Mempool admission and block verification.

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use primitives::{Nullifier, PkgId, Reject, Tx};

use crate::error::Result;
use crate::state::{FinalizedBlock, LedgerState};
use crate::verify::Validator;

/// Transactions waiting for a block, with the nullifiers and package ids
/// they claim.
#[derive(Default, Debug)]
pub struct Mempool {
    pending: Vec<Tx>,
    nullifiers: BTreeSet<Nullifier>,
    packages: BTreeSet<PkgId>,
}

impl Mempool {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.pending.len() }

    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    /// Admit a transaction: its nullifiers must be fresh against both the
    /// ledger and everything already pending, no pending transaction may
    /// touch the same package, and it must verify.
    pub fn admit(&mut self, validator: &Validator, state: &LedgerState, tx: Tx) -> Result<()> {
        for nf in tx.nullifiers() {
            if self.nullifiers.contains(&nf) {
                return Err(Reject::NullifierReuse(nf.to_hex()).into());
            }
        }
        let pkg = package_id(&tx);
        if let Some(id) = pkg.filter(|id| self.packages.contains(id)) {
            return Err(match tx.desc_pkg.create {
                Some(_) => Reject::PackageExists(format!("{} pending", id.to_hex())),
                None => Reject::PackageMissing(format!("{} claimed by a pending transaction", id.to_hex())),
            }
            .into());
        }
        validator.verify_tx(state, &tx)?;
        self.nullifiers.extend(tx.nullifiers());
        self.packages.extend(pkg);
        self.pending.push(tx);
        debug!(pending = self.pending.len(), "admitted transaction");
        Ok(())
    }

    /// Drain pending transactions in admission order.
    pub fn take(&mut self) -> Vec<Tx> {
        self.nullifiers.clear();
        self.packages.clear();
        std::mem::take(&mut self.pending)
    }
}

fn package_id(tx: &Tx) -> Option<PkgId> {
    let p = &tx.desc_pkg;
    p.create.as_ref().map(|c| c.id).or(p.transfer.as_ref().map(|t| t.id)).or(p.close.as_ref().map(|c| c.id))
}

/// Verify and apply a block's transactions in order. Any failure reverts the
/// whole block and is returned.
#[instrument(skip_all, fields(num = state.num(), txs = txs.len()))]
pub fn verify_block(validator: &Validator, state: &mut LedgerState, txs: &[Tx]) -> Result<()> {
    for (i, tx) in txs.iter().enumerate() {
        if let Err(e) = validator.apply(state, tx) {
            warn!(index = i, error = %e, "block rejected");
            state.revert()?;
            return Err(e);
        }
    }
    Ok(())
}

/// `verify_block` followed by `finalize`.
pub fn commit_block(validator: &Validator, state: &mut LedgerState, txs: &[Tx]) -> Result<FinalizedBlock> {
    verify_block(validator, state, txs)?;
    state.finalize()
}
