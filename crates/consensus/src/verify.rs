//! Transaction validation.
//!
//! Stateless checks run first and report every failure they find; proof
//! checks are started on the worker pool at the same time. Stateful checks
//! then run against the ledger and stop at the first failure. The proof batch
//! is always drained before a verdict is returned.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use pcd::{BalanceDesc, Batch, Oracle, OracleError, PoolError, WorkerPool};
use primitives::params::{ParamTable, MAX_TOKEN_VALUE};
use primitives::{sign_hash, transparent_nullifier, Address, Asset, AssetCm, Output, Reject, Rejection, Signature, Tx};

use crate::balance::CkState;
use crate::error::Result;
use crate::package::PkgState;
use crate::state::LedgerState;

pub struct Validator {
    oracle: Arc<dyn Oracle>,
    pool: Arc<WorkerPool>,
    params: ParamTable,
}

impl Validator {
    pub fn new(oracle: Arc<dyn Oracle>, pool: Arc<WorkerPool>, params: ParamTable) -> Self {
        Self { oracle, pool, params }
    }

    pub fn oracle(&self) -> &Arc<dyn Oracle> { &self.oracle }

    pub fn params(&self) -> &ParamTable { &self.params }

    /// Validate `tx` against `state` for inclusion in block `state.num()`.
    #[instrument(skip_all, fields(height = state.num()))]
    pub fn verify_tx(&self, state: &LedgerState, tx: &Tx) -> Result<()> {
        let height = state.num();
        let hash = sign_hash(tx);

        let mut batch = self.pool.batch::<()>();
        let mut rejects = self.check_stateless(tx, height, &hash, &mut batch);
        let proofs = batch.len();

        let stateful = if rejects.is_empty() { self.check_stateful(state, tx, &hash) } else { Ok(()) };

        match batch.join_all() {
            Ok(_) => {}
            Err(PoolError::Failed { failed, total, first }) => {
                rejects.push(Reject::InvalidProof(format!("{} of {} failed: {}", failed, total, first)));
            }
            Err(e @ PoolError::Runtime(_)) => rejects.push(Reject::InvalidProof(e.to_string())),
        }

        if let Err(e) = &stateful {
            if e.is_fatal() {
                return stateful;
            }
        }
        if !rejects.is_empty() {
            debug!(reasons = rejects.len(), "transaction failed stateless checks");
            return Err(Rejection(rejects).into());
        }
        stateful?;
        debug!(proofs, "transaction verified");
        Ok(())
    }

    /// Validate and apply. On rejection the state is untouched.
    pub fn apply(&self, state: &mut LedgerState, tx: &Tx) -> Result<()> {
        self.verify_tx(state, tx)?;
        state.apply_transaction(tx)
    }

    fn check_stateless(&self, tx: &Tx, height: u64, hash: &[u8; 32], batch: &mut Batch<'_, ()>) -> Vec<Reject> {
        let mut rejects = Vec::new();

        if tx.fee.value > MAX_TOKEN_VALUE {
            rejects.push(Reject::ValueRange(format!("fee {}", tx.fee.value)));
        }
        if let Err(e) = self.oracle.verify(&tx.from, hash, &tx.sign) {
            rejects.push(Reject::InvalidSignature(format!("sender: {}", e)));
        }
        for (i, o) in tx.desc_o.outs.iter().enumerate() {
            if o.asset.value() > MAX_TOKEN_VALUE {
                rejects.push(Reject::ValueRange(format!("transparent output {}: {}", i, o.asset.value())));
            }
        }

        if !tx.desc_pkg.is_valid() {
            rejects.push(Reject::Malformed(format!("{} package actions", tx.desc_pkg.count())));
        }
        if tx.desc_pkg.count() > 0 && !self.params.packages_enabled(height) {
            rejects.push(Reject::Malformed(format!("package actions before height {}", self.params.pkg_height)));
        }

        // The fee is paid as one more transparent output.
        let o_outs = tx.desc_o.outs.len() + 1;
        let max = self.params.max_o_outs(height);
        if o_outs > max {
            rejects.push(Reject::TooMany { what: "transparent outputs", count: o_outs, max });
        }
        let max = self.params.max_z_outs(height);
        if tx.desc_z.outs.len() > max {
            rejects.push(Reject::TooMany { what: "shielded outputs", count: tx.desc_z.outs.len(), max });
        }
        if let Some(max) = self.params.max_o_ins(height) {
            if tx.desc_o.ins.len() > max {
                rejects.push(Reject::TooMany { what: "transparent inputs", count: tx.desc_o.ins.len(), max });
            }
        }

        for i in &tx.desc_o.ins {
            if i.nil != transparent_nullifier(&i.root) {
                rejects.push(Reject::Malformed(format!("nullifier of input {} not derived from its root", i.root.to_hex())));
            }
        }

        for z in &tx.desc_z.ins {
            let (oracle, z) = (self.oracle.clone(), z.clone());
            batch.start(move || oracle.verify_spend_proof(&z));
        }
        for z in &tx.desc_z.outs {
            let (oracle, z) = (self.oracle.clone(), z.clone());
            batch.start(move || oracle.verify_output_proof(&z));
        }
        if let Some(c) = &tx.desc_pkg.create {
            let (oracle, c) = (self.oracle.clone(), c.clone());
            batch.start(move || oracle.verify_package_proof(&c));
        }
        rejects
    }

    fn commit(&self, asset: &Asset) -> Result<AssetCm> {
        self.oracle.commit_transparent(asset).map_err(|e| Reject::ValueRange(e.to_string()).into())
    }

    fn check_signature(&self, addr: &Address, hash: &[u8; 32], sig: &Signature, what: &str) -> Result<()> {
        self.oracle
            .verify(addr, hash, sig)
            .map_err(|e: OracleError| Reject::InvalidSignature(format!("{}: {}", what, e)).into())
    }

    fn check_stateful(&self, state: &LedgerState, tx: &Tx, hash: &[u8; 32]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for nf in tx.nullifiers() {
            if !seen.insert(nf) || state.has_nullifier(&nf)? {
                return Err(Reject::NullifierReuse(nf.to_hex()).into());
            }
        }

        let mut ck = CkState::new();
        let mut desc = BalanceDesc { bcr: tx.bcr, bsign: tx.bsign, hash: *hash, ..Default::default() };

        for i in &tx.desc_o.ins {
            let out = state.get_output(&i.root)?.ok_or_else(|| Reject::UnknownInput(i.root.to_hex()))?;
            let o = match out.output {
                Output::Transparent(o) => o,
                Output::Shielded(_) => return Err(Reject::UnknownInput(format!("{} is shielded", i.root.to_hex())).into()),
            };
            self.check_signature(&o.addr, hash, &i.sign, "transparent input")?;
            ck.add_in(&o.asset)?;
            desc.oin.push(self.commit(&o.asset)?);
        }
        for z in &tx.desc_z.ins {
            if !state.has_root(&z.anchor)? {
                return Err(Reject::UnknownAnchor(z.anchor.to_hex()).into());
            }
            desc.zin.push(z.asset_cm);
        }

        for o in &tx.desc_o.outs {
            ck.add_out(&o.asset)?;
            desc.oout.push(self.commit(&o.asset)?);
        }
        let fee = Asset { tkn: Some(tx.fee), tkt: None };
        ck.add_out(&fee)?;
        desc.oout.push(self.commit(&fee)?);
        desc.zout.extend(tx.desc_z.outs.iter().map(|z| z.asset_cm));

        if let Some(c) = &tx.desc_pkg.create {
            if state.get_package(&c.id)?.is_some() {
                return Err(Reject::PackageExists(c.id.to_hex()).into());
            }
            desc.zout.push(c.pkg.asset_cm);
        }
        if let Some(t) = &tx.desc_pkg.transfer {
            let p = PkgState::require_open(state.get_package(&t.id)?, &t.id)?;
            self.check_signature(&p.owner, hash, &t.sign, "package transfer")?;
        }
        if let Some(c) = &tx.desc_pkg.close {
            let p = PkgState::require_open(state.get_package(&c.id)?, &c.id)?;
            self.check_signature(&p.owner, hash, &c.sign, "package close")?;
            desc.zin.push(p.pack.pkg.asset_cm);
        }

        if tx.has_shielded() {
            self.oracle.verify_balance(&desc).map_err(|e| Reject::BalanceMismatch(e.to_string()))?;
        } else {
            ck.check()?;
        }
        Ok(())
    }
}
