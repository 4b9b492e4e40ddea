//! Transaction generation from wallet outputs.
//!
//! The request is checked for exact per-asset balance before any proof work
//! starts. Spend, output and package proofs then run as one pool batch; any
//! failure aborts the whole transaction.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use consensus::{CkState, LedgerState, PkgState};
use pcd::{random_scalar, Oracle, OutputWitness, PkgWitness, SpendWitness, WorkerPool};
use primitives::params::ParamTable;
use primitives::*;
use sync::{TrackedOutput, Wallet};

use crate::error::{GenError, Result};

/// One payment.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Reception {
    pub addr: Address,
    pub asset: Asset,
    pub memo: Memo,
    /// Pay to a shielded output instead of a transparent one.
    pub shielded: bool,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum PkgAction {
    /// Escrow `asset` under `id`; `key` will be needed to close it.
    Create { id: PkgId, owner: Address, asset: Asset, memo: Memo, key: [u8; 32] },
    Transfer { id: PkgId, to: Address },
    Close { id: PkgId, key: [u8; 32] },
}

impl PkgAction {
    pub fn id(&self) -> PkgId {
        match self {
            PkgAction::Create { id, .. } | PkgAction::Transfer { id, .. } | PkgAction::Close { id, .. } => *id,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct TxParam {
    pub from: SpendKey,
    pub fee: Token,
    /// Roots of wallet outputs to spend.
    pub ins: Vec<Root>,
    pub outs: Vec<Reception>,
    pub pkg: Option<PkgAction>,
}

enum Proved {
    Spend(InZ),
    Output(OutZ),
    Package(PkgCreate),
}

pub struct Generator {
    oracle: Arc<dyn Oracle>,
    pool: Arc<WorkerPool>,
    params: ParamTable,
}

impl Generator {
    pub fn new(oracle: Arc<dyn Oracle>, pool: Arc<WorkerPool>, params: ParamTable) -> Self {
        Self { oracle, pool, params }
    }

    fn resolve(&self, wallet: &Wallet, owner: &Address, ins: &[Root]) -> Result<(Vec<TrackedOutput>, Vec<TrackedOutput>)> {
        let mut seen = BTreeSet::new();
        let (mut o_ins, mut z_ins) = (Vec::new(), Vec::new());
        for root in ins {
            if !seen.insert(*root) {
                return Err(Reject::NullifierReuse(format!("input {} listed twice", root.to_hex())).into());
            }
            let t = wallet
                .get_output(root)?
                .filter(|t| t.owner == *owner)
                .ok_or_else(|| GenError::UnknownInput(root.to_hex()))?;
            if t.is_shielded() {
                z_ins.push(t);
            } else {
                o_ins.push(t);
            }
        }
        Ok((o_ins, z_ins))
    }

    fn check_limits(&self, param: &TxParam, o_ins: usize, height: u64) -> Result<()> {
        if let Some(max) = self.params.max_o_ins(height) {
            if o_ins > max {
                return Err(Reject::TooMany { what: "transparent inputs", count: o_ins, max }.into());
            }
        }
        let z_outs = param.outs.iter().filter(|r| r.shielded).count();
        let o_outs = param.outs.len() - z_outs + 1;
        let max = self.params.max_o_outs(height);
        if o_outs > max {
            return Err(Reject::TooMany { what: "transparent outputs", count: o_outs, max }.into());
        }
        let max = self.params.max_z_outs(height);
        if z_outs > max {
            return Err(Reject::TooMany { what: "shielded outputs", count: z_outs, max }.into());
        }
        if param.pkg.is_some() && !self.params.packages_enabled(height) {
            return Err(Reject::Malformed(format!("package actions before height {}", self.params.pkg_height)).into());
        }
        Ok(())
    }

    /// Open package being closed, after checking the sender holds it.
    fn package_context(&self, state: &LedgerState, holder: &Address, action: &PkgAction) -> Result<Option<PkgOpening>> {
        let id = action.id();
        if let PkgAction::Create { .. } = action {
            if state.get_package(&id)?.is_some() {
                return Err(Reject::PackageExists(id.to_hex()).into());
            }
            return Ok(None);
        }
        let p = PkgState::require_open(state.get_package(&id)?, &id)?;
        if p.owner != *holder {
            return Err(GenError::Package { id: id.to_hex(), reason: "sender is not the holder".into() });
        }
        match action {
            PkgAction::Close { key, .. } => self
                .oracle
                .open_package(&p.pack.pkg, key)
                .map(Some)
                .ok_or_else(|| GenError::Package { id: id.to_hex(), reason: "key does not open the package".into() }),
            _ => Ok(None),
        }
    }

    /// Build and sign a transaction for inclusion in block `state.num()`.
    /// The inputs are marked used in `wallet` on success.
    #[instrument(skip_all, fields(height = state.num(), ins = param.ins.len(), outs = param.outs.len()))]
    pub fn generate<R: RngCore>(&self, wallet: &Wallet, state: &LedgerState, param: &TxParam, rng: &mut R) -> Result<Tx> {
        let height = state.num();
        let vk = self.oracle.view_key(&param.from)?;
        let (o_ins, z_ins) = self.resolve(wallet, &vk.addr, &param.ins)?;
        self.check_limits(param, o_ins.len(), height)?;
        let opening = match &param.pkg {
            Some(action) => self.package_context(state, &vk.addr, action)?,
            None => None,
        };

        let fee = Asset { tkn: Some(param.fee), tkt: None };
        let mut ck = CkState::new();
        for t in o_ins.iter().chain(&z_ins) {
            ck.add_in(&t.asset)?;
        }
        if let Some(open) = &opening {
            ck.add_in(&open.asset)?;
        }
        for r in &param.outs {
            ck.add_out(&r.asset)?;
        }
        ck.add_out(&fee)?;
        if let Some(PkgAction::Create { asset, .. }) = &param.pkg {
            ck.add_out(asset)?;
        }
        ck.check()?;

        let mut batch = self.pool.batch::<Proved>();
        let (mut ar_in, mut ar_out) = (Vec::new(), Vec::new());
        for t in &z_ins {
            let note = t.note.ok_or_else(|| GenError::UnknownInput(format!("{} has no decrypted note", t.root.to_hex())))?;
            let w = SpendWitness { sk: param.from, note, path: t.path()?, ar: random_scalar(rng) };
            ar_in.push(w.ar);
            let oracle = self.oracle.clone();
            batch.start(move || oracle.generate_spend_proof(&w).map(Proved::Spend));
        }
        for r in param.outs.iter().filter(|r| r.shielded) {
            let w = OutputWitness {
                addr: r.addr,
                asset: r.asset,
                memo: r.memo,
                ar: random_scalar(rng),
                rcm: random_scalar(rng),
                esk: random_scalar(rng),
            };
            ar_out.push(w.ar);
            let oracle = self.oracle.clone();
            batch.start(move || oracle.generate_output_proof(&w).map(Proved::Output));
        }
        if let Some(PkgAction::Create { id, owner, asset, memo, key }) = &param.pkg {
            let w = PkgWitness { id: *id, owner: *owner, asset: *asset, memo: *memo, ar: random_scalar(rng), key: *key };
            ar_out.push(w.ar);
            let oracle = self.oracle.clone();
            batch.start(move || oracle.generate_package_proof(&w).map(Proved::Package));
        }
        if let Some(open) = &opening {
            ar_in.push(open.ar);
        }
        let proofs = batch.len();
        let proved = batch.join_all()?;

        let mut tx = Tx {
            from: vk.addr,
            fee: param.fee,
            desc_o: DescO {
                ins: o_ins
                    .iter()
                    .map(|t| InO { root: t.root, nil: transparent_nullifier(&t.root), sign: Signature::default() })
                    .collect(),
                outs: param
                    .outs
                    .iter()
                    .filter(|r| !r.shielded)
                    .map(|r| OutO { addr: r.addr, asset: r.asset, memo: r.memo })
                    .collect(),
            },
            desc_z: DescZ::default(),
            desc_pkg: DescPkg::default(),
            bcr: [0u8; 32],
            bsign: Signature::default(),
            sign: Signature::default(),
        };
        for p in proved {
            match p {
                Proved::Spend(i) => tx.desc_z.ins.push(i),
                Proved::Output(o) => tx.desc_z.outs.push(o),
                Proved::Package(c) => tx.desc_pkg.create = Some(c),
            }
        }
        match &param.pkg {
            Some(PkgAction::Transfer { id, to }) => {
                tx.desc_pkg.transfer = Some(PkgTransfer { id: *id, to: *to, sign: Signature::default() })
            }
            Some(PkgAction::Close { id, .. }) => tx.desc_pkg.close = Some(PkgClose { id: *id, sign: Signature::default() }),
            _ => {}
        }

        let hash = sign_hash(&tx);
        let balance = self.oracle.sign_balance(&ar_in, &ar_out, &hash)?;
        tx.bcr = balance.bcr;
        tx.bsign = balance.bsign;

        // Sender, transparent inputs and package holder are the same key.
        let sig = self.oracle.sign(&param.from, &hash)?;
        tx.sign = sig;
        for i in tx.desc_o.ins.iter_mut() {
            i.sign = sig;
        }
        if let Some(t) = tx.desc_pkg.transfer.as_mut() {
            t.sign = sig;
        }
        if let Some(c) = tx.desc_pkg.close.as_mut() {
            c.sign = sig;
        }

        for t in o_ins.iter().chain(&z_ins) {
            wallet.mark_used(&t.root)?;
        }
        debug!(proofs, hash = %hex::encode(&hash[..8]), "transaction generated");
        Ok(tx)
    }
}

/// Pick unspent token outputs of `addr` in listing order until they cover
/// `amount` of `currency`.
pub fn select_inputs(wallet: &Wallet, addr: &Address, currency: Currency, amount: u128) -> Result<(Vec<Root>, u128)> {
    let mut picked = Vec::new();
    let mut total = 0u128;
    for t in wallet.list_outputs(addr)? {
        if total >= amount {
            break;
        }
        match t.asset.tkn {
            Some(tkn) if tkn.currency == currency && tkn.value > 0 && t.asset.tkt.is_none() => {
                total = total.saturating_add(tkn.value);
                picked.push(t.root);
            }
            _ => {}
        }
    }
    if total < amount {
        return Err(Reject::BalanceMismatch(format!("{} {} available, {} needed", total, currency.symbol(), amount)).into());
    }
    Ok((picked, total))
}
