//! Wallet-side output tracking.
//!
//! For every finalized block the wallet drops outputs whose nullifiers were
//! published, advances the witnesses of the shielded outputs it still holds
//! and picks up new outputs addressed to one of its viewing keys.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use accum::{AuthPath, TreeHasher, Witness};
use consensus::{BlockRecord, LedgerState};
use pcd::Oracle;
use primitives::encode::*;
use primitives::{transparent_nullifier, Address, Asset, NoteInfo, Nullifier, Output, Root, ViewKey};

use crate::error::{Result, WalletError};

/// An unspent output owned by one of the wallet's keys.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TrackedOutput {
    /// Tree root right after the output's append; the ledger key of the output.
    pub root: Root,
    /// Global leaf index.
    pub index: u64,
    /// Height of the block that created it.
    pub num: u64,
    pub owner: Address,
    pub output: Output,
    /// Decrypted note, shielded outputs only.
    pub note: Option<NoteInfo>,
    pub asset: Asset,
    pub nullifier: Nullifier,
    /// Shielded outputs only. Transparent outputs are spent by root.
    pub witness: Option<Witness>,
    /// Index of the last leaf folded into `witness`.
    pub last: u64,
    /// Order of the last `mark_used`, zero if never used.
    pub used: u64,
}

impl TrackedOutput {
    pub fn is_shielded(&self) -> bool { self.output.is_shielded() }

    pub fn value(&self) -> u128 { self.asset.value() }

    /// Current authentication path of a shielded output.
    pub fn path(&self) -> Result<AuthPath> {
        match &self.witness {
            Some(w) => Ok(w.path()?),
            None => Err(WalletError::UnknownOutput(format!("{} has no witness", self.root.to_hex()))),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.root.encode(out);
        encode_u64(self.index, out);
        encode_u64(self.num, out);
        self.owner.encode(out);
        self.output.encode(out);
        self.note.encode(out);
        self.asset.encode(out);
        self.nullifier.encode(out);
        match &self.witness {
            Some(w) => {
                out.push(1);
                w.encode(out);
            }
            None => out.push(0),
        }
        encode_u64(self.last, out);
        encode_u64(self.used, out);
    }

    fn decode(hasher: &TreeHasher, data: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            root: Root::decode(data)?,
            index: read_u64(data)?,
            num: read_u64(data)?,
            owner: Address::decode(data)?,
            output: Output::decode(data)?,
            note: Option::<NoteInfo>::decode(data)?,
            asset: Asset::decode(data)?,
            nullifier: Nullifier::decode(data)?,
            witness: if read_bool(data)? { Some(Witness::decode(hasher.clone(), data)?) } else { None },
            last: read_u64(data)?,
            used: read_u64(data)?,
        })
    }
}

/// What one block changed for the wallet.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BlockScan {
    pub num: u64,
    pub added: usize,
    pub spent: usize,
}

pub struct WalletState {
    oracle: Arc<dyn Oracle>,
    keys: Vec<ViewKey>,
    /// Highest block scanned so far.
    height: Option<u64>,
    outs: BTreeMap<Root, TrackedOutput>,
    by_nf: BTreeMap<Nullifier, Root>,
    used_seq: u64,
}

impl WalletState {
    pub fn new(oracle: Arc<dyn Oracle>, keys: Vec<ViewKey>) -> Self {
        Self { oracle, keys, height: None, outs: BTreeMap::new(), by_nf: BTreeMap::new(), used_seq: 0 }
    }

    pub fn keys(&self) -> &[ViewKey] { &self.keys }

    pub fn oracle(&self) -> &Arc<dyn Oracle> { &self.oracle }

    pub fn height(&self) -> Option<u64> { self.height }

    pub fn len(&self) -> usize { self.outs.len() }

    pub fn is_empty(&self) -> bool { self.outs.is_empty() }

    /// Ownership test for a single output.
    fn detect(&self, key: &ViewKey, root: &Root, output: &Output) -> Option<(Asset, Option<NoteInfo>, Nullifier)> {
        match output {
            Output::Transparent(o) => {
                if o.addr != key.addr || o.addr.is_zero() || o.asset.is_empty() {
                    return None;
                }
                Some((o.asset, None, transparent_nullifier(root)))
            }
            Output::Shielded(z) => {
                let note = self.oracle.try_decrypt(key, z)?;
                if note.asset.is_empty() {
                    return None;
                }
                Some((note.asset, Some(note), self.oracle.derive_nullifier(key, &z.out_cm)))
            }
        }
    }

    /// Fold the block `state` has applied into the wallet.
    pub fn update(&mut self, state: &LedgerState) -> Result<BlockScan> { self.scan_block(state.block(), state) }

    /// Fold a block record into the wallet. `ledger` resolves the block's
    /// outputs by root and may be any state opened on the same store.
    #[instrument(skip_all, fields(num = block.num))]
    pub fn scan_block(&mut self, block: &BlockRecord, ledger: &LedgerState) -> Result<BlockScan> {
        let num = block.num;
        if let Some(h) = self.height {
            if num <= h {
                return Err(WalletError::Invariant(format!("block {} scanned after {}", num, h)));
            }
        }
        let mut scan = BlockScan { num, ..Default::default() };

        for nf in &block.dels {
            if let Some(root) = self.by_nf.remove(nf) {
                self.outs.remove(&root);
                scan.spent += 1;
            }
        }

        let trees = block.trees()?;
        let mut appended = Vec::with_capacity(trees.len());
        for (index, tree) in trees {
            let root = tree.root();
            let out = ledger
                .get_output(&root)?
                .ok_or_else(|| WalletError::Invariant(format!("no output stored under root {}", root.to_hex())))?;
            if out.index != index {
                return Err(WalletError::Invariant(format!("output {} at index {}, expected {}", root.to_hex(), out.index, index)));
            }
            appended.push((index, tree, root, out.output));
        }

        let found: Vec<Option<(Address, Asset, Option<NoteInfo>, Nullifier)>> = appended
            .par_iter()
            .map(|(_, _, root, output)| {
                self.keys
                    .iter()
                    .find_map(|k| self.detect(k, root, output).map(|(a, n, nf)| (k.addr, a, n, nf)))
            })
            .collect();

        for ((index, tree, root, output), hit) in appended.into_iter().zip(found) {
            let cm = output.commitment();
            for t in self.outs.values_mut() {
                let Some(w) = t.witness.as_mut() else { continue };
                if w.is_complete() {
                    continue;
                }
                if t.last + 1 != index {
                    return Err(WalletError::Invariant(format!(
                        "witness for {} last saw leaf {}, next is {}",
                        t.root.to_hex(),
                        t.last,
                        index
                    )));
                }
                w.append(cm)?;
                t.last = index;
                if w.root() != root {
                    return Err(WalletError::Invariant(format!("witness for {} disagrees with root {}", t.root.to_hex(), root.to_hex())));
                }
            }

            if let Some((owner, asset, note, nullifier)) = hit {
                let witness = if output.is_shielded() { Some(Witness::from_tree(tree)) } else { None };
                self.by_nf.insert(nullifier, root);
                self.outs.insert(
                    root,
                    TrackedOutput { root, index, num, owner, output, note, asset, nullifier, witness, last: index, used: 0 },
                );
                scan.added += 1;
            }
        }

        self.height = Some(num);
        debug!(added = scan.added, spent = scan.spent, held = self.outs.len(), "scanned block");
        Ok(scan)
    }

    /// Unspent outputs of `addr`: least recently used first, then largest,
    /// transparent before shielded, newest last.
    pub fn list_outputs(&self, addr: &Address) -> Vec<TrackedOutput> {
        let mut outs: Vec<TrackedOutput> = self.outs.values().filter(|t| t.owner == *addr).cloned().collect();
        outs.sort_by_key(|t| (t.used, Reverse(t.value()), t.is_shielded(), Reverse(t.num), Reverse(t.index)));
        outs
    }

    pub fn get_output(&self, root: &Root) -> Option<&TrackedOutput> { self.outs.get(root) }

    pub fn get_by_nullifier(&self, nf: &Nullifier) -> Option<&TrackedOutput> {
        self.by_nf.get(nf).and_then(|r| self.outs.get(r))
    }

    /// Record that coin selection picked `root`.
    pub fn mark_used(&mut self, root: &Root) -> Result<()> {
        let t = self.outs.get_mut(root).ok_or_else(|| WalletError::UnknownOutput(root.to_hex()))?;
        self.used_seq += 1;
        t.used = self.used_seq;
        Ok(())
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        self.height.encode(out);
        encode_u64(self.used_seq, out);
        encode_u32(self.outs.len() as u32, out);
        for t in self.outs.values() {
            t.encode(out);
        }
    }

    pub(crate) fn decode(oracle: Arc<dyn Oracle>, keys: Vec<ViewKey>, data: &mut &[u8]) -> anyhow::Result<Self> {
        let hasher = oracle.tree_hasher();
        let height = Option::<u64>::decode(data)?;
        let used_seq = read_u64(data)?;
        let n = read_u32(data)? as usize;
        let mut outs = BTreeMap::new();
        let mut by_nf = BTreeMap::new();
        for _ in 0..n {
            let t = TrackedOutput::decode(&hasher, data)?;
            if by_nf.insert(t.nullifier, t.root).is_some() {
                return Err(anyhow!("duplicate nullifier {}", t.nullifier.to_hex()));
            }
            outs.insert(t.root, t);
        }
        Ok(Self { oracle, keys, height, outs, by_nf, used_seq })
    }
}

/// Shared wallet state. Block updates take the write lock, queries the read lock.
pub struct Wallet {
    state: RwLock<WalletState>,
}

impl Wallet {
    pub fn new(state: WalletState) -> Self { Self { state: RwLock::new(state) } }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, WalletState>> {
        self.state.read().map_err(|_| WalletError::Invariant("wallet lock poisoned".into()))
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, WalletState>> {
        self.state.write().map_err(|_| WalletError::Invariant("wallet lock poisoned".into()))
    }

    pub fn update(&self, state: &LedgerState) -> Result<BlockScan> {
        let scan = self.write()?.update(state)?;
        if scan.added + scan.spent > 0 {
            info!(num = scan.num, added = scan.added, spent = scan.spent, "wallet updated");
        }
        Ok(scan)
    }

    pub fn list_outputs(&self, addr: &Address) -> Result<Vec<TrackedOutput>> { Ok(self.read()?.list_outputs(addr)) }

    pub fn get_output(&self, root: &Root) -> Result<Option<TrackedOutput>> { Ok(self.read()?.get_output(root).cloned()) }

    pub fn get_by_nullifier(&self, nf: &Nullifier) -> Result<Option<TrackedOutput>> {
        Ok(self.read()?.get_by_nullifier(nf).cloned())
    }

    pub fn mark_used(&self, root: &Root) -> Result<()> { self.write()?.mark_used(root) }

    /// Total token value per address and currency symbol.
    pub fn balance(&self, addr: &Address) -> Result<BTreeMap<String, u128>> {
        let mut out = BTreeMap::new();
        for t in self.read()?.list_outputs(addr) {
            if let Some(tkn) = t.asset.tkn {
                *out.entry(tkn.currency.symbol()).or_insert(0u128) += tkn.value;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus::{KvStore, MemStore};
    use pcd::{random_scalar, DevOracle, OutputWitness};
    use primitives::{Currency, Memo, OutO, SpendKey};
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    fn sero(v: u128) -> Asset { Asset::token(Currency::from_symbol("SERO"), v) }

    fn key(oracle: &DevOracle, rng: &mut StdRng) -> ViewKey {
        let mut b = [0u8; 32];
        rng.fill_bytes(&mut b);
        oracle.view_key(&SpendKey(b)).unwrap()
    }

    fn shielded(oracle: &DevOracle, rng: &mut StdRng, addr: Address, v: u128) -> Output {
        let w = OutputWitness {
            addr,
            asset: sero(v),
            memo: Memo::default(),
            ar: random_scalar(rng),
            rcm: random_scalar(rng),
            esk: random_scalar(rng),
        };
        Output::Shielded(oracle.generate_output_proof(&w).unwrap())
    }

    #[test]
    fn picks_up_owned_outputs_and_tracks_roots() {
        let oracle = Arc::new(DevOracle::with_depth(4));
        let mut rng = StdRng::seed_from_u64(21);
        let (a, b) = (key(&oracle, &mut rng), key(&oracle, &mut rng));
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        let mut wallet = WalletState::new(oracle.clone(), vec![a]);

        let mut s = LedgerState::load(store.clone(), oracle.tree_hasher(), 0).unwrap();
        s.add_output(shielded(&oracle, &mut rng, a.addr, 5)).unwrap();
        s.add_output(Output::Transparent(OutO { addr: a.addr, asset: sero(0), memo: Memo::default() })).unwrap();
        s.add_output(Output::Transparent(OutO { addr: a.addr, asset: sero(3), memo: Memo::default() })).unwrap();
        s.add_output(shielded(&oracle, &mut rng, b.addr, 9)).unwrap();
        s.finalize().unwrap();
        let scan = wallet.update(&s).unwrap();
        assert_eq!((scan.added, scan.spent), (2, 0));

        let mut s = LedgerState::load(store, oracle.tree_hasher(), 1).unwrap();
        for v in 1..=5 {
            s.add_output(shielded(&oracle, &mut rng, b.addr, v)).unwrap();
        }
        s.finalize().unwrap();
        wallet.update(&s).unwrap();

        let outs = wallet.list_outputs(&a.addr);
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[1].value(), 3);
        let z = &outs[0];
        assert!(z.is_shielded());
        let path = z.path().unwrap();
        assert_eq!(path.anchor, s.root());
        assert!(path.verify(&oracle.tree_hasher()));
        assert!(wallet.list_outputs(&b.addr).is_empty());
    }

    #[test]
    fn rescanning_a_block_is_an_invariant_error() {
        let oracle = Arc::new(DevOracle::with_depth(4));
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        let mut wallet = WalletState::new(oracle.clone(), vec![]);
        let mut s = LedgerState::load(store, oracle.tree_hasher(), 3).unwrap();
        s.finalize().unwrap();
        wallet.update(&s).unwrap();
        assert!(wallet.update(&s).unwrap_err().is_invariant());
    }

    #[test]
    fn mark_used_moves_output_back() {
        let oracle = Arc::new(DevOracle::with_depth(4));
        let mut rng = StdRng::seed_from_u64(22);
        let a = key(&oracle, &mut rng);
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        let mut wallet = WalletState::new(oracle.clone(), vec![a]);
        let mut s = LedgerState::load(store, oracle.tree_hasher(), 0).unwrap();
        for v in [10u128, 20, 30] {
            s.add_output(Output::Transparent(OutO { addr: a.addr, asset: sero(v), memo: Memo::default() })).unwrap();
        }
        s.finalize().unwrap();
        wallet.update(&s).unwrap();

        let order: Vec<u128> = wallet.list_outputs(&a.addr).iter().map(|t| t.value()).collect();
        assert_eq!(order, vec![30, 20, 10]);
        let first = wallet.list_outputs(&a.addr)[0].root;
        wallet.mark_used(&first).unwrap();
        let order: Vec<u128> = wallet.list_outputs(&a.addr).iter().map(|t| t.value()).collect();
        assert_eq!(order, vec![20, 10, 30]);
        assert!(wallet.mark_used(&Root([1u8; 32])).is_err());
    }

    #[test]
    fn larger_outputs_listed_first_whatever_their_position() {
        let oracle = Arc::new(DevOracle::with_depth(4));
        let mut rng = StdRng::seed_from_u64(23);
        let a = key(&oracle, &mut rng);
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        let mut wallet = WalletState::new(oracle.clone(), vec![a]);
        let mut s = LedgerState::load(store.clone(), oracle.tree_hasher(), 0).unwrap();
        for v in [20u128, 30, 10] {
            s.add_output(Output::Transparent(OutO { addr: a.addr, asset: sero(v), memo: Memo::default() })).unwrap();
        }
        s.finalize().unwrap();
        wallet.update(&s).unwrap();
        let order: Vec<u128> = wallet.list_outputs(&a.addr).iter().map(|t| t.value()).collect();
        assert_eq!(order, vec![30, 20, 10]);

        // equal values: transparent before shielded, then the newer one
        let mut s = LedgerState::load(store, oracle.tree_hasher(), 1).unwrap();
        s.add_output(shielded(&oracle, &mut rng, a.addr, 20)).unwrap();
        s.add_output(Output::Transparent(OutO { addr: a.addr, asset: sero(30), memo: Memo::default() })).unwrap();
        s.finalize().unwrap();
        wallet.update(&s).unwrap();
        let outs = wallet.list_outputs(&a.addr);
        let order: Vec<(u128, bool, u64)> = outs.iter().map(|t| (t.value(), t.is_shielded(), t.num)).collect();
        assert_eq!(order, vec![(30, false, 1), (30, false, 0), (20, false, 0), (20, true, 1), (10, false, 0)]);
    }
}
