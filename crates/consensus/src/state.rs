//! Per-block ledger state.
//!
//! A `LedgerState` is opened on top of the durable store for one block. All
//! mutations land in an in-memory overlay; reads consult the overlay first and
//! fall through to the store. `finalize` writes the overlay as one sorted batch,
//! `revert` drops it and reloads the last durable frontier.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info, instrument};

use accum::{Tree, TreeHasher};
use primitives::encode::*;
use primitives::wire::{frame, unframe};
use primitives::{Commitment, Nullifier, Output, PkgId, Reject, Root, Tx};

use crate::digest::BlockSummary;
use crate::error::{LedgerError, Result};
use crate::package::PkgState;
use crate::store::KvStore;

/// Encoding version of every record this module writes.
pub const STATE_V1: u8 = 1;

const KEY_CUR: &[u8] = b"ZState0_Cur";
const PREFIX_IN: &[u8] = b"ZState0_InName";
const PREFIX_OUT: &[u8] = b"ZState0_OutName";
const PREFIX_PKG: &[u8] = b"ZState0_PkgName";

fn prefixed(prefix: &[u8], id: &[u8; 32]) -> Vec<u8> {
    let mut k = Vec::with_capacity(prefix.len() + 32);
    k.extend_from_slice(prefix);
    k.extend_from_slice(id);
    k
}

fn block_key(num: u64) -> Vec<u8> { format!("ZState0_BLOCK_{}", num).into_bytes() }

fn pkg_block_key(num: u64) -> Vec<u8> { format!("PKGSTATE_BLOCK_NAME_{}", num).into_bytes() }

fn store_err(e: anyhow::Error) -> LedgerError { LedgerError::Store(format!("{:#}", e)) }

/// A stored output and its global leaf index.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OutState {
    pub index: u64,
    pub output: Output,
}

impl OutState {
    pub fn to_record(&self) -> Vec<u8> {
        let mut body = Vec::new();
        encode_u64(self.index, &mut body);
        self.output.encode(&mut body);
        frame(STATE_V1, &body)
    }

    pub fn from_record(data: &[u8]) -> anyhow::Result<Self> {
        let mut rest = unframe(STATE_V1, data)?;
        let index = read_u64(&mut rest)?;
        let output = Output::decode(&mut rest)?;
        if !rest.is_empty() {
            return Err(anyhow!("trailing bytes in output record"));
        }
        Ok(Self { index, output })
    }
}

/// Commitments and deletions of one block, plus the frontier it started from.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockRecord {
    pub num: u64,
    /// Global index of the last leaf before the block (-1 for none).
    pub index_before: i64,
    pub tree_before: Tree,
    pub commitments: Vec<Commitment>,
    pub dels: Vec<Nullifier>,
    pub summary: BlockSummary,
}

impl BlockRecord {
    fn empty(num: u64, index_before: i64, tree_before: Tree) -> Self {
        Self { num, index_before, tree_before, commitments: Vec::new(), dels: Vec::new(), summary: BlockSummary::default() }
    }

    /// Replay the block's commitments from the pre-block frontier. Yields the
    /// global index of each leaf with the tree snapshot right after it.
    pub fn trees(&self) -> Result<Vec<(u64, Tree)>> {
        let mut tree = self.tree_before.clone();
        let mut out = Vec::with_capacity(self.commitments.len());
        for (i, cm) in self.commitments.iter().enumerate() {
            if tree.is_complete() {
                tree = Tree::new(tree.hasher().clone());
            }
            tree.append(*cm)?;
            out.push(((self.index_before + 1 + i as i64) as u64, tree.clone()));
        }
        Ok(out)
    }

    fn to_record(&self) -> Vec<u8> {
        let mut body = Vec::new();
        encode_u64(self.num, &mut body);
        encode_u64(self.index_before as u64, &mut body);
        self.tree_before.encode(&mut body);
        self.commitments.encode(&mut body);
        self.dels.encode(&mut body);
        self.summary.root_digest.0.encode(&mut body);
        self.summary.nullifier_block_digest.0.encode(&mut body);
        self.summary.commitment_delta_digest.0.encode(&mut body);
        frame(STATE_V1, &body)
    }

    fn from_record(hasher: &TreeHasher, data: &[u8]) -> anyhow::Result<Self> {
        let mut rest = unframe(STATE_V1, data)?;
        let num = read_u64(&mut rest)?;
        let index_before = read_u64(&mut rest)? as i64;
        let tree_before = Tree::decode(hasher.clone(), &mut rest)?;
        let commitments = Vec::<Commitment>::decode(&mut rest)?;
        let dels = Vec::<Nullifier>::decode(&mut rest)?;
        let mut summary = BlockSummary::default();
        summary.root_digest.0 = read_fixed::<32>(&mut rest)?;
        summary.nullifier_block_digest.0 = read_fixed::<32>(&mut rest)?;
        summary.commitment_delta_digest.0 = read_fixed::<32>(&mut rest)?;
        if !rest.is_empty() {
            return Err(anyhow!("trailing bytes in block record"));
        }
        Ok(Self { num, index_before, tree_before, commitments, dels, summary })
    }

    /// Block record persisted by an earlier `finalize`.
    pub fn load(store: &dyn KvStore, hasher: &TreeHasher, num: u64) -> Result<Option<Self>> {
        match store.get(&block_key(num))? {
            Some(bytes) => Ok(Some(Self::from_record(hasher, &bytes).map_err(store_err)?)),
            None => Ok(None),
        }
    }
}

/// Result of finalizing one block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FinalizedBlock {
    pub num: u64,
    pub root: Root,
    pub commitments: usize,
    pub nullifiers: usize,
    pub summary: BlockSummary,
}

pub struct LedgerState {
    store: Arc<dyn KvStore>,
    hasher: TreeHasher,
    num: u64,
    index: i64,
    tree: Tree,
    block: BlockRecord,
    ins: BTreeSet<Nullifier>,
    outs: BTreeMap<Root, OutState>,
    pkgs: BTreeMap<PkgId, PkgState>,
    pkg_touched: Vec<PkgId>,
}

impl LedgerState {
    /// Open the state for block `num` on top of the last finalized frontier.
    pub fn load(store: Arc<dyn KvStore>, hasher: TreeHasher, num: u64) -> Result<Self> {
        let (index, tree) = Self::load_cur(store.as_ref(), &hasher)?;
        let block = BlockRecord::empty(num, index, tree.clone());
        Ok(Self {
            store,
            hasher,
            num,
            index,
            tree,
            block,
            ins: BTreeSet::new(),
            outs: BTreeMap::new(),
            pkgs: BTreeMap::new(),
            pkg_touched: Vec::new(),
        })
    }

    fn load_cur(store: &dyn KvStore, hasher: &TreeHasher) -> Result<(i64, Tree)> {
        match store.get(KEY_CUR)? {
            None => Ok((-1, Tree::new(hasher.clone()))),
            Some(bytes) => {
                let decode = || -> anyhow::Result<(i64, Tree)> {
                    let mut rest = unframe(STATE_V1, &bytes)?;
                    let index = read_u64(&mut rest)? as i64;
                    let tree = Tree::decode(hasher.clone(), &mut rest)?;
                    if !rest.is_empty() {
                        return Err(anyhow!("trailing bytes in frontier record"));
                    }
                    Ok((index, tree))
                };
                decode().map_err(store_err)
            }
        }
    }

    fn cur_record(&self) -> Vec<u8> {
        let mut body = Vec::new();
        encode_u64(self.index as u64, &mut body);
        self.tree.encode(&mut body);
        frame(STATE_V1, &body)
    }

    pub fn num(&self) -> u64 { self.num }

    pub fn hasher(&self) -> &TreeHasher { &self.hasher }

    pub fn store(&self) -> &Arc<dyn KvStore> { &self.store }

    /// Global index of the last appended leaf, -1 before the first.
    pub fn index(&self) -> i64 { self.index }

    pub fn tree(&self) -> &Tree { &self.tree }

    pub fn root(&self) -> Root { self.tree.root() }

    /// Commitments emitted so far in this block, in order.
    pub fn commitments(&self) -> &[Commitment] { &self.block.commitments }

    /// Nullifiers recorded so far in this block, in order.
    pub fn nullifiers(&self) -> &[Nullifier] { &self.block.dels }

    pub fn block(&self) -> &BlockRecord { &self.block }

    pub fn has_nullifier(&self, nf: &Nullifier) -> Result<bool> {
        if self.ins.contains(nf) {
            return Ok(true);
        }
        self.store.contains(&prefixed(PREFIX_IN, &nf.0))
    }

    pub fn get_output(&self, root: &Root) -> Result<Option<OutState>> {
        if let Some(o) = self.outs.get(root) {
            return Ok(Some(o.clone()));
        }
        match self.store.get(&prefixed(PREFIX_OUT, &root.0))? {
            Some(bytes) => Ok(Some(OutState::from_record(&bytes).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    /// Whether `root` was the tree root right after some append.
    pub fn has_root(&self, root: &Root) -> Result<bool> {
        if self.outs.contains_key(root) {
            return Ok(true);
        }
        self.store.contains(&prefixed(PREFIX_OUT, &root.0))
    }

    pub fn get_package(&self, id: &PkgId) -> Result<Option<PkgState>> {
        if let Some(p) = self.pkgs.get(id) {
            return Ok(Some(p.clone()));
        }
        match self.store.get(&prefixed(PREFIX_PKG, &id.0))? {
            Some(bytes) => Ok(Some(PkgState::from_record(&bytes).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    /// Append an output's commitment and record the output under the new root.
    pub fn add_output(&mut self, output: Output) -> Result<Root> {
        let cm = output.commitment();
        self.index += 1;
        if self.tree.is_complete() {
            debug!(index = self.index, "commitment tree full, starting a new tree");
            self.tree = Tree::new(self.hasher.clone());
        }
        let root = self.tree.append(cm)?;
        if self.has_root(&root)? {
            return Err(LedgerError::Invariant(format!("root {} emitted twice", root.to_hex())));
        }
        self.block.commitments.push(cm);
        self.outs.insert(root, OutState { index: self.index as u64, output });
        Ok(root)
    }

    /// Record a spend tag. Fails without side effects if it is already present.
    pub fn add_nullifier(&mut self, nf: Nullifier) -> Result<()> {
        if self.has_nullifier(&nf)? {
            return Err(Reject::NullifierReuse(nf.to_hex()).into());
        }
        self.ins.insert(nf);
        self.block.dels.push(nf);
        Ok(())
    }

    /// Checks that must hold before any of `tx`'s effects are applied.
    fn precheck(&self, tx: &Tx) -> Result<()> {
        let mut seen = BTreeSet::new();
        for nf in tx.nullifiers() {
            if !seen.insert(nf) || self.has_nullifier(&nf)? {
                return Err(Reject::NullifierReuse(nf.to_hex()).into());
            }
        }
        if !tx.desc_pkg.is_valid() {
            return Err(Reject::Malformed("more than one package action".into()).into());
        }
        if let Some(c) = &tx.desc_pkg.create {
            if self.get_package(&c.id)?.is_some() {
                return Err(Reject::PackageExists(c.id.to_hex()).into());
            }
        }
        if let Some(t) = &tx.desc_pkg.transfer {
            PkgState::require_open(self.get_package(&t.id)?, &t.id)?;
        }
        if let Some(c) = &tx.desc_pkg.close {
            PkgState::require_open(self.get_package(&c.id)?, &c.id)?;
        }
        Ok(())
    }

    /// Apply a validated transaction: nullifiers in declared order, then
    /// outputs in declared order, then the package action.
    pub fn apply_transaction(&mut self, tx: &Tx) -> Result<()> {
        self.precheck(tx)?;

        for nf in tx.nullifiers() {
            self.add_nullifier(nf)?;
        }
        for o in &tx.desc_o.outs {
            self.add_output(Output::Transparent(*o))?;
        }
        for z in &tx.desc_z.outs {
            self.add_output(Output::Shielded(z.clone()))?;
        }

        if let Some(c) = &tx.desc_pkg.create {
            self.pkgs.insert(c.id, PkgState::created(self.num, tx.from, c.clone()));
            self.pkg_touched.push(c.id);
        }
        if let Some(t) = &tx.desc_pkg.transfer {
            let mut p = PkgState::require_open(self.get_package(&t.id)?, &t.id)?;
            p.transfer(self.num, t.to);
            self.pkgs.insert(t.id, p);
            self.pkg_touched.push(t.id);
        }
        if let Some(c) = &tx.desc_pkg.close {
            let mut p = PkgState::require_open(self.get_package(&c.id)?, &c.id)?;
            p.close(self.num);
            self.pkgs.insert(c.id, p);
            self.pkg_touched.push(c.id);
        }
        debug!(
            num = self.num,
            nullifiers = tx.nullifiers().len(),
            outputs = tx.desc_o.outs.len() + tx.desc_z.outs.len(),
            "applied transaction"
        );
        Ok(())
    }

    /// Tree snapshot after each of this block's appends, with leaf indices.
    pub fn block_trees(&self) -> Result<Vec<(u64, Tree)>> { self.block.trees() }

    /// Persist the overlay and the block record as one sorted batch.
    #[instrument(skip(self), fields(num = self.num))]
    pub fn finalize(&mut self) -> Result<FinalizedBlock> {
        let root = self.root();
        self.block.summary = BlockSummary::compute(&root, &self.block.dels, &self.block.commitments);

        let mut batch: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for nf in &self.ins {
            batch.insert(prefixed(PREFIX_IN, &nf.0), vec![1]);
        }
        for (root, out) in &self.outs {
            batch.insert(prefixed(PREFIX_OUT, &root.0), out.to_record());
        }
        for (id, p) in &self.pkgs {
            batch.insert(prefixed(PREFIX_PKG, &id.0), p.to_record());
        }
        let mut touched = Vec::new();
        self.pkg_touched.encode(&mut touched);
        batch.insert(pkg_block_key(self.num), frame(STATE_V1, &touched));
        batch.insert(block_key(self.num), self.block.to_record());
        batch.insert(KEY_CUR.to_vec(), self.cur_record());
        self.store.write_batch(batch.into_iter().collect())?;

        self.ins.clear();
        self.outs.clear();
        self.pkgs.clear();
        self.pkg_touched.clear();

        let done = FinalizedBlock {
            num: self.num,
            root,
            commitments: self.block.commitments.len(),
            nullifiers: self.block.dels.len(),
            summary: self.block.summary,
        };
        info!(root = %root.to_hex(), commitments = done.commitments, nullifiers = done.nullifiers, "finalized block");
        Ok(done)
    }

    /// Drop every unfinalized change and reload the durable frontier.
    #[instrument(skip(self), fields(num = self.num))]
    pub fn revert(&mut self) -> Result<()> {
        let (index, tree) = Self::load_cur(self.store.as_ref(), &self.hasher)?;
        self.index = index;
        self.tree = tree.clone();
        self.block = BlockRecord::empty(self.num, index, tree);
        self.ins.clear();
        self.outs.clear();
        self.pkgs.clear();
        self.pkg_touched.clear();
        debug!("reverted block overlay");
        Ok(())
    }

    /// Ids of packages touched by block `num`.
    pub fn packages_touched(&self, num: u64) -> Result<Vec<PkgId>> {
        if num == self.num && !self.pkg_touched.is_empty() {
            return Ok(self.pkg_touched.clone());
        }
        match self.store.get(&pkg_block_key(num))? {
            Some(bytes) => {
                let decode = || -> anyhow::Result<Vec<PkgId>> { Vec::<PkgId>::from_bytes(unframe(STATE_V1, &bytes)?) };
                decode().map_err(store_err)
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use accum::Blake2bCombine;
    use primitives::*;

    fn hasher() -> TreeHasher { TreeHasher::with_depth(Arc::new(Blake2bCombine), 3) }

    fn out_o(v: u128) -> OutO {
        OutO {
            addr: Address { ak: [1u8; 32], pk_d: [2u8; 32] },
            asset: Asset::token(Currency::from_symbol("SERO"), v),
            memo: Memo::default(),
        }
    }

    fn fresh(store: &Arc<MemStore>, num: u64) -> LedgerState {
        LedgerState::load(store.clone(), hasher(), num).unwrap()
    }

    #[test]
    fn nullifier_is_recorded_once() {
        let store = Arc::new(MemStore::new());
        let mut s = fresh(&store, 1);
        s.add_nullifier(Nullifier([7u8; 32])).unwrap();
        let err = s.add_nullifier(Nullifier([7u8; 32])).unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
        s.finalize().unwrap();

        let s2 = fresh(&store, 2);
        assert!(s2.has_nullifier(&Nullifier([7u8; 32])).unwrap());
    }

    #[test]
    fn revert_restores_store_and_frontier() {
        let store = Arc::new(MemStore::new());
        let mut s = fresh(&store, 1);
        s.add_output(Output::Transparent(out_o(1))).unwrap();
        s.finalize().unwrap();
        let before = store.dump().unwrap();

        let mut s = fresh(&store, 2);
        let root_before = s.root();
        let r = s.add_output(Output::Transparent(out_o(2))).unwrap();
        s.add_nullifier(Nullifier([9u8; 32])).unwrap();
        assert!(s.get_output(&r).unwrap().is_some());
        s.revert().unwrap();
        assert_eq!(s.root(), root_before);
        assert!(s.get_output(&r).unwrap().is_none());
        assert!(!s.has_nullifier(&Nullifier([9u8; 32])).unwrap());
        assert_eq!(store.dump().unwrap(), before);
    }

    #[test]
    fn tree_rolls_over_and_block_trees_replay() {
        let store = Arc::new(MemStore::new());
        let mut s = fresh(&store, 1);
        let mut roots = Vec::new();
        for v in 1..=10u128 {
            roots.push(s.add_output(Output::Transparent(out_o(v))).unwrap());
        }
        assert_eq!(s.index(), 9);
        // depth 3 holds 8 leaves; leaves 8 and 9 live in a second tree
        assert_eq!(s.tree().size(), 2);
        let trees = s.block_trees().unwrap();
        assert_eq!(trees.len(), 10);
        for (i, (idx, t)) in trees.iter().enumerate() {
            assert_eq!(*idx, i as u64);
            assert_eq!(t.root(), roots[i]);
        }
        assert_eq!(s.get_output(&roots[9]).unwrap().unwrap().index, 9);
    }

    #[test]
    fn finalize_writes_block_record() {
        let store = Arc::new(MemStore::new());
        let mut s = fresh(&store, 4);
        s.add_output(Output::Transparent(out_o(5))).unwrap();
        s.add_nullifier(Nullifier([3u8; 32])).unwrap();
        let done = s.finalize().unwrap();
        assert_eq!((done.commitments, done.nullifiers), (1, 1));
        let rec = BlockRecord::load(store.as_ref(), &hasher(), 4).unwrap().unwrap();
        assert_eq!(rec.index_before, -1);
        assert_eq!(rec.dels, vec![Nullifier([3u8; 32])]);
        assert_eq!(rec.summary, done.summary);
        assert_eq!(fresh(&store, 5).index(), 0);
    }

    #[test]
    fn finalize_drains_package_markers() {
        let store = Arc::new(MemStore::new());
        let mut s = fresh(&store, 2);
        s.pkg_touched.push(PkgId([4u8; 32]));
        s.finalize().unwrap();
        assert!(s.pkg_touched.is_empty());
        assert_eq!(s.packages_touched(2).unwrap(), vec![PkgId([4u8; 32])]);

        // once drained, lookups follow the store
        let mut none = Vec::new();
        Vec::<PkgId>::new().encode(&mut none);
        store.write_batch(vec![(pkg_block_key(2), frame(STATE_V1, &none))]).unwrap();
        assert!(s.packages_touched(2).unwrap().is_empty());
    }
}
