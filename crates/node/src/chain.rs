//! Block headers and the chain collaborator the node reads them from.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use accum::TreeHasher;
use consensus::{FinalizedBlock, KvStore, LedgerState};
use primitives::{Root, ViewKey};

use crate::error::{NodeError, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Header {
    pub num: u64,
    pub hash: [u8; 32],
    pub parent: [u8; 32],
    /// Commitment tree root after the block.
    pub root: Root,
}

impl Header {
    /// Header sealing `block` on top of `parent`.
    pub fn seal(parent: Option<&Header>, block: &FinalizedBlock) -> Self {
        let parent = parent.map(|h| h.hash).unwrap_or([0u8; 32]);
        let mut st = blake2b_simd::Params::new().hash_length(32).personal(b"blk.header.v1\0\0\0").to_state();
        st.update(&parent);
        st.update(&block.num.to_le_bytes());
        st.update(&block.root.0);
        st.update(&block.summary.summary_hash());
        let mut hash = [0u8; 32];
        hash.copy_from_slice(st.finalize().as_bytes());
        Self { num: block.num, hash, parent, root: block.root }
    }
}

/// What the node needs from the surrounding chain: headers, a ledger
/// state to build the next block on, and the keys it scans for.
pub trait Chain: Send + Sync {
    fn current_header(&self) -> Option<Header>;

    fn header_by_hash(&self, hash: &[u8; 32]) -> Option<Header>;

    /// State for the block following `at`, or for genesis when `at` is None.
    fn new_ledger_state(&self, at: Option<&[u8; 32]>) -> Result<LedgerState>;

    fn held_viewing_keys(&self) -> Vec<ViewKey>;

    /// Record a finalized block's header as the new head.
    fn append(&self, header: Header) -> Result<()>;
}

/// Single-branch chain over a key-value store.
pub struct MemChain {
    store: Arc<dyn KvStore>,
    hasher: TreeHasher,
    keys: Vec<ViewKey>,
    headers: RwLock<Vec<Header>>,
}

impl MemChain {
    pub fn new(store: Arc<dyn KvStore>, hasher: TreeHasher, keys: Vec<ViewKey>) -> Self {
        Self { store, hasher, keys, headers: RwLock::new(Vec::new()) }
    }

    /// Reopen over a store that already holds blocks, with their headers.
    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = RwLock::new(headers);
        self
    }

    pub fn store(&self) -> &Arc<dyn KvStore> { &self.store }

    pub fn headers(&self) -> Vec<Header> { self.headers.read().map(|h| h.clone()).unwrap_or_default() }

    fn lock_err() -> NodeError { NodeError::Fatal("chain lock poisoned".into()) }
}

impl Chain for MemChain {
    fn current_header(&self) -> Option<Header> { self.headers.read().ok()?.last().copied() }

    fn header_by_hash(&self, hash: &[u8; 32]) -> Option<Header> {
        self.headers.read().ok()?.iter().find(|h| h.hash == *hash).copied()
    }

    fn new_ledger_state(&self, at: Option<&[u8; 32]>) -> Result<LedgerState> {
        let head = self.current_header();
        let num = match (at, head) {
            (None, None) => 0,
            (Some(hash), Some(head)) if head.hash == *hash => head.num + 1,
            (Some(hash), _) => {
                return Err(match self.header_by_hash(hash) {
                    Some(h) => NodeError::Chain(format!("block {} is not the head, forks are not kept", h.num)),
                    None => NodeError::Chain(format!("unknown block {}", hex::encode(hash))),
                })
            }
            (None, Some(head)) => return Err(NodeError::Chain(format!("chain already at block {}", head.num))),
        };
        Ok(LedgerState::load(self.store.clone(), self.hasher.clone(), num)?)
    }

    fn held_viewing_keys(&self) -> Vec<ViewKey> { self.keys.clone() }

    fn append(&self, header: Header) -> Result<()> {
        let mut headers = self.headers.write().map_err(|_| Self::lock_err())?;
        let expect = headers.last().map(|h| (h.num + 1, h.hash)).unwrap_or((0, [0u8; 32]));
        if (header.num, header.parent) != expect {
            return Err(NodeError::Chain(format!("header {} does not extend the head", header.num)));
        }
        headers.push(header);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accum::Blake2bCombine;
    use consensus::MemStore;

    fn chain() -> MemChain {
        let hasher = TreeHasher::with_depth(Arc::new(Blake2bCombine), 4);
        MemChain::new(Arc::new(MemStore::new()), hasher, vec![])
    }

    #[test]
    fn headers_must_extend_the_head() {
        let c = chain();
        let mut s = c.new_ledger_state(None).unwrap();
        let done = s.finalize().unwrap();
        let h0 = Header::seal(None, &done);
        c.append(h0).unwrap();
        assert!(c.append(h0).is_err());
        assert_eq!(c.header_by_hash(&h0.hash), Some(h0));
        assert!(matches!(c.new_ledger_state(None), Err(NodeError::Chain(_))));
        assert!(matches!(c.new_ledger_state(Some(&[1u8; 32])), Err(NodeError::Chain(_))));
        assert_eq!(c.new_ledger_state(Some(&h0.hash)).unwrap().num(), 1);
    }

    #[test]
    fn header_hash_commits_to_parent() {
        let c = chain();
        let done = c.new_ledger_state(None).unwrap().finalize().unwrap();
        let a = Header::seal(None, &done);
        let b = Header::seal(Some(&a), &done);
        assert_ne!(a.hash, b.hash);
        assert_eq!(b.parent, a.hash);
    }
}
