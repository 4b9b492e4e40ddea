use std::sync::{Arc, RwLock};

use consensus::FinalizedBlock;
use primitives::Root;

use crate::chain::Header;

/// What readers see of the last finalized block.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Snapshot {
    pub head: Option<Header>,
    pub block: Option<FinalizedBlock>,
}

impl Snapshot {
    /// Height the next block will have.
    pub fn next_num(&self) -> u64 { self.head.map(|h| h.num + 1).unwrap_or(0) }

    pub fn root(&self) -> Root { self.head.map(|h| h.root).unwrap_or_default() }
}

/// Shared pointer to the current snapshot. Readers clone the `Arc` and
/// keep a consistent view while the writer swaps in the next one.
#[derive(Debug, Default)]
pub struct StateHandle {
    current: RwLock<Arc<Snapshot>>,
}

impl StateHandle {
    pub fn new(snapshot: Snapshot) -> Self { Self { current: RwLock::new(Arc::new(snapshot)) } }

    pub fn load(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publish `next`, returning the snapshot it replaced.
    pub fn swap(&self, next: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(next);
        match self.current.write() {
            Ok(mut g) => std::mem::replace(&mut *g, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}
