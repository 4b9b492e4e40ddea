//! Append-only incremental Merkle tree.
//!
//! Only the frontier is kept: the two lowest leaves and one optional node per
//! higher level. The parent vector sits behind an `Arc`, so snapshots taken
//! after every append share storage until one of them is written to.

use std::sync::Arc;

use primitives::encode::{Decode, Encode};
use primitives::{Commitment, Root};

use crate::error::{AccumError, Result};
use crate::hash::{Node, PathFiller, TreeHasher};
use crate::path::AuthPath;

#[derive(Clone)]
pub struct Tree {
    hasher: TreeHasher,
    left: Option<Node>,
    right: Option<Node>,
    parents: Arc<Vec<Option<Node>>>,
}

impl Tree {
    pub fn new(hasher: TreeHasher) -> Self {
        Self { hasher, left: None, right: None, parents: Arc::new(Vec::new()) }
    }

    pub fn hasher(&self) -> &TreeHasher { &self.hasher }

    pub fn depth(&self) -> usize { self.hasher.depth() }

    /// Append a commitment and return the new root.
    pub fn append(&mut self, cm: Commitment) -> Result<Root> {
        self.push(cm.0)?;
        Ok(self.root())
    }

    pub(crate) fn push(&mut self, node: Node) -> Result<()> {
        if self.is_complete() {
            return Err(AccumError::TreeFull);
        }
        let mut combined = match (self.left, self.right) {
            (None, _) => {
                self.left = Some(node);
                return Ok(());
            }
            (Some(_), None) => {
                self.right = Some(node);
                return Ok(());
            }
            (Some(l), Some(r)) => self.hasher.combine(&l, &r),
        };
        self.left = Some(node);
        self.right = None;

        let parents = Arc::make_mut(&mut self.parents);
        for slot in parents.iter_mut() {
            match slot.take() {
                Some(p) => combined = self.hasher.combine(&p, &combined),
                None => {
                    *slot = Some(combined);
                    return Ok(());
                }
            }
        }
        parents.push(Some(combined));
        Ok(())
    }

    pub fn root(&self) -> Root { Root(self.root_with_filler(&[], self.depth())) }

    /// Root of the tree seen at `depth`, taking missing siblings from
    /// `filler` in order and then from the empty roots.
    pub fn root_with_filler(&self, filler: &[Node], depth: usize) -> Node {
        let mut filler = PathFiller::new(&self.hasher, filler);
        let l = match self.left { Some(l) => l, None => filler.next(0) };
        let r = match self.right { Some(r) => r, None => filler.next(0) };
        let mut root = self.hasher.combine(&l, &r);
        let mut d = 1;
        for parent in self.parents.iter() {
            root = match parent {
                Some(p) => self.hasher.combine(p, &root),
                None => self.hasher.combine(&root, &filler.next(d)),
            };
            d += 1;
        }
        while d < depth {
            root = self.hasher.combine(&root, &filler.next(d));
            d += 1;
        }
        root
    }

    /// Authentication path of the most recent leaf, completing missing
    /// siblings from `filler`.
    pub fn path_with_filler(&self, filler: &[Node]) -> Result<AuthPath> {
        let leaf = self.left.ok_or(AccumError::Empty)?;
        let depth = self.depth();
        let mut filler = PathFiller::new(&self.hasher, filler);
        let mut siblings = Vec::with_capacity(depth);
        let mut index = 0u64;
        let leaf = match self.right {
            Some(r) => {
                index |= 1;
                siblings.push(leaf);
                r
            }
            None => {
                siblings.push(filler.next(0));
                leaf
            }
        };
        let mut d = 1;
        for parent in self.parents.iter() {
            match parent {
                Some(p) => {
                    index |= 1u64 << d;
                    siblings.push(*p);
                }
                None => siblings.push(filler.next(d)),
            }
            d += 1;
        }
        while d < depth {
            siblings.push(filler.next(d));
            d += 1;
        }
        siblings.reverse();
        let mut path = AuthPath { anchor: Root::default(), leaf: Commitment(leaf), path: siblings, index };
        path.anchor = path.root(&self.hasher);
        Ok(path)
    }

    pub fn is_complete(&self) -> bool { self.is_complete_at(self.depth()) }

    pub fn is_complete_at(&self, depth: usize) -> bool {
        if self.left.is_none() || self.right.is_none() {
            return false;
        }
        if self.parents.len() != depth - 1 {
            return false;
        }
        self.parents.iter().all(|p| p.is_some())
    }

    /// Depth of the first unfilled sibling slot after skipping `skip` of them.
    pub fn next_depth(&self, mut skip: usize) -> usize {
        if self.left.is_none() {
            if skip == 0 { return 0; }
            skip -= 1;
        }
        if self.right.is_none() {
            if skip == 0 { return 0; }
            skip -= 1;
        }
        let mut d = 1;
        for parent in self.parents.iter() {
            if parent.is_none() {
                if skip == 0 { return d; }
                skip -= 1;
            }
            d += 1;
        }
        d + skip
    }

    /// Number of leaves appended so far.
    pub fn size(&self) -> u64 {
        let mut n = self.left.is_some() as u64 + self.right.is_some() as u64;
        for (i, p) in self.parents.iter().enumerate() {
            if p.is_some() {
                n += 1 << (i + 1);
            }
        }
        n
    }

    pub fn is_empty(&self) -> bool { self.left.is_none() }

    /// Most recently appended leaf.
    pub fn last(&self) -> Result<Commitment> {
        self.right.or(self.left).map(Commitment).ok_or(AccumError::Empty)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.left.encode(out);
        self.right.encode(out);
        self.parents.encode(out);
    }

    pub fn decode(hasher: TreeHasher, data: &mut &[u8]) -> anyhow::Result<Self> {
        let left = Option::<Node>::decode(data)?;
        let right = Option::<Node>::decode(data)?;
        let parents = Vec::<Option<Node>>::decode(data)?;
        if parents.len() >= hasher.depth() {
            anyhow::bail!("tree frontier deeper than {}", hasher.depth());
        }
        if left.is_none() && (right.is_some() || !parents.is_empty()) {
            anyhow::bail!("tree frontier has a gap");
        }
        Ok(Self { hasher, left, right, parents: Arc::new(parents) })
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.hasher.depth() == other.hasher.depth()
            && self.left == other.left
            && self.right == other.right
            && self.parents == other.parents
    }
}

impl Eq for Tree {}

impl core::fmt::Debug for Tree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tree")
            .field("depth", &self.depth())
            .field("size", &self.size())
            .field("root", &self.root())
            .finish()
    }
}
