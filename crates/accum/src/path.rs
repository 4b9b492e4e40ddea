//! Authentication paths and their O(1) advancement.

use serde::{Deserialize, Serialize};

use primitives::encode::{encode_u64, read_u64, Decode, Encode};
use primitives::{Commitment, Root};

use crate::error::{AccumError, Result};
use crate::hash::{Node, TreeHasher};
use crate::tree::Tree;

/// Path from a leaf to `anchor`.
///
/// `path` is stored root-side first, so `path[depth - 1]` is the leaf's
/// immediate sibling. Bit `l` of `index` is set when the leaf's ancestor at
/// level `l` is a right child.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct AuthPath {
    pub anchor: Root,
    pub leaf: Commitment,
    pub path: Vec<Node>,
    pub index: u64,
}

impl AuthPath {
    /// Path of the last leaf of `tree`.
    pub fn from_tree(tree: &Tree) -> Result<Self> { tree.path_with_filler(&[]) }

    pub fn depth(&self) -> usize { self.path.len() }

    /// Intermediate roots: `roots[0]` is the leaf, `roots[depth]` the root.
    pub fn roots(&self, hasher: &TreeHasher) -> Vec<Node> {
        let depth = self.depth();
        let mut roots = Vec::with_capacity(depth + 1);
        let mut r = self.leaf.0;
        roots.push(r);
        for j in 1..=depth {
            let sibling = &self.path[depth - j];
            r = if (self.index >> (j - 1)) & 1 == 0 {
                hasher.combine(&r, sibling)
            } else {
                hasher.combine(sibling, &r)
            };
            roots.push(r);
        }
        roots
    }

    pub fn root(&self, hasher: &TreeHasher) -> Root {
        let mut r = self.leaf.0;
        let depth = self.depth();
        for j in 1..=depth {
            let sibling = &self.path[depth - j];
            r = if (self.index >> (j - 1)) & 1 == 0 {
                hasher.combine(&r, sibling)
            } else {
                hasher.combine(sibling, &r)
            };
        }
        Root(r)
    }

    /// Whether the path reproduces its anchor.
    pub fn verify(&self, hasher: &TreeHasher) -> bool { self.root(hasher) == self.anchor }

    /// No later leaf can change this path.
    pub fn is_complete(&self) -> bool {
        let depth = self.depth();
        depth > 0 && self.index == (1u64 << depth) - 1
    }

    /// Update this path for a leaf appended after it.
    ///
    /// `later_roots` are the intermediate roots of the newly appended leaf's
    /// own path. Paths must be advanced from newest to oldest with one
    /// shared cursor per appended leaf.
    pub fn advance(&mut self, cursor: &mut IndexCursor, later_roots: &[Node]) -> Result<()> {
        let depth = self.depth();
        if later_roots.len() != depth + 1 {
            return Err(AccumError::Invariant(format!(
                "expected {} intermediate roots, got {}",
                depth + 1,
                later_roots.len()
            )));
        }
        let start = cursor.parse(self.index, depth)?;
        self.path[depth - start - 1] = later_roots[start];
        self.anchor = Root(later_roots[depth]);
        Ok(())
    }
}

/// Locates the level where an older leaf's path meets a newer leaf.
#[derive(Clone, Copy, Debug)]
pub struct IndexCursor {
    left: u64,
    count: usize,
}

impl IndexCursor {
    pub fn new(new_index: u64) -> Self { Self { left: new_index, count: 0 } }

    /// Level whose sibling changes for the leaf at `old_index`.
    pub fn parse(&mut self, old_index: u64, depth: usize) -> Result<usize> {
        loop {
            if self.count > depth {
                return Err(AccumError::Invariant(format!(
                    "index {} does not precede cursor within depth {}",
                    old_index, depth
                )));
            }
            if old_index >> self.count == self.left {
                if self.count == 0 {
                    return Err(AccumError::Invariant(format!("index {} advanced against itself", old_index)));
                }
                return Ok(self.count - 1);
            }
            self.left >>= 1;
            self.count += 1;
        }
    }
}

impl Encode for AuthPath {
    fn encode(&self, out: &mut Vec<u8>) {
        self.anchor.encode(out);
        self.leaf.encode(out);
        self.path.encode(out);
        encode_u64(self.index, out);
    }
}

impl Decode for AuthPath {
    fn decode(data: &mut &[u8]) -> anyhow::Result<Self> {
        let anchor = Root::decode(data)?;
        let leaf = Commitment::decode(data)?;
        let path = Vec::<Node>::decode(data)?;
        let index = read_u64(data)?;
        Ok(AuthPath { anchor, leaf, path, index })
    }
}
