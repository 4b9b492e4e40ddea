//! Node compression and cached empty-subtree roots.
//!
//! Off-circuit compression maps BLAKE2b-512(left || right) onto the Vesta
//! scalar field and returns the canonical 32-byte repr, so every node is a
//! valid field element for the proving side.

use std::sync::Arc;

use blake2b_simd::Params as Blake2bParams;
use ff::FromUniformBytes;
use pasta_curves::vesta::Scalar as FrVesta;
use primitives::params::TREE_DEPTH;

/// Tree node (leaf commitment or interior hash).
pub type Node = [u8; 32];

const DOM_MERKLE: &[u8; 16] = b"sero.merkle.cmb\0"; // 15 + 1 = 16

/// Fixed compression function for two sibling nodes.
pub trait Combine: Send + Sync {
    fn combine(&self, left: &Node, right: &Node) -> Node;
}

/// Hash 64 bytes to a Pasta field element (Vesta scalar) and return its 32-byte LE repr.
pub fn hash64_to32(input: &[u8; 64]) -> Node {
    let mut wide = [0u8; 64];
    let hash = Blake2bParams::new().hash_length(64).personal(DOM_MERKLE).hash(input);
    wide.copy_from_slice(hash.as_bytes());
    let f = <FrVesta as FromUniformBytes<64>>::from_uniform_bytes(&wide);
    let mut out = [0u8; 32];
    out.copy_from_slice(&ff::PrimeField::to_repr(&f));
    out
}

/// Combine two 32-byte nodes into a parent hash.
pub fn compress_nodes(left: &Node, right: &Node) -> Node {
    let mut input = [0u8; 64];
    input[..32].copy_from_slice(left);
    input[32..].copy_from_slice(right);
    hash64_to32(&input)
}

/// Default compression used by the ledger.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake2bCombine;

impl Combine for Blake2bCombine {
    fn combine(&self, left: &Node, right: &Node) -> Node { compress_nodes(left, right) }
}

/// Compression function plus the empty-subtree roots for a fixed depth.
///
/// `empty_root(0)` is the all-zero leaf and `empty_root(i)` is
/// `combine(empty_root(i - 1), empty_root(i - 1))`. Cloning is cheap.
#[derive(Clone)]
pub struct TreeHasher {
    combine: Arc<dyn Combine>,
    empty: Arc<[Node]>,
    depth: usize,
}

impl TreeHasher {
    pub fn new(combine: Arc<dyn Combine>) -> Self { Self::with_depth(combine, TREE_DEPTH) }

    /// Trees of a smaller depth share every rule with the protocol depth.
    pub fn with_depth(combine: Arc<dyn Combine>, depth: usize) -> Self {
        assert!(depth >= 1 && depth < 64, "tree depth out of range");
        let mut empty = Vec::with_capacity(depth + 1);
        empty.push([0u8; 32]);
        for i in 1..=depth {
            let prev = empty[i - 1];
            empty.push(combine.combine(&prev, &prev));
        }
        Self { combine, empty: empty.into(), depth }
    }

    pub fn depth(&self) -> usize { self.depth }

    /// Leaf capacity of one tree (2^depth).
    pub fn capacity(&self) -> u64 { 1u64 << self.depth }

    pub fn combine(&self, left: &Node, right: &Node) -> Node { self.combine.combine(left, right) }

    pub fn empty_root(&self, level: usize) -> Node {
        // Levels past the depth never occur inside a tree of this depth.
        self.empty[level.min(self.depth)]
    }
}

impl Default for TreeHasher {
    fn default() -> Self { Self::new(Arc::new(Blake2bCombine)) }
}

impl core::fmt::Debug for TreeHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TreeHasher").field("depth", &self.depth).finish()
    }
}

/// Queue of caller-supplied sibling nodes, falling back to empty roots once
/// the queue runs dry.
pub(crate) struct PathFiller<'a> {
    queue: core::slice::Iter<'a, Node>,
    hasher: &'a TreeHasher,
}

impl<'a> PathFiller<'a> {
    pub(crate) fn new(hasher: &'a TreeHasher, filler: &'a [Node]) -> Self {
        Self { queue: filler.iter(), hasher }
    }

    pub(crate) fn next(&mut self, level: usize) -> Node {
        match self.queue.next() {
            Some(n) => *n,
            None => self.hasher.empty_root(level),
        }
    }
}
