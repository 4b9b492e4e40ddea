//! Incremental witness for the last leaf of a tree snapshot.
//!
//! The witness keeps the snapshot plus the sibling nodes that later appends
//! have completed (`filled`) and at most one partially built subtree
//! (`cursor`). The path is always derivable without the full tree.

use primitives::encode::{encode_u32, read_u32, Decode, Encode};
use primitives::{Commitment, Root};

use crate::error::{AccumError, Result};
use crate::hash::{Node, TreeHasher};
use crate::path::AuthPath;
use crate::tree::Tree;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Witness {
    tree: Tree,
    filled: Vec<Node>,
    cursor: Option<Tree>,
    cursor_depth: usize,
}

impl Witness {
    /// Witness for the most recent leaf of `tree`.
    pub fn from_tree(tree: Tree) -> Self { Self { tree, filled: Vec::new(), cursor: None, cursor_depth: 0 } }

    pub fn hasher(&self) -> &TreeHasher { self.tree.hasher() }

    /// The leaf this witness authenticates.
    pub fn element(&self) -> Result<Commitment> { self.tree.last() }

    /// Leaf position inside its tree.
    pub fn position(&self) -> Result<u64> {
        if self.tree.is_empty() {
            return Err(AccumError::Empty);
        }
        Ok(self.tree.size() - 1)
    }

    /// No later append can change the path.
    pub fn is_complete(&self) -> bool {
        self.cursor.is_none() && self.tree.next_depth(self.filled.len()) >= self.tree.depth()
    }

    /// Fold the next appended commitment into the path.
    pub fn append(&mut self, cm: Commitment) -> Result<()> {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.push(cm.0)?;
            if cursor.is_complete_at(self.cursor_depth) {
                self.filled.push(cursor.root_with_filler(&[], self.cursor_depth));
                self.cursor = None;
            }
            return Ok(());
        }

        let depth = self.tree.next_depth(self.filled.len());
        if depth >= self.tree.depth() {
            return Err(AccumError::Invariant("witness advanced past a full tree".into()));
        }
        self.cursor_depth = depth;
        if depth == 0 {
            self.filled.push(cm.0);
        } else {
            let mut cursor = Tree::new(self.tree.hasher().clone());
            cursor.push(cm.0)?;
            self.cursor = Some(cursor);
        }
        Ok(())
    }

    fn partial_path(&self) -> Vec<Node> {
        let mut uncles = self.filled.clone();
        if let Some(cursor) = &self.cursor {
            uncles.push(cursor.root_with_filler(&[], self.cursor_depth));
        }
        uncles
    }

    /// Root of the tree as of the latest append.
    pub fn root(&self) -> Root { Root(self.tree.root_with_filler(&self.partial_path(), self.tree.depth())) }

    pub fn path(&self) -> Result<AuthPath> { self.tree.path_with_filler(&self.partial_path()) }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.tree.encode(out);
        self.filled.encode(out);
        match &self.cursor {
            Some(c) => {
                out.push(1);
                c.encode(out);
            }
            None => out.push(0),
        }
        encode_u32(self.cursor_depth as u32, out);
    }

    pub fn decode(hasher: TreeHasher, data: &mut &[u8]) -> anyhow::Result<Self> {
        let tree = Tree::decode(hasher.clone(), data)?;
        let filled = Vec::<Node>::decode(data)?;
        let cursor = if bool::decode(data)? { Some(Tree::decode(hasher, data)?) } else { None };
        let cursor_depth = read_u32(data)? as usize;
        if cursor_depth >= tree.depth() {
            anyhow::bail!("witness cursor depth {} out of range", cursor_depth);
        }
        Ok(Self { tree, filled, cursor, cursor_depth })
    }
}
