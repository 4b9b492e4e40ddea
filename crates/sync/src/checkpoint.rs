//! Wallet checkpoint files and their retention.
//!
//! One file per scanned block, named by height and a slice of the tree root
//! after the block. Old files are thinned out so that density falls off
//! exponentially with distance from the chain head.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use consensus::BlockRecord;
use pcd::Oracle;
use primitives::params::CHECKPOINT_MARGIN;
use primitives::wire::{frame, unframe};
use primitives::{Root, ViewKey};

use crate::error::{Result, WalletError};
use crate::wallet::WalletState;

/// Encoding version of checkpoint files.
pub const CHECKPOINT_V1: u8 = 1;

const BUCKETS: usize = 32;

pub fn checkpoint_name(num: u64, root: &Root) -> String { format!("{:010}.{}", num, hex::encode(&root.0[4..16])) }

/// Height encoded in a checkpoint file name.
pub fn parse_checkpoint_name(name: &str) -> Option<u64> {
    let (num, tag) = name.split_once('.')?;
    if num.len() != 10 || tag.len() != 24 || hex::decode(tag).is_err() {
        return None;
    }
    num.parse().ok()
}

fn bitlen(v: u64) -> usize { (u64::BITS - v.leading_zeros()) as usize }

#[derive(Clone, Default, Debug)]
struct Bucket {
    max_num: u64,
    files: Vec<PathBuf>,
}

/// Decides which checkpoints survive relative to a target height.
///
/// Files above the target or within `margin` below it are always kept.
/// Older files fall into bucket `bitlen(target - margin - num)`, and each
/// bucket keeps only its highest-numbered files.
#[derive(Clone, Debug)]
pub struct Retention {
    buckets: Vec<Bucket>,
    target: u64,
    margin: u64,
}

impl Retention {
    pub fn new(target: u64, margin: u64) -> Self { Self { buckets: vec![Bucket::default(); BUCKETS], target, margin } }

    /// Offer `file` at height `num`. Returns the files it makes obsolete,
    /// which may be `file` itself.
    pub fn insert(&mut self, num: u64, file: PathBuf) -> Vec<PathBuf> {
        if num > self.target || self.target - num < self.margin {
            return Vec::new();
        }
        let slot = bitlen(self.target - self.margin - num);
        let Some(bucket) = self.buckets.get_mut(slot) else {
            return vec![file];
        };
        if bucket.max_num > num {
            vec![file]
        } else if bucket.max_num < num {
            bucket.max_num = num;
            std::mem::replace(&mut bucket.files, vec![file])
        } else {
            bucket.files.push(file);
            Vec::new()
        }
    }
}

/// Directory of checkpoint files for one wallet.
pub struct CheckpointDir {
    dir: PathBuf,
    margin: u64,
    interval: u64,
    last_pruned: Option<u64>,
}

impl CheckpointDir {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self { dir: dir.as_ref().to_path_buf(), margin: CHECKPOINT_MARGIN, interval: 1, last_pruned: None })
    }

    /// Keep `margin` blocks below the head and prune at most once per `interval` blocks.
    pub fn with_retention(mut self, margin: u64, interval: u64) -> Self {
        self.margin = margin;
        self.interval = interval.max(1);
        self
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn path(&self, num: u64, root: &Root) -> PathBuf { self.dir.join(checkpoint_name(num, root)) }

    /// Write the wallet state after block `num` whose tree root is `root`.
    /// A file that cannot be read back is removed and the error returned.
    pub fn save(&self, state: &WalletState, num: u64, root: &Root) -> Result<PathBuf> {
        let path = self.path(num, root);
        let mut body = Vec::new();
        state.encode(&mut body);
        let bytes = frame(CHECKPOINT_V1, &body);

        let written = fs::write(&path, &bytes).map_err(WalletError::from).and_then(|_| {
            let back = fs::read(&path)?;
            let mut rest = unframe(CHECKPOINT_V1, &back).map_err(|e| corrupt(&path, e))?;
            WalletState::decode(state.oracle().clone(), state.keys().to_vec(), &mut rest).map_err(|e| corrupt(&path, e))?;
            Ok(())
        });
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "checkpoint write failed, removing partial file");
            if let Err(rm) = fs::remove_file(&path) {
                debug!(error = %rm, "partial checkpoint already gone");
            }
            return Err(e);
        }
        debug!(path = %path.display(), bytes = bytes.len(), "checkpoint saved");
        Ok(path)
    }

    /// Wallet state saved after block `num` with root `root`, if present.
    pub fn load(&self, oracle: Arc<dyn Oracle>, keys: Vec<ViewKey>, num: u64, root: &Root) -> Result<Option<WalletState>> {
        let path = self.path(num, root);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut rest = unframe(CHECKPOINT_V1, &bytes).map_err(|e| corrupt(&path, e))?;
        let state = WalletState::decode(oracle, keys, &mut rest).map_err(|e| corrupt(&path, e))?;
        if !rest.is_empty() {
            return Err(corrupt(&path, anyhow::anyhow!("{} trailing bytes", rest.len())));
        }
        Ok(Some(state))
    }

    /// State to scan `block` on top of: the checkpoint of the previous block,
    /// keyed by the pre-block root, or a fresh state at genesis.
    pub fn load_for_block(&self, oracle: Arc<dyn Oracle>, keys: Vec<ViewKey>, block: &BlockRecord) -> Result<Option<WalletState>> {
        if block.num == 0 {
            return Ok(Some(WalletState::new(oracle, keys)));
        }
        self.load(oracle, keys, block.num - 1, &block.tree_before.root())
    }

    /// Remove checkpoints made obsolete at chain height `height`. Runs at most
    /// once per configured interval; returns the removed files.
    pub fn prune(&mut self, height: u64) -> Result<Vec<PathBuf>> {
        if let Some(last) = self.last_pruned {
            if height < last + self.interval {
                return Ok(Vec::new());
            }
        }
        self.last_pruned = Some(height);

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(num) = entry.file_name().to_str().and_then(parse_checkpoint_name) {
                files.push((num, entry.path()));
            }
        }
        files.sort();

        let mut retention = Retention::new(height, self.margin);
        let mut removed = Vec::new();
        for (num, path) in files {
            for old in retention.insert(num, path) {
                fs::remove_file(&old)?;
                removed.push(old);
            }
        }
        if !removed.is_empty() {
            info!(height, removed = removed.len(), "pruned checkpoints");
        }
        Ok(removed)
    }
}

fn corrupt(path: &Path, e: anyhow::Error) -> WalletError {
    WalletError::Checkpoint { path: path.to_path_buf(), reason: format!("{:#}", e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_sort_by_height() {
        let a = checkpoint_name(9, &Root([1u8; 32]));
        let b = checkpoint_name(10, &Root([0u8; 32]));
        assert!(a < b);
        assert_eq!(parse_checkpoint_name(&a), Some(9));
        assert_eq!(parse_checkpoint_name("0000000009.zz"), None);
        assert_eq!(&a[11..], "010101010101010101010101");
    }

    #[test]
    fn retention_keeps_recent_and_thins_old() {
        let mut r = Retention::new(1000, 64);
        assert!(r.insert(1001, "a".into()).is_empty());
        assert!(r.insert(990, "b".into()).is_empty());
        // 1000 - 64 - 930 = 6 -> bucket 3
        assert!(r.insert(929, "c".into()).is_empty());
        assert_eq!(r.insert(930, "d".into()), vec![PathBuf::from("c")]);
        assert_eq!(r.insert(929, "e".into()), vec![PathBuf::from("e")]);
        assert!(r.insert(930, "f".into()).is_empty());
    }
}
