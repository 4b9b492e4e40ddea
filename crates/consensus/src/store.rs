//! Durable key-value store contract used by the ledger.
//!
//! Keys are domain-prefixed byte strings. Writes arrive as one ordered batch
//! per finalized block.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{LedgerError, Result};

pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply all writes atomically, in the given order.
    fn write_batch(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()>;

    /// Every entry whose key starts with `prefix`, in key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    fn contains(&self, key: &[u8]) -> Result<bool> { Ok(self.get(key)?.is_some()) }
}

/// In-memory store.
#[derive(Default, Debug)]
pub struct MemStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.map.read().map(|m| m.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Full copy of the contents, for state comparisons.
    pub fn dump(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let map = self.map.read().map_err(|_| LedgerError::Store("mem store lock poisoned".into()))?;
        Ok(map.clone())
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let map = self.map.read().map_err(|_| LedgerError::Store("mem store lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn write_batch(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut map = self.map.write().map_err(|_| LedgerError::Store("mem store lock poisoned".into()))?;
        for (k, v) in batch {
            map.insert(k, v);
        }
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read().map_err(|_| LedgerError::Store("mem store lock poisoned".into()))?;
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

#[cfg(feature = "rocksdb")]
mod rocks {
    use std::path::Path;

    use rocksdb::{Direction, IteratorMode, WriteBatch, DB};

    use super::KvStore;
    use crate::error::{LedgerError, Result};

    /// RocksDB-backed store.
    pub struct RocksStore {
        db: DB,
    }

    impl RocksStore {
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let db = DB::open_default(path).map_err(|e| LedgerError::Store(e.to_string()))?;
            Ok(Self { db })
        }
    }

    impl KvStore for RocksStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
            self.db.get(key).map_err(|e| LedgerError::Store(e.to_string()))
        }

        fn write_batch(&self, batch: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
            let mut wb = WriteBatch::default();
            for (k, v) in batch {
                wb.put(k, v);
            }
            self.db.write(wb).map_err(|e| LedgerError::Store(e.to_string()))
        }

        fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
            let mut out = Vec::new();
            for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
                let (k, v) = item.map_err(|e| LedgerError::Store(e.to_string()))?;
                if !k.starts_with(prefix) {
                    break;
                }
                out.push((k.to_vec(), v.to_vec()));
            }
            Ok(out)
        }
    }
}
