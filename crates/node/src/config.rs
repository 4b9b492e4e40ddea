use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use pcd::PoolConfig;
use primitives::params::{ParamTable, CHECKPOINT_MARGIN};

/// Node settings, read from a JSON file. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    /// Wallet checkpoints. Defaults to `<data_dir>/checkpoints`.
    pub checkpoint_dir: Option<PathBuf>,
    /// Blocks below the head that always keep their checkpoint.
    pub retention_margin: u64,
    /// Blocks between two pruning passes.
    pub prune_interval: u64,
    pub pool: PoolConfig,
    pub params: ParamTable,
    /// Default filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            checkpoint_dir: None,
            retention_margin: CHECKPOINT_MARGIN,
            prune_interval: 16,
            pool: PoolConfig::default(),
            params: ParamTable::default(),
            log_level: "info".into(),
        }
    }
}

impl NodeConfig {
    pub fn from_json(s: &str) -> anyhow::Result<Self> { serde_json::from_str(s).context("parse node config") }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&s)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir.clone().unwrap_or_else(|| self.data_dir.join("checkpoints"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = NodeConfig::from_json(r#"{ "data_dir": "/tmp/n", "params": { "sip2_height": 7, "vp0_height": 0, "pkg_height": 9 } }"#).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/n"));
        assert_eq!(cfg.checkpoint_dir(), PathBuf::from("/tmp/n/checkpoints"));
        assert_eq!(cfg.params.sip2_height, 7);
        assert_eq!(cfg.retention_margin, CHECKPOINT_MARGIN);
        assert_eq!(cfg.pool, PoolConfig::default());
    }

    #[test]
    fn unknown_file_is_an_error() {
        let dir = std::env::temp_dir().join("no-such-node-config.json");
        assert!(NodeConfig::load(dir).is_err());
    }
}
