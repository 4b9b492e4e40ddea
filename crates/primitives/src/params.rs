//! Protocol constants and the height-gated parameter table.

use serde::{Deserialize, Serialize};

/// Commitment tree depth (2^29 leaves per tree).
pub const TREE_DEPTH: usize = 29;
/// Maximum transparent outputs per transaction, fee output included.
pub const MAX_O_OUTS: usize = 10;
/// Shielded output cap before the SIP2 activation height.
pub const MAX_Z_OUTS_LEGACY: usize = 6;
/// Shielded output cap from SIP2 on.
pub const MAX_Z_OUTS_SIP2: usize = 500;
/// Transparent input cap from VP0 on.
pub const MAX_O_INS: usize = 2500;
/// Token values must leave the top byte clear.
pub const MAX_TOKEN_VALUE: u128 = u128::MAX >> 8;
/// Blocks below the chain head that checkpoints are always kept for.
pub const CHECKPOINT_MARGIN: u64 = 64;

/// Activation heights for rule changes. The defaults activate everything at
/// genesis; deployments pin the real heights through configuration.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct ParamTable {
    /// Raises the shielded output cap to `MAX_Z_OUTS_SIP2`.
    pub sip2_height: u64,
    /// Enables the transparent input cap.
    pub vp0_height: u64,
    /// First height that accepts escrow descriptors (wire v2).
    pub pkg_height: u64,
}

impl Default for ParamTable {
    fn default() -> Self {
        Self { sip2_height: 0, vp0_height: 0, pkg_height: 0 }
    }
}

impl ParamTable {
    pub fn max_o_outs(&self, _height: u64) -> usize { MAX_O_OUTS }

    pub fn max_z_outs(&self, height: u64) -> usize {
        if height >= self.sip2_height { MAX_Z_OUTS_SIP2 } else { MAX_Z_OUTS_LEGACY }
    }

    /// `None` before the cap activates.
    pub fn max_o_ins(&self, height: u64) -> Option<usize> {
        if height >= self.vp0_height { Some(MAX_O_INS) } else { None }
    }

    pub fn packages_enabled(&self, height: u64) -> bool { height >= self.pkg_height }

    /// Wire version new transactions are written with at `height`.
    pub fn wire_version(&self, height: u64) -> u8 {
        if self.packages_enabled(height) { crate::wire::TX_WIRE_V2 } else { crate::wire::TX_WIRE_V1 }
    }
}
