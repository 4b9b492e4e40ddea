//! Per-block summary digests persisted with each block record.

use blake2b_simd::Params as Blake2bParams;
use serde::{Deserialize, Serialize};

use primitives::{Commitment, Nullifier, Root};

/// BLAKE2b-256 digest of the commitment tree root after the block.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct RootDigest(pub [u8; 32]);

/// BLAKE2b-256 digest of the ordered per-block nullifier vector.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct NullifierBlockDigest(pub [u8; 32]);

/// BLAKE2b-256 digest of the per-block commitment-tree delta (ordered adds).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct CommitmentDeltaDigest(pub [u8; 32]);

/// Digest triple identifying a block's effect on the shielded pool.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct BlockSummary {
    pub root_digest: RootDigest,
    pub nullifier_block_digest: NullifierBlockDigest,
    pub commitment_delta_digest: CommitmentDeltaDigest,
}

const DS_ROOT_V1: &[u8; 16] = b"sero.root.v1\0\0\0\0"; // 12 + 4 = 16
const DS_NF_BLOCK_V1: &[u8; 16] = b"nf.block.v1\0\0\0\0\0"; // 11 + 5 = 16
const DS_CM_DELTA_V1: &[u8; 16] = b"cm.delta.v1\0\0\0\0\0"; // 11 + 5 = 16
const DS_SUMMARY_V1: &[u8; 16] = b"blk.summary.v1\0\0"; // 14 + 2 = 16

fn digest(personal: &[u8; 16], data: &[u8]) -> [u8; 32] {
    let hash = Blake2bParams::new().hash_length(32).personal(personal).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

pub fn compute_root_digest(root: &Root) -> RootDigest { RootDigest(digest(DS_ROOT_V1, &root.0)) }

/// Compute BLAKE2b-256 digest of the ordered per-block nullifier vector.
pub fn compute_nullifier_block_digest(nullifiers: &[Nullifier]) -> NullifierBlockDigest {
    let mut buf = Vec::with_capacity(4 + nullifiers.len() * 32);
    encode_u32(nullifiers.len() as u32, &mut buf);
    for nf in nullifiers {
        buf.extend_from_slice(&nf.0);
    }
    NullifierBlockDigest(digest(DS_NF_BLOCK_V1, &buf))
}

/// Compute BLAKE2b-256 digest of the ordered per-block commitment additions.
pub fn compute_commitment_delta_digest(commitments: &[Commitment]) -> CommitmentDeltaDigest {
    let mut buf = Vec::with_capacity(4 + commitments.len() * 32);
    encode_u32(commitments.len() as u32, &mut buf);
    for cm in commitments {
        buf.extend_from_slice(&cm.0);
    }
    CommitmentDeltaDigest(digest(DS_CM_DELTA_V1, &buf))
}

impl BlockSummary {
    pub fn compute(root: &Root, nullifiers: &[Nullifier], commitments: &[Commitment]) -> Self {
        Self {
            root_digest: compute_root_digest(root),
            nullifier_block_digest: compute_nullifier_block_digest(nullifiers),
            commitment_delta_digest: compute_commitment_delta_digest(commitments),
        }
    }

    /// Hash the digest triple into a single 32-byte value (domain-separated).
    pub fn summary_hash(&self) -> [u8; 32] {
        let mut buf = [0u8; 96];
        buf[..32].copy_from_slice(&self.root_digest.0);
        buf[32..64].copy_from_slice(&self.nullifier_block_digest.0);
        buf[64..].copy_from_slice(&self.commitment_delta_digest.0);
        digest(DS_SUMMARY_V1, &buf)
    }
}

#[inline]
fn encode_u32(v: u32, out: &mut Vec<u8>) { out.extend_from_slice(&v.to_be_bytes()); }
