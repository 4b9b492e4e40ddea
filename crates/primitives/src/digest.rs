//! Digest derivations for transparent commitments, nullifiers and sign hashes.

use blake2b_simd::Params as Blake2bParams;

use crate::encode::Encode;
use crate::types::*;

/// Domain separators for BLAKE2b-256 derivations.
const DS_CM_O_V1: &[u8; 16] = b"sero.cm.o.v1\0\0\0\0"; // 12 + 4 = 16
const DS_NF_O_V1: &[u8; 16] = b"sero.nf.o.v1\0\0\0\0"; // 12 + 4 = 16
const DS_TX_SIGN_V1: &[u8; 16] = b"sero.tx.sign.v1\0"; // 15 + 1 = 16

/// BLAKE2b-256 with a 16-byte personalization.
pub fn blake2b_32(personal: &[u8; 16], data: &[u8]) -> [u8; 32] {
    let hash = Blake2bParams::new().hash_length(32).personal(personal).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Leaf commitment of a transparent output. Outputs are public, so the
/// commitment binds the canonical encoding directly.
pub fn transparent_commitment(out: &OutO) -> Commitment {
    Commitment(blake2b_32(DS_CM_O_V1, &out.to_bytes()))
}

/// Spend tag of a transparent output. Anyone can recompute it from the
/// output's root, which keeps transparent double-spend checks stateless.
pub fn transparent_nullifier(root: &Root) -> Nullifier {
    Nullifier(blake2b_32(DS_NF_O_V1, &root.0))
}

/// Hash signed by the sender, the escrow holders and the balance signature.
/// Covers every field except the three signature slots.
pub fn sign_hash(tx: &Tx) -> [u8; 32] {
    let mut buf = Vec::new();
    tx.from.encode(&mut buf);
    tx.fee.encode(&mut buf);
    crate::encode::encode_u32(tx.desc_o.ins.len() as u32, &mut buf);
    for i in &tx.desc_o.ins {
        // Input signatures are produced over this hash, so they are excluded.
        i.root.encode(&mut buf);
        i.nil.encode(&mut buf);
    }
    tx.desc_o.outs.encode(&mut buf);
    tx.desc_z.ins.encode(&mut buf);
    tx.desc_z.outs.encode(&mut buf);
    tx.desc_pkg.create.encode(&mut buf);
    match &tx.desc_pkg.transfer {
        Some(t) => { buf.push(1); t.id.encode(&mut buf); t.to.encode(&mut buf); }
        None => buf.push(0),
    }
    match &tx.desc_pkg.close {
        Some(c) => { buf.push(1); c.id.encode(&mut buf); }
        None => buf.push(0),
    }
    blake2b_32(DS_TX_SIGN_V1, &buf)
}
