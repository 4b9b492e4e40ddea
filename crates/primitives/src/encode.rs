//! Canonical binary encoding for ledger types.
//!
//! Integers are big-endian, variable-length sequences carry a u32 length
//! prefix, and optional values carry a one-byte presence flag. Top-level
//! records are framed by a version tag (see `wire`).

use anyhow::{anyhow, Result};

use crate::types::*;

pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

pub trait Decode: Sized {
    fn decode(data: &mut &[u8]) -> Result<Self>;

    /// Decode a complete buffer, rejecting trailing bytes.
    fn from_bytes(mut data: &[u8]) -> Result<Self> {
        let v = Self::decode(&mut data)?;
        if !data.is_empty() { return Err(anyhow!("trailing bytes after {}", core::any::type_name::<Self>())); }
        Ok(v)
    }
}

// ——— Encoding primitives ———

pub fn encode_u8(v: u8, out: &mut Vec<u8>) { out.push(v); }
pub fn encode_u32(v: u32, out: &mut Vec<u8>) { out.extend_from_slice(&v.to_be_bytes()); }
pub fn encode_u64(v: u64, out: &mut Vec<u8>) { out.extend_from_slice(&v.to_be_bytes()); }
pub fn encode_u128(v: u128, out: &mut Vec<u8>) { out.extend_from_slice(&v.to_be_bytes()); }

pub fn read_u8(data: &mut &[u8]) -> Result<u8> {
    if data.is_empty() { return Err(anyhow!("unexpected EOF")); }
    let v = data[0];
    *data = &data[1..];
    Ok(v)
}

pub fn read_u32(data: &mut &[u8]) -> Result<u32> {
    Ok(u32::from_be_bytes(read_fixed::<4>(data)?))
}

pub fn read_u64(data: &mut &[u8]) -> Result<u64> {
    Ok(u64::from_be_bytes(read_fixed::<8>(data)?))
}

pub fn read_u128(data: &mut &[u8]) -> Result<u128> {
    Ok(u128::from_be_bytes(read_fixed::<16>(data)?))
}

pub fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    encode_u32(bytes.len() as u32, out);
    out.extend_from_slice(bytes);
}

pub fn read_vec(data: &mut &[u8]) -> Result<Vec<u8>> {
    let len = read_u32(data)? as usize;
    if data.len() < len { return Err(anyhow!("unexpected EOF")); }
    let v = data[..len].to_vec();
    *data = &data[len..];
    Ok(v)
}

pub fn read_fixed<const N: usize>(data: &mut &[u8]) -> Result<[u8; N]> {
    if data.len() < N { return Err(anyhow!("unexpected EOF")); }
    let mut out = [0u8; N];
    out.copy_from_slice(&data[..N]);
    *data = &data[N..];
    Ok(out)
}

pub fn read_bool(data: &mut &[u8]) -> Result<bool> {
    match read_u8(data)? {
        0 => Ok(false),
        1 => Ok(true),
        b => Err(anyhow!("invalid bool tag {}", b)),
    }
}

// ——— Generic impls ———

impl Encode for u64 {
    fn encode(&self, out: &mut Vec<u8>) { encode_u64(*self, out) }
}
impl Decode for u64 {
    fn decode(data: &mut &[u8]) -> Result<Self> { read_u64(data) }
}

impl Encode for bool {
    fn encode(&self, out: &mut Vec<u8>) { encode_u8(*self as u8, out) }
}
impl Decode for bool {
    fn decode(data: &mut &[u8]) -> Result<Self> { read_bool(data) }
}

impl Encode for [u8; HASH_LEN] {
    fn encode(&self, out: &mut Vec<u8>) { out.extend_from_slice(self) }
}
impl Decode for [u8; HASH_LEN] {
    fn decode(data: &mut &[u8]) -> Result<Self> { read_fixed::<HASH_LEN>(data) }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Some(v) => { encode_u8(1, out); v.encode(out); }
            None => encode_u8(0, out),
        }
    }
}
impl<T: Decode> Decode for Option<T> {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        if read_bool(data)? { Ok(Some(T::decode(data)?)) } else { Ok(None) }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_u32(self.len() as u32, out);
        for v in self { v.encode(out); }
    }
}
impl<T: Decode> Decode for Vec<T> {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let len = read_u32(data)? as usize;
        // Guard against absurd prefixes before allocating.
        let mut v = Vec::with_capacity(len.min(data.len()));
        for _ in 0..len { v.push(T::decode(data)?); }
        Ok(v)
    }
}

macro_rules! fixed32 {
    ($($name:ident),*) => {$(
        impl Encode for $name {
            fn encode(&self, out: &mut Vec<u8>) { out.extend_from_slice(&self.0) }
        }
        impl Decode for $name {
            fn decode(data: &mut &[u8]) -> Result<Self> { Ok($name(read_fixed::<HASH_LEN>(data)?)) }
        }
    )*};
}

fixed32!(Commitment, Nullifier, Root, AssetCm, PkgId, SpendKey, Currency);

// ——— Ledger types ———

impl Encode for Signature {
    fn encode(&self, out: &mut Vec<u8>) { out.extend_from_slice(&self.0) }
}
impl Decode for Signature {
    fn decode(data: &mut &[u8]) -> Result<Self> { Ok(Signature(read_fixed::<SIG_LEN>(data)?)) }
}

impl Encode for ProofBytes {
    fn encode(&self, out: &mut Vec<u8>) { encode_bytes(&self.0, out) }
}
impl Decode for ProofBytes {
    fn decode(data: &mut &[u8]) -> Result<Self> { Ok(ProofBytes(read_vec(data)?)) }
}

impl Encode for Memo {
    fn encode(&self, out: &mut Vec<u8>) { out.extend_from_slice(&self.0) }
}
impl Decode for Memo {
    fn decode(data: &mut &[u8]) -> Result<Self> { Ok(Memo(read_fixed::<MEMO_LEN>(data)?)) }
}

impl Encode for Address {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ak);
        out.extend_from_slice(&self.pk_d);
    }
}
impl Decode for Address {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let ak = read_fixed::<HASH_LEN>(data)?;
        let pk_d = read_fixed::<HASH_LEN>(data)?;
        Ok(Address { ak, pk_d })
    }
}

impl Encode for ViewKey {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ivk);
        out.extend_from_slice(&self.nk);
        self.addr.encode(out);
    }
}
impl Decode for ViewKey {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let ivk = read_fixed::<HASH_LEN>(data)?;
        let nk = read_fixed::<HASH_LEN>(data)?;
        let addr = Address::decode(data)?;
        Ok(ViewKey { ivk, nk, addr })
    }
}

impl Encode for Token {
    fn encode(&self, out: &mut Vec<u8>) {
        self.currency.encode(out);
        encode_u128(self.value, out);
    }
}
impl Decode for Token {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let currency = Currency::decode(data)?;
        let value = read_u128(data)?;
        Ok(Token { currency, value })
    }
}

impl Encode for Ticket {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.category);
        out.extend_from_slice(&self.value);
    }
}
impl Decode for Ticket {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let category = read_fixed::<HASH_LEN>(data)?;
        let value = read_fixed::<HASH_LEN>(data)?;
        Ok(Ticket { category, value })
    }
}

impl Encode for Asset {
    fn encode(&self, out: &mut Vec<u8>) {
        self.tkn.encode(out);
        self.tkt.encode(out);
    }
}
impl Decode for Asset {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let tkn = Option::<Token>::decode(data)?;
        let tkt = Option::<Ticket>::decode(data)?;
        Ok(Asset { tkn, tkt })
    }
}

impl Encode for OutO {
    fn encode(&self, out: &mut Vec<u8>) {
        self.addr.encode(out);
        self.asset.encode(out);
        self.memo.encode(out);
    }
}
impl Decode for OutO {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let addr = Address::decode(data)?;
        let asset = Asset::decode(data)?;
        let memo = Memo::decode(data)?;
        Ok(OutO { addr, asset, memo })
    }
}

impl Encode for InO {
    fn encode(&self, out: &mut Vec<u8>) {
        self.root.encode(out);
        self.nil.encode(out);
        self.sign.encode(out);
    }
}
impl Decode for InO {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let root = Root::decode(data)?;
        let nil = Nullifier::decode(data)?;
        let sign = Signature::decode(data)?;
        Ok(InO { root, nil, sign })
    }
}

impl Encode for OutZ {
    fn encode(&self, out: &mut Vec<u8>) {
        self.asset_cm.encode(out);
        self.out_cm.encode(out);
        out.extend_from_slice(&self.epk);
        encode_bytes(&self.einfo, out);
        self.proof.encode(out);
    }
}
impl Decode for OutZ {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let asset_cm = AssetCm::decode(data)?;
        let out_cm = Commitment::decode(data)?;
        let epk = read_fixed::<HASH_LEN>(data)?;
        let einfo = read_vec(data)?;
        let proof = ProofBytes::decode(data)?;
        Ok(OutZ { asset_cm, out_cm, epk, einfo, proof })
    }
}

impl Encode for InZ {
    fn encode(&self, out: &mut Vec<u8>) {
        self.anchor.encode(out);
        self.nil.encode(out);
        self.asset_cm.encode(out);
        self.proof.encode(out);
    }
}
impl Decode for InZ {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let anchor = Root::decode(data)?;
        let nil = Nullifier::decode(data)?;
        let asset_cm = AssetCm::decode(data)?;
        let proof = ProofBytes::decode(data)?;
        Ok(InZ { anchor, nil, asset_cm, proof })
    }
}

impl Encode for Pkg {
    fn encode(&self, out: &mut Vec<u8>) {
        self.asset_cm.encode(out);
        self.pkg_cm.encode(out);
        encode_bytes(&self.einfo, out);
    }
}
impl Decode for Pkg {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let asset_cm = AssetCm::decode(data)?;
        let pkg_cm = Commitment::decode(data)?;
        let einfo = read_vec(data)?;
        Ok(Pkg { asset_cm, pkg_cm, einfo })
    }
}

impl Encode for PkgCreate {
    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.owner.encode(out);
        self.pkg.encode(out);
        self.proof.encode(out);
    }
}
impl Decode for PkgCreate {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let id = PkgId::decode(data)?;
        let owner = Address::decode(data)?;
        let pkg = Pkg::decode(data)?;
        let proof = ProofBytes::decode(data)?;
        Ok(PkgCreate { id, owner, pkg, proof })
    }
}

impl Encode for PkgTransfer {
    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.to.encode(out);
        self.sign.encode(out);
    }
}
impl Decode for PkgTransfer {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let id = PkgId::decode(data)?;
        let to = Address::decode(data)?;
        let sign = Signature::decode(data)?;
        Ok(PkgTransfer { id, to, sign })
    }
}

impl Encode for PkgClose {
    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.sign.encode(out);
    }
}
impl Decode for PkgClose {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let id = PkgId::decode(data)?;
        let sign = Signature::decode(data)?;
        Ok(PkgClose { id, sign })
    }
}

impl Encode for DescPkg {
    fn encode(&self, out: &mut Vec<u8>) {
        self.create.encode(out);
        self.transfer.encode(out);
        self.close.encode(out);
    }
}
impl Decode for DescPkg {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let create = Option::<PkgCreate>::decode(data)?;
        let transfer = Option::<PkgTransfer>::decode(data)?;
        let close = Option::<PkgClose>::decode(data)?;
        Ok(DescPkg { create, transfer, close })
    }
}

impl Encode for Output {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Output::Transparent(o) => { encode_u8(0, out); o.encode(out); }
            Output::Shielded(z) => { encode_u8(1, out); z.encode(out); }
        }
    }
}
impl Decode for Output {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        match read_u8(data)? {
            0 => Ok(Output::Transparent(OutO::decode(data)?)),
            1 => Ok(Output::Shielded(OutZ::decode(data)?)),
            t => Err(anyhow!("unknown output tag {}", t)),
        }
    }
}

impl Encode for NoteInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        self.asset.encode(out);
        self.memo.encode(out);
        out.extend_from_slice(&self.ar);
        out.extend_from_slice(&self.rcm);
    }
}
impl Decode for NoteInfo {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let asset = Asset::decode(data)?;
        let memo = Memo::decode(data)?;
        let ar = read_fixed::<HASH_LEN>(data)?;
        let rcm = read_fixed::<HASH_LEN>(data)?;
        Ok(NoteInfo { asset, memo, ar, rcm })
    }
}

impl Encode for PkgOpening {
    fn encode(&self, out: &mut Vec<u8>) {
        self.asset.encode(out);
        self.memo.encode(out);
        out.extend_from_slice(&self.ar);
    }
}
impl Decode for PkgOpening {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let asset = Asset::decode(data)?;
        let memo = Memo::decode(data)?;
        let ar = read_fixed::<HASH_LEN>(data)?;
        Ok(PkgOpening { asset, memo, ar })
    }
}
