//! Core ledger types: keys, assets, outputs, descriptors and transactions.

use serde::{Deserialize, Serialize};

pub const HASH_LEN: usize = 32;
pub const SIG_LEN: usize = 64;
pub const MEMO_LEN: usize = 64;
/// Proofs are opaque to this crate; the oracle pins their size.
pub const PROOF_LEN: usize = 192;

macro_rules! bytes32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
        pub struct $name(pub [u8; HASH_LEN]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; HASH_LEN] { &self.0 }
            pub fn is_zero(&self) -> bool { self.0 == [0u8; HASH_LEN] }
            pub fn to_hex(&self) -> String { hex::encode(self.0) }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(&self.0[..8]))
            }
        }

        impl From<[u8; HASH_LEN]> for $name {
            fn from(b: [u8; HASH_LEN]) -> Self { Self(b) }
        }
    };
}

bytes32!(
    /// Note commitment; one tree leaf.
    Commitment
);
bytes32!(
    /// One-time spend tag.
    Nullifier
);
bytes32!(
    /// Root of the commitment tree after some append. Also keys stored outputs.
    Root
);
bytes32!(
    /// Pedersen commitment to an asset (value commitment).
    AssetCm
);
bytes32!(
    /// Escrow package identifier chosen by its creator.
    PkgId
);
bytes32!(
    /// Secret spending key (scalar bytes).
    SpendKey
);
bytes32!(Currency);

impl Currency {
    /// Left-aligned, zero padded symbol bytes (e.g. "SERO").
    pub fn from_symbol(symbol: &str) -> Self {
        let mut out = [0u8; HASH_LEN];
        let b = symbol.as_bytes();
        let n = b.len().min(HASH_LEN);
        out[..n].copy_from_slice(&b[..n]);
        Currency(out)
    }

    pub fn symbol(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(HASH_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// Keys and addresses
// ————————————————————————————————————————————————————————————————————————————

/// Public receiving address: spend-auth verification key plus diversified
/// transmission key for note encryption.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug, Default)]
pub struct Address {
    pub ak: [u8; HASH_LEN],
    pub pk_d: [u8; HASH_LEN],
}

impl Address {
    pub fn is_zero(&self) -> bool { self.ak == [0u8; HASH_LEN] && self.pk_d == [0u8; HASH_LEN] }
}

/// Viewing material held by a wallet: incoming viewing key, nullifier key and
/// the address they belong to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct ViewKey {
    pub ivk: [u8; HASH_LEN],
    pub nk: [u8; HASH_LEN],
    pub addr: Address,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Signature(pub [u8; SIG_LEN]);

impl Default for Signature {
    fn default() -> Self { Signature([0u8; SIG_LEN]) }
}

impl serde::Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct SigVisitor;
        impl<'de> serde::de::Visitor<'de> for SigVisitor {
            type Value = Signature;
            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "a 64-byte signature")
            }
            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v.len() != SIG_LEN {
                    return Err(E::invalid_length(v.len(), &self));
                }
                let mut out = [0u8; SIG_LEN];
                out.copy_from_slice(v);
                Ok(Signature(out))
            }
            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut out = [0u8; SIG_LEN];
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = match seq.next_element::<u8>()? {
                        Some(b) => b,
                        None => return Err(serde::de::Error::invalid_length(i, &self)),
                    };
                }
                Ok(Signature(out))
            }
        }
        deserializer.deserialize_bytes(SigVisitor)
    }
}

impl core::fmt::Debug for Signature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Signature(..)")
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
#[serde(transparent)]
pub struct ProofBytes(#[serde(with = "serde_bytes")] pub Vec<u8>);

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo(#[serde(with = "serde_bytes")] pub [u8; MEMO_LEN]);

impl Default for Memo {
    fn default() -> Self { Memo([0u8; MEMO_LEN]) }
}

impl Memo {
    pub fn from_text(text: &str) -> Self {
        let mut out = [0u8; MEMO_LEN];
        let b = text.as_bytes();
        let n = b.len().min(MEMO_LEN);
        out[..n].copy_from_slice(&b[..n]);
        Memo(out)
    }
}

impl core::fmt::Debug for Memo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(MEMO_LEN);
        write!(f, "Memo({:?})", String::from_utf8_lossy(&self.0[..end]))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// Assets
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct Token {
    pub currency: Currency,
    pub value: u128,
}

/// Non-fungible ticket: a category and a unique value within it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug)]
pub struct Ticket {
    pub category: [u8; HASH_LEN],
    pub value: [u8; HASH_LEN],
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, Default)]
pub struct Asset {
    pub tkn: Option<Token>,
    pub tkt: Option<Ticket>,
}

impl Asset {
    pub fn token(currency: Currency, value: u128) -> Self {
        Asset { tkn: Some(Token { currency, value }), tkt: None }
    }

    pub fn ticket(category: [u8; HASH_LEN], value: [u8; HASH_LEN]) -> Self {
        Asset { tkn: None, tkt: Some(Ticket { category, value }) }
    }

    /// Token value, zero when the asset carries no token.
    pub fn value(&self) -> u128 { self.tkn.map(|t| t.value).unwrap_or(0) }

    pub fn is_empty(&self) -> bool {
        self.value() == 0 && self.tkt.is_none()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// Outputs and descriptors
// ————————————————————————————————————————————————————————————————————————————

/// Transparent output: recipient and asset are public.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct OutO {
    pub addr: Address,
    pub asset: Asset,
    pub memo: Memo,
}

/// Transparent input, referencing a stored output by its root.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct InO {
    pub root: Root,
    pub nil: Nullifier,
    pub sign: Signature,
}

/// Shielded output: only the commitments and the encrypted note are public.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct OutZ {
    pub asset_cm: AssetCm,
    pub out_cm: Commitment,
    pub epk: [u8; HASH_LEN],
    #[serde(with = "serde_bytes")]
    pub einfo: Vec<u8>,
    pub proof: ProofBytes,
}

/// Shielded input: spends a note whose witness validates against `anchor`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct InZ {
    pub anchor: Root,
    pub nil: Nullifier,
    pub asset_cm: AssetCm,
    pub proof: ProofBytes,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct DescO {
    pub ins: Vec<InO>,
    pub outs: Vec<OutO>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct DescZ {
    pub ins: Vec<InZ>,
    pub outs: Vec<OutZ>,
}

/// Encrypted escrow payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Pkg {
    pub asset_cm: AssetCm,
    pub pkg_cm: Commitment,
    #[serde(with = "serde_bytes")]
    pub einfo: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PkgCreate {
    pub id: PkgId,
    pub owner: Address,
    pub pkg: Pkg,
    pub proof: ProofBytes,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PkgTransfer {
    pub id: PkgId,
    pub to: Address,
    pub sign: Signature,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PkgClose {
    pub id: PkgId,
    pub sign: Signature,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct DescPkg {
    pub create: Option<PkgCreate>,
    pub transfer: Option<PkgTransfer>,
    pub close: Option<PkgClose>,
}

impl DescPkg {
    pub fn count(&self) -> usize {
        self.create.is_some() as usize + self.transfer.is_some() as usize + self.close.is_some() as usize
    }

    /// At most one package action per transaction.
    pub fn is_valid(&self) -> bool { self.count() <= 1 }
}

/// A fully built transaction.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Tx {
    pub from: Address,
    pub fee: Token,
    pub desc_o: DescO,
    pub desc_z: DescZ,
    pub desc_pkg: DescPkg,
    /// Balance commitment remainder (binding verification key bytes).
    pub bcr: [u8; HASH_LEN],
    pub bsign: Signature,
    pub sign: Signature,
}

impl Tx {
    /// Nullifiers in declared order: transparent inputs first, then shielded.
    pub fn nullifiers(&self) -> Vec<Nullifier> {
        let mut out = Vec::with_capacity(self.desc_o.ins.len() + self.desc_z.ins.len());
        out.extend(self.desc_o.ins.iter().map(|i| i.nil));
        out.extend(self.desc_z.ins.iter().map(|i| i.nil));
        out
    }

    pub fn has_shielded(&self) -> bool {
        !self.desc_z.ins.is_empty() || !self.desc_z.outs.is_empty()
            || self.desc_pkg.create.is_some() || self.desc_pkg.close.is_some()
    }
}

/// A ledger output as stored under its root.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum Output {
    Transparent(OutO),
    Shielded(OutZ),
}

impl Output {
    pub fn commitment(&self) -> Commitment {
        match self {
            Output::Transparent(o) => crate::digest::transparent_commitment(o),
            Output::Shielded(z) => z.out_cm,
        }
    }

    pub fn is_shielded(&self) -> bool { matches!(self, Output::Shielded(_)) }
}

/// Plaintext recovered from a shielded note by its owner.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct NoteInfo {
    pub asset: Asset,
    pub memo: Memo,
    /// Value commitment randomness.
    pub ar: [u8; HASH_LEN],
    /// Note commitment randomness.
    pub rcm: [u8; HASH_LEN],
}

/// Plaintext of an opened escrow package.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PkgOpening {
    pub asset: Asset,
    pub memo: Memo,
    pub ar: [u8; HASH_LEN],
}
