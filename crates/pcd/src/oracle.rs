//! Cryptographic oracle interface.
//!
//! Everything that needs proof-system or curve math goes through `Oracle`:
//! proof generation and verification, value commitments, the balance
//! signature, spend authorization and note encryption. Values crossing the
//! boundary are fixed-size byte strings (32-byte field elements, 64-byte
//! signatures, `PROOF_LEN`-byte proofs).

use ff::{Field, PrimeField};
use pasta_curves::pallas;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

use accum::{AuthPath, Combine, TreeHasher};
use primitives::*;

use crate::error::OracleError;

pub type Result<T> = core::result::Result<T, OracleError>;

/// Private inputs for spending a shielded note.
#[derive(Clone, Debug)]
pub struct SpendWitness {
    pub sk: SpendKey,
    pub note: NoteInfo,
    /// Path of the note's commitment to the chosen anchor.
    pub path: AuthPath,
    /// Fresh randomness for the input's value commitment.
    pub ar: [u8; 32],
}

/// Private inputs for creating a shielded output.
#[derive(Clone, Debug)]
pub struct OutputWitness {
    pub addr: Address,
    pub asset: Asset,
    pub memo: Memo,
    pub ar: [u8; 32],
    pub rcm: [u8; 32],
    /// Ephemeral secret for note encryption.
    pub esk: [u8; 32],
}

/// Private inputs for escrowing an asset in a package.
#[derive(Clone, Debug)]
pub struct PkgWitness {
    pub id: PkgId,
    pub owner: Address,
    pub asset: Asset,
    pub memo: Memo,
    pub ar: [u8; 32],
    /// Symmetric key that later opens the package.
    pub key: [u8; 32],
}

/// Commitments entering the balance equation of one transaction.
///
/// `zin`/`zout` hold shielded (and escrowed) value commitments, `oin`/`oout`
/// transparent ones with zero randomness. The fee is part of `oout`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct BalanceDesc {
    pub zin: Vec<AssetCm>,
    pub zout: Vec<AssetCm>,
    pub oin: Vec<AssetCm>,
    pub oout: Vec<AssetCm>,
    pub bcr: [u8; 32],
    pub bsign: Signature,
    pub hash: [u8; 32],
}

/// Binding key material produced by `sign_balance`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BalanceSig {
    pub bcr: [u8; 32],
    pub bsign: Signature,
}

/// Uniformly random scalar in canonical 32-byte form, for value commitment
/// and note randomness.
pub fn random_scalar<R: RngCore>(rng: &mut R) -> [u8; 32] { pallas::Scalar::random(rng).to_repr() }

pub trait Oracle: Combine + Send + Sync {
    /// Commitment tree hasher built on `combine`.
    fn tree_hasher(&self) -> TreeHasher;

    /// Key material owned by a spending key.
    fn view_key(&self, sk: &SpendKey) -> Result<ViewKey>;

    fn generate_spend_proof(&self, w: &SpendWitness) -> Result<InZ>;
    fn generate_output_proof(&self, w: &OutputWitness) -> Result<OutZ>;
    fn generate_package_proof(&self, w: &PkgWitness) -> Result<PkgCreate>;

    fn verify_spend_proof(&self, input: &InZ) -> Result<()>;
    fn verify_output_proof(&self, out: &OutZ) -> Result<()>;
    fn verify_package_proof(&self, create: &PkgCreate) -> Result<()>;

    /// Value commitment of a public asset (zero randomness).
    fn commit_transparent(&self, asset: &Asset) -> Result<AssetCm>;

    /// Binding signature over `hash` with key `sum(ar_out) - sum(ar_in)`.
    fn sign_balance(&self, ar_in: &[[u8; 32]], ar_out: &[[u8; 32]], hash: &[u8; 32]) -> Result<BalanceSig>;
    fn verify_balance(&self, desc: &BalanceDesc) -> Result<()>;

    /// Spend-authorization signature by the owner of `sk`.
    fn sign(&self, sk: &SpendKey, hash: &[u8; 32]) -> Result<Signature>;
    fn verify(&self, addr: &Address, hash: &[u8; 32], sig: &Signature) -> Result<()>;

    /// Trial decryption; `None` when the note is not for `key`.
    fn try_decrypt(&self, key: &ViewKey, out: &OutZ) -> Option<NoteInfo>;
    fn derive_nullifier(&self, key: &ViewKey, cm: &Commitment) -> Nullifier;
    fn open_package(&self, pkg: &Pkg, key: &[u8; 32]) -> Option<PkgOpening>;
}
