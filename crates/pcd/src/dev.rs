//! Deterministic development oracle.
//!
//! Value commitments are Pallas Pedersen commitments and the balance and
//! spend-authorization signatures are RedPallas, so balance checks are real.
//! Proofs are BLAKE2b transcripts over the public inputs: generation checks
//! the witness against the statement, verification only recomputes the
//! transcript. Not for production use.

use std::sync::Arc;

use blake2b_simd::{Params as Blake2bParams, State as Blake2bState};
use ff::{Field, FromUniformBytes, PrimeField};
use group::{Group, GroupEncoding};
use pasta_curves::arithmetic::CurveExt;
use pasta_curves::pallas;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reddsa::orchard::{Binding, SpendAuth};

use accum::{compress_nodes, Blake2bCombine, Combine, Node, TreeHasher};
use primitives::encode::{Decode, Encode};
use primitives::params::{MAX_TOKEN_VALUE, TREE_DEPTH};
use primitives::*;

use crate::error::OracleError;
use crate::oracle::*;

const DS_ASK: &[u8; 16] = b"sero.dev.ask\0\0\0\0";
const DS_IVK: &[u8; 16] = b"sero.dev.ivk\0\0\0\0";
const DS_NK: &[u8; 16] = b"sero.dev.nk\0\0\0\0\0";
const DS_CM_Z: &[u8; 16] = b"sero.cm.z.v1\0\0\0\0";
const DS_NF_Z: &[u8; 16] = b"sero.nf.z.v1\0\0\0\0";
const DS_NOTE_KEY: &[u8; 16] = b"sero.note.key\0\0\0";
const DS_NOTE_MAC: &[u8; 16] = b"sero.note.mac\0\0\0";
const DS_PKG_KEY: &[u8; 16] = b"sero.pkg.key\0\0\0\0";
const DS_PKG_CM: &[u8; 16] = b"sero.pkg.cm.v1\0\0";
const DS_PRF_SPEND: &[u8; 16] = b"sero.prf.spend\0\0";
const DS_PRF_OUT: &[u8; 16] = b"sero.prf.out\0\0\0\0";
const DS_PRF_PKG: &[u8; 16] = b"sero.prf.pkg\0\0\0\0";
const DS_SIG_RNG: &[u8; 16] = b"sero.sig.rng\0\0\0\0";

const MAC_LEN: usize = 32;

fn hash32(personal: &[u8; 16], parts: &[&[u8]]) -> [u8; 32] {
    let mut st: Blake2bState = Blake2bParams::new().hash_length(32).personal(personal).to_state();
    for p in parts {
        st.update(p);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(st.finalize().as_bytes());
    out
}

fn hash64(personal: &[u8; 16], parts: &[&[u8]]) -> [u8; 64] {
    let mut st: Blake2bState = Blake2bParams::new().hash_length(64).personal(personal).to_state();
    for p in parts {
        st.update(p);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(st.finalize().as_bytes());
    out
}

fn scalar_from_seed(personal: &[u8; 16], seed: &[u8]) -> pallas::Scalar {
    <pallas::Scalar as FromUniformBytes<64>>::from_uniform_bytes(&hash64(personal, &[seed]))
}

fn scalar(bytes: &[u8; 32]) -> Result<pallas::Scalar> {
    Option::from(pallas::Scalar::from_repr(*bytes))
        .ok_or_else(|| OracleError::Encoding("non-canonical scalar".into()))
}

fn point(bytes: &[u8; 32]) -> Result<pallas::Point> {
    Option::from(pallas::Point::from_bytes(bytes)).ok_or_else(|| OracleError::Encoding("invalid point encoding".into()))
}

/// Proof transcript: three BLAKE2b-512 blocks over the public inputs.
fn transcript(personal: &[u8; 16], public: &[u8]) -> ProofBytes {
    let mut out = Vec::with_capacity(PROOF_LEN);
    for i in 0..(PROOF_LEN / 64) as u8 {
        out.extend_from_slice(&hash64(personal, &[&[i], public]));
    }
    ProofBytes(out)
}

fn check_transcript(personal: &[u8; 16], public: &[u8], proof: &ProofBytes) -> Result<()> {
    if proof.0.len() != PROOF_LEN {
        return Err(OracleError::InvalidProof(format!("proof length {} != {}", proof.0.len(), PROOF_LEN)));
    }
    if transcript(personal, public) != *proof {
        return Err(OracleError::InvalidProof("transcript mismatch".into()));
    }
    Ok(())
}

/// XOR `data` with a keystream derived from `key` and append a MAC.
fn seal(key_ds: &[u8; 16], key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    apply_keystream(key_ds, key, &mut out);
    let mac = hash32(DS_NOTE_MAC, &[key, &out]);
    out.extend_from_slice(&mac);
    out
}

fn open(key_ds: &[u8; 16], key: &[u8], sealed: &[u8]) -> Option<Vec<u8>> {
    if sealed.len() < MAC_LEN {
        return None;
    }
    let (ct, mac) = sealed.split_at(sealed.len() - MAC_LEN);
    if hash32(DS_NOTE_MAC, &[key, ct]).as_slice() != mac {
        return None;
    }
    let mut out = ct.to_vec();
    apply_keystream(key_ds, key, &mut out);
    Some(out)
}

fn apply_keystream(key_ds: &[u8; 16], key: &[u8], data: &mut [u8]) {
    for (i, chunk) in data.chunks_mut(64).enumerate() {
        let block = hash64(key_ds, &[key, &(i as u32).to_be_bytes()]);
        for (b, k) in chunk.iter_mut().zip(block.iter()) {
            *b ^= k;
        }
    }
}

fn signing_rng(secret: &[u8], msg: &[u8; 32]) -> StdRng { StdRng::from_seed(hash32(DS_SIG_RNG, &[secret, msg])) }

#[derive(Clone)]
pub struct DevOracle {
    hasher: TreeHasher,
    g_d: pallas::Point,
    r_base: pallas::Point,
}

impl DevOracle {
    pub fn new() -> Self { Self::with_depth(TREE_DEPTH) }

    pub fn with_depth(depth: usize) -> Self {
        Self {
            hasher: TreeHasher::with_depth(Arc::new(Blake2bCombine), depth),
            g_d: pallas::Point::hash_to_curve("sero:dev")(&b"g_d"[..]),
            // Same base as the RedPallas binding signature.
            r_base: pallas::Point::hash_to_curve("z.cash:Orchard-cv")(&b"r"[..]),
        }
    }

    fn value_commit(&self, asset: &Asset, ar: &pallas::Scalar) -> pallas::Point {
        let mut acc = self.r_base * ar;
        if let Some(t) = &asset.tkn {
            let base = pallas::Point::hash_to_curve("sero:asset-cv")(&t.currency.0[..]);
            acc += base * pallas::Scalar::from_u128(t.value);
        }
        if let Some(t) = &asset.tkt {
            let mut id = [0u8; 64];
            id[..32].copy_from_slice(&t.category);
            id[32..].copy_from_slice(&t.value);
            acc += pallas::Point::hash_to_curve("sero:ticket-cv")(&id[..]);
        }
        acc
    }

    fn note_commitment(addr: &Address, note: &NoteInfo) -> Commitment {
        Commitment(hash32(DS_CM_Z, &[&addr.to_bytes(), &note.asset.to_bytes(), &note.memo.0, &note.rcm]))
    }

    fn ask(&self, sk: &SpendKey) -> Result<reddsa::SigningKey<SpendAuth>> {
        let ask = scalar_from_seed(DS_ASK, &sk.0);
        reddsa::SigningKey::<SpendAuth>::try_from(ask.to_repr())
            .map_err(|e| OracleError::Encoding(format!("spend key: {}", e)))
    }

    fn check_range(asset: &Asset) -> Result<()> {
        if asset.value() > MAX_TOKEN_VALUE {
            return Err(OracleError::InvalidWitness(format!("value {} out of range", asset.value())));
        }
        Ok(())
    }

    fn spend_public(input: &InZ) -> Vec<u8> {
        let mut v = Vec::with_capacity(96);
        input.anchor.encode(&mut v);
        input.nil.encode(&mut v);
        input.asset_cm.encode(&mut v);
        v
    }

    fn output_public(out: &OutZ) -> Vec<u8> {
        let mut v = Vec::with_capacity(128);
        out.asset_cm.encode(&mut v);
        out.out_cm.encode(&mut v);
        v.extend_from_slice(&out.epk);
        v.extend_from_slice(&hash32(DS_PRF_OUT, &[&out.einfo]));
        v
    }

    fn package_public(create: &PkgCreate) -> Vec<u8> {
        let mut v = Vec::with_capacity(192);
        create.id.encode(&mut v);
        create.owner.encode(&mut v);
        create.pkg.asset_cm.encode(&mut v);
        create.pkg.pkg_cm.encode(&mut v);
        v.extend_from_slice(&hash32(DS_PRF_PKG, &[&create.pkg.einfo]));
        v
    }
}

impl Default for DevOracle {
    fn default() -> Self { Self::new() }
}

impl Combine for DevOracle {
    fn combine(&self, left: &Node, right: &Node) -> Node { compress_nodes(left, right) }
}

impl Oracle for DevOracle {
    fn tree_hasher(&self) -> TreeHasher { self.hasher.clone() }

    fn view_key(&self, sk: &SpendKey) -> Result<ViewKey> {
        let ask = self.ask(sk)?;
        let ak: [u8; 32] = reddsa::VerificationKey::from(&ask).into();
        let ivk = scalar_from_seed(DS_IVK, &sk.0);
        let pk_d = (self.g_d * ivk).to_bytes();
        let nk = hash32(DS_NK, &[&sk.0]);
        Ok(ViewKey { ivk: ivk.to_repr(), nk, addr: Address { ak, pk_d } })
    }

    fn generate_spend_proof(&self, w: &SpendWitness) -> Result<InZ> {
        let vk = self.view_key(&w.sk)?;
        let cm = Self::note_commitment(&vk.addr, &w.note);
        if cm != w.path.leaf {
            return Err(OracleError::InvalidWitness("note does not open the path leaf".into()));
        }
        if w.path.depth() != self.hasher.depth() || !w.path.verify(&self.hasher) {
            return Err(OracleError::InvalidWitness("path does not reach its anchor".into()));
        }
        let ar = scalar(&w.ar)?;
        let input = InZ {
            anchor: w.path.anchor,
            nil: self.derive_nullifier(&vk, &cm),
            asset_cm: AssetCm(self.value_commit(&w.note.asset, &ar).to_bytes()),
            proof: ProofBytes::default(),
        };
        let proof = transcript(DS_PRF_SPEND, &Self::spend_public(&input));
        Ok(InZ { proof, ..input })
    }

    fn generate_output_proof(&self, w: &OutputWitness) -> Result<OutZ> {
        Self::check_range(&w.asset)?;
        let pk_d = point(&w.addr.pk_d).map_err(|_| OracleError::InvalidWitness("recipient key is not a point".into()))?;
        let ar = scalar(&w.ar)?;
        let esk = scalar(&w.esk)?;
        let note = NoteInfo { asset: w.asset, memo: w.memo, ar: w.ar, rcm: w.rcm };
        let epk = (self.g_d * esk).to_bytes();
        let shared = (pk_d * esk).to_bytes();
        let out = OutZ {
            asset_cm: AssetCm(self.value_commit(&w.asset, &ar).to_bytes()),
            out_cm: Self::note_commitment(&w.addr, &note),
            epk,
            einfo: seal(DS_NOTE_KEY, &[shared, epk].concat(), &note.to_bytes()),
            proof: ProofBytes::default(),
        };
        let proof = transcript(DS_PRF_OUT, &Self::output_public(&out));
        Ok(OutZ { proof, ..out })
    }

    fn generate_package_proof(&self, w: &PkgWitness) -> Result<PkgCreate> {
        Self::check_range(&w.asset)?;
        let ar = scalar(&w.ar)?;
        let opening = PkgOpening { asset: w.asset, memo: w.memo, ar: w.ar };
        let body = opening.to_bytes();
        let create = PkgCreate {
            id: w.id,
            owner: w.owner,
            pkg: Pkg {
                asset_cm: AssetCm(self.value_commit(&w.asset, &ar).to_bytes()),
                pkg_cm: Commitment(hash32(DS_PKG_CM, &[&body])),
                einfo: seal(DS_PKG_KEY, &w.key, &body),
            },
            proof: ProofBytes::default(),
        };
        let proof = transcript(DS_PRF_PKG, &Self::package_public(&create));
        Ok(PkgCreate { proof, ..create })
    }

    fn verify_spend_proof(&self, input: &InZ) -> Result<()> {
        point(&input.asset_cm.0)?;
        check_transcript(DS_PRF_SPEND, &Self::spend_public(input), &input.proof)
    }

    fn verify_output_proof(&self, out: &OutZ) -> Result<()> {
        point(&out.asset_cm.0)?;
        point(&out.epk)?;
        check_transcript(DS_PRF_OUT, &Self::output_public(out), &out.proof)
    }

    fn verify_package_proof(&self, create: &PkgCreate) -> Result<()> {
        point(&create.pkg.asset_cm.0)?;
        check_transcript(DS_PRF_PKG, &Self::package_public(create), &create.proof)
    }

    fn commit_transparent(&self, asset: &Asset) -> Result<AssetCm> {
        if asset.value() > MAX_TOKEN_VALUE {
            return Err(OracleError::Encoding(format!("value {} out of range", asset.value())));
        }
        Ok(AssetCm(self.value_commit(asset, &pallas::Scalar::ZERO).to_bytes()))
    }

    fn sign_balance(&self, ar_in: &[[u8; 32]], ar_out: &[[u8; 32]], hash: &[u8; 32]) -> Result<BalanceSig> {
        let mut bsk = pallas::Scalar::ZERO;
        for ar in ar_out {
            bsk += scalar(ar)?;
        }
        for ar in ar_in {
            bsk -= scalar(ar)?;
        }
        let repr = bsk.to_repr();
        let sk = reddsa::SigningKey::<Binding>::try_from(repr)
            .map_err(|e| OracleError::Balance(format!("binding key: {}", e)))?;
        let bcr: [u8; 32] = reddsa::VerificationKey::from(&sk).into();
        let sig: [u8; 64] = sk.sign(signing_rng(&repr, hash), hash).into();
        Ok(BalanceSig { bcr, bsign: Signature(sig) })
    }

    fn verify_balance(&self, desc: &BalanceDesc) -> Result<()> {
        let mut acc = pallas::Point::identity();
        for cm in desc.zout.iter().chain(desc.oout.iter()) {
            acc += point(&cm.0)?;
        }
        for cm in desc.zin.iter().chain(desc.oin.iter()) {
            acc -= point(&cm.0)?;
        }
        if acc.to_bytes() != desc.bcr {
            return Err(OracleError::Balance("commitments do not sum to the binding key".into()));
        }
        let vk = reddsa::VerificationKey::<Binding>::try_from(desc.bcr)
            .map_err(|e| OracleError::Balance(format!("binding key: {}", e)))?;
        vk.verify(&desc.hash, &reddsa::Signature::from(desc.bsign.0))
            .map_err(|e| OracleError::Balance(format!("binding signature: {}", e)))
    }

    fn sign(&self, sk: &SpendKey, hash: &[u8; 32]) -> Result<Signature> {
        let ask = self.ask(sk)?;
        let sig: [u8; 64] = ask.sign(signing_rng(&sk.0, hash), hash).into();
        Ok(Signature(sig))
    }

    fn verify(&self, addr: &Address, hash: &[u8; 32], sig: &Signature) -> Result<()> {
        let vk = reddsa::VerificationKey::<SpendAuth>::try_from(addr.ak)
            .map_err(|e| OracleError::InvalidSignature(format!("verification key: {}", e)))?;
        vk.verify(hash, &reddsa::Signature::from(sig.0))
            .map_err(|e| OracleError::InvalidSignature(e.to_string()))
    }

    fn try_decrypt(&self, key: &ViewKey, out: &OutZ) -> Option<NoteInfo> {
        let ivk = scalar(&key.ivk).ok()?;
        let epk = point(&out.epk).ok()?;
        let shared = (epk * ivk).to_bytes();
        let body = open(DS_NOTE_KEY, &[shared, out.epk].concat(), &out.einfo)?;
        let note = NoteInfo::from_bytes(&body).ok()?;
        if Self::note_commitment(&key.addr, &note) != out.out_cm {
            return None;
        }
        let ar = scalar(&note.ar).ok()?;
        if self.value_commit(&note.asset, &ar).to_bytes() != out.asset_cm.0 {
            return None;
        }
        Some(note)
    }

    fn derive_nullifier(&self, key: &ViewKey, cm: &Commitment) -> Nullifier {
        Nullifier(hash32(DS_NF_Z, &[&key.nk, &cm.0]))
    }

    fn open_package(&self, pkg: &Pkg, key: &[u8; 32]) -> Option<PkgOpening> {
        let body = open(DS_PKG_KEY, key, &pkg.einfo)?;
        if hash32(DS_PKG_CM, &[&body]) != pkg.pkg_cm.0 {
            return None;
        }
        let opening = PkgOpening::from_bytes(&body).ok()?;
        let ar = scalar(&opening.ar).ok()?;
        if self.value_commit(&opening.asset, &ar).to_bytes() != pkg.asset_cm.0 {
            return None;
        }
        Some(opening)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accum::{AuthPath, Tree};
    use rand::RngCore;

    fn sero(v: u128) -> Asset { Asset::token(Currency::from_symbol("SERO"), v) }

    fn spend_key(rng: &mut StdRng) -> SpendKey {
        let mut b = [0u8; 32];
        rng.fill_bytes(&mut b);
        SpendKey(b)
    }

    fn output_for(o: &DevOracle, rng: &mut StdRng, addr: Address, v: u128) -> (OutputWitness, OutZ) {
        let w = OutputWitness {
            addr,
            asset: sero(v),
            memo: Memo::from_text("note"),
            ar: random_scalar(rng),
            rcm: random_scalar(rng),
            esk: random_scalar(rng),
        };
        let out = o.generate_output_proof(&w).unwrap();
        (w, out)
    }

    #[test]
    fn only_the_recipient_decrypts() {
        let o = DevOracle::with_depth(4);
        let mut rng = StdRng::seed_from_u64(1);
        let a = o.view_key(&spend_key(&mut rng)).unwrap();
        let b = o.view_key(&spend_key(&mut rng)).unwrap();
        let (w, out) = output_for(&o, &mut rng, a.addr, 42);
        o.verify_output_proof(&out).unwrap();
        let note = o.try_decrypt(&a, &out).unwrap();
        assert_eq!(note.asset, w.asset);
        assert!(o.try_decrypt(&b, &out).is_none());
    }

    #[test]
    fn spend_proof_requires_matching_path() {
        let o = DevOracle::with_depth(4);
        let mut rng = StdRng::seed_from_u64(2);
        let sk = spend_key(&mut rng);
        let vk = o.view_key(&sk).unwrap();
        let (_, out) = output_for(&o, &mut rng, vk.addr, 5);
        let note = o.try_decrypt(&vk, &out).unwrap();
        let mut tree = Tree::new(o.tree_hasher());
        tree.append(out.out_cm).unwrap();
        let path = AuthPath::from_tree(&tree).unwrap();
        let w = SpendWitness { sk, note, path: path.clone(), ar: random_scalar(&mut rng) };
        let input = o.generate_spend_proof(&w).unwrap();
        assert_eq!(input.anchor, tree.root());
        assert_eq!(input.nil, o.derive_nullifier(&vk, &out.out_cm));
        o.verify_spend_proof(&input).unwrap();

        let mut tampered = input.clone();
        tampered.anchor = Root([1u8; 32]);
        assert!(matches!(o.verify_spend_proof(&tampered), Err(OracleError::InvalidProof(_))));

        let mut bad = w;
        bad.path.anchor = Root([3u8; 32]);
        assert!(matches!(o.generate_spend_proof(&bad), Err(OracleError::InvalidWitness(_))));
    }

    #[test]
    fn balance_verifies_iff_values_cancel() {
        let o = DevOracle::with_depth(4);
        let mut rng = StdRng::seed_from_u64(3);
        let ar_in = random_scalar(&mut rng);
        let ar_out = random_scalar(&mut rng);
        let zin = AssetCm(o.value_commit(&sero(100), &scalar(&ar_in).unwrap()).to_bytes());
        let zout = AssetCm(o.value_commit(&sero(90), &scalar(&ar_out).unwrap()).to_bytes());
        let fee = o.commit_transparent(&sero(10)).unwrap();
        let hash = [9u8; 32];
        let sig = o.sign_balance(&[ar_in], &[ar_out], &hash).unwrap();
        let mut desc = BalanceDesc { zin: vec![zin], zout: vec![zout], oin: vec![], oout: vec![fee], bcr: sig.bcr, bsign: sig.bsign, hash };
        o.verify_balance(&desc).unwrap();

        desc.oout = vec![o.commit_transparent(&sero(11)).unwrap()];
        assert!(matches!(o.verify_balance(&desc), Err(OracleError::Balance(_))));
    }

    #[test]
    fn transparent_only_balance_uses_identity_key() {
        let o = DevOracle::with_depth(4);
        let hash = [4u8; 32];
        let sig = o.sign_balance(&[], &[], &hash).unwrap();
        let desc = BalanceDesc {
            zin: vec![],
            zout: vec![],
            oin: vec![o.commit_transparent(&sero(50)).unwrap()],
            oout: vec![o.commit_transparent(&sero(40)).unwrap(), o.commit_transparent(&sero(10)).unwrap()],
            bcr: sig.bcr,
            bsign: sig.bsign,
            hash,
        };
        o.verify_balance(&desc).unwrap();
    }

    #[test]
    fn spend_auth_signatures_bind_the_owner() {
        let o = DevOracle::with_depth(4);
        let mut rng = StdRng::seed_from_u64(4);
        let sk = spend_key(&mut rng);
        let other = o.view_key(&spend_key(&mut rng)).unwrap();
        let vk = o.view_key(&sk).unwrap();
        let sig = o.sign(&sk, &[7u8; 32]).unwrap();
        o.verify(&vk.addr, &[7u8; 32], &sig).unwrap();
        assert!(o.verify(&other.addr, &[7u8; 32], &sig).is_err());
        assert!(o.verify(&vk.addr, &[8u8; 32], &sig).is_err());
    }

    #[test]
    fn package_opens_only_with_its_key() {
        let o = DevOracle::with_depth(4);
        let mut rng = StdRng::seed_from_u64(5);
        let owner = o.view_key(&spend_key(&mut rng)).unwrap().addr;
        let w = PkgWitness {
            id: PkgId([1u8; 32]),
            owner,
            asset: sero(30),
            memo: Memo::default(),
            ar: random_scalar(&mut rng),
            key: [6u8; 32],
        };
        let create = o.generate_package_proof(&w).unwrap();
        o.verify_package_proof(&create).unwrap();
        assert_eq!(o.open_package(&create.pkg, &[6u8; 32]).unwrap().asset, sero(30));
        assert!(o.open_package(&create.pkg, &[7u8; 32]).is_none());
    }
}
