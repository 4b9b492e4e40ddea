use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use consensus::*;
use pcd::{DevOracle, Oracle, WorkerPool};
use primitives::params::ParamTable;
use primitives::*;

fn sero(v: u128) -> Asset { Asset::token(Currency::from_symbol("SERO"), v) }

struct Key {
    sk: SpendKey,
    vk: ViewKey,
}

fn key(oracle: &DevOracle, rng: &mut StdRng) -> Key {
    let mut b = [0u8; 32];
    rng.fill_bytes(&mut b);
    let sk = SpendKey(b);
    let vk = oracle.view_key(&sk).unwrap();
    Key { sk, vk }
}

struct Env {
    oracle: Arc<DevOracle>,
    validator: Validator,
    store: Arc<MemStore>,
}

fn env() -> Env {
    let oracle = Arc::new(DevOracle::with_depth(8));
    let validator = Validator::new(oracle.clone(), Arc::new(WorkerPool::inline()), ParamTable::default());
    Env { oracle, validator, store: Arc::new(MemStore::new()) }
}

impl Env {
    fn state(&self, num: u64) -> LedgerState {
        LedgerState::load(self.store.clone(), self.oracle.tree_hasher(), num).unwrap()
    }

    /// Block 0 pays `v` to each address transparently.
    fn genesis(&self, to: &[(Address, u128)]) -> Vec<Root> {
        let mut s = self.state(0);
        let roots = to
            .iter()
            .map(|(addr, v)| {
                s.add_output(Output::Transparent(OutO { addr: *addr, asset: sero(*v), memo: Memo::default() })).unwrap()
            })
            .collect();
        s.finalize().unwrap();
        roots
    }

    fn spend(&self, owner: &Key, roots: &[Root], outs: Vec<(Address, u128)>, fee: u128) -> Tx {
        let mut tx = Tx {
            from: owner.vk.addr,
            fee: Token { currency: Currency::from_symbol("SERO"), value: fee },
            desc_o: DescO {
                ins: roots
                    .iter()
                    .map(|r| InO { root: *r, nil: transparent_nullifier(r), sign: Signature::default() })
                    .collect(),
                outs: outs
                    .into_iter()
                    .map(|(addr, v)| OutO { addr, asset: sero(v), memo: Memo::default() })
                    .collect(),
            },
            desc_z: DescZ::default(),
            desc_pkg: DescPkg::default(),
            bcr: [0u8; 32],
            bsign: Signature::default(),
            sign: Signature::default(),
        };
        let hash = sign_hash(&tx);
        tx.sign = self.oracle.sign(&owner.sk, &hash).unwrap();
        for i in tx.desc_o.ins.iter_mut() {
            i.sign = self.oracle.sign(&owner.sk, &hash).unwrap();
        }
        tx
    }
}

fn rejection(e: LedgerError) -> Rejection {
    match e {
        LedgerError::Rejected(r) => r,
        other => panic!("expected a rejection, got {other}"),
    }
}

#[test]
fn transparent_spend_then_resubmission() {
    let env = env();
    let mut rng = StdRng::seed_from_u64(11);
    let (a, b) = (key(&env.oracle, &mut rng), key(&env.oracle, &mut rng));
    let roots = env.genesis(&[(a.vk.addr, 100)]);

    let tx = env.spend(&a, &roots, vec![(b.vk.addr, 60), (a.vk.addr, 30)], 10);
    let mut s = env.state(1);
    env.validator.apply(&mut s, &tx).unwrap();
    assert_eq!(s.commitments().len(), 2);
    assert_eq!(s.nullifiers(), &[transparent_nullifier(&roots[0])]);
    let done = s.finalize().unwrap();
    assert_eq!((done.num, done.commitments, done.nullifiers), (1, 2, 1));

    let before = env.store.dump().unwrap();
    let mut s = env.state(2);
    let root = s.root();
    let err = env.validator.apply(&mut s, &tx).unwrap_err();
    assert!(rejection(err).contains(|r| matches!(r, Reject::NullifierReuse(_))));
    assert!(s.commitments().is_empty());
    assert!(s.nullifiers().is_empty());
    assert_eq!(s.root(), root);
    assert_eq!(env.store.dump().unwrap(), before);
}

#[test]
fn imbalanced_transparent_tx_rejected() {
    let env = env();
    let mut rng = StdRng::seed_from_u64(12);
    let a = key(&env.oracle, &mut rng);
    let roots = env.genesis(&[(a.vk.addr, 100)]);
    let tx = env.spend(&a, &roots, vec![(a.vk.addr, 95)], 10);
    let s = env.state(1);
    let err = env.validator.verify_tx(&s, &tx).unwrap_err();
    assert!(rejection(err).contains(|r| matches!(r, Reject::BalanceMismatch(_))));
}

#[test]
fn stateless_failures_are_all_reported() {
    let env = env();
    let mut rng = StdRng::seed_from_u64(13);
    let a = key(&env.oracle, &mut rng);
    let roots = env.genesis(&[(a.vk.addr, 100)]);
    let outs = (0..10).map(|_| (a.vk.addr, 1u128)).collect();
    let mut tx = env.spend(&a, &roots, outs, 90);
    tx.fee.value = u128::MAX;
    tx.desc_o.ins[0].nil = Nullifier([5u8; 32]);

    let r = rejection(env.validator.verify_tx(&env.state(1), &tx).unwrap_err());
    assert!(r.contains(|r| matches!(r, Reject::ValueRange(_))));
    assert!(r.contains(|r| matches!(r, Reject::InvalidSignature(_))));
    assert!(r.contains(|r| matches!(r, Reject::TooMany { what: "transparent outputs", count: 11, max: 10 })));
    assert!(r.contains(|r| matches!(r, Reject::Malformed(_))));
    assert!(r.reasons().len() >= 4);
}

#[test]
fn foreign_input_signature_rejected() {
    let env = env();
    let mut rng = StdRng::seed_from_u64(14);
    let (a, b) = (key(&env.oracle, &mut rng), key(&env.oracle, &mut rng));
    let roots = env.genesis(&[(a.vk.addr, 50)]);
    // b signs for an output owned by a
    let tx = env.spend(&b, &roots, vec![(b.vk.addr, 50)], 0);
    let r = rejection(env.validator.verify_tx(&env.state(1), &tx).unwrap_err());
    assert!(r.contains(|r| matches!(r, Reject::InvalidSignature(_))));
}

#[test]
fn unknown_input_and_missing_package_rejected() {
    let env = env();
    let mut rng = StdRng::seed_from_u64(15);
    let a = key(&env.oracle, &mut rng);
    env.genesis(&[(a.vk.addr, 50)]);
    let tx = env.spend(&a, &[Root([9u8; 32])], vec![(a.vk.addr, 50)], 0);
    let r = rejection(env.validator.verify_tx(&env.state(1), &tx).unwrap_err());
    assert!(r.contains(|r| matches!(r, Reject::UnknownInput(_))));

    let mut tx = env.spend(&a, &[], vec![], 0);
    tx.desc_pkg.transfer = Some(PkgTransfer { id: PkgId([4u8; 32]), to: a.vk.addr, sign: Signature::default() });
    tx.sign = env.oracle.sign(&a.sk, &sign_hash(&tx)).unwrap();
    let r = rejection(env.validator.verify_tx(&env.state(1), &tx).unwrap_err());
    assert!(r.contains(|r| matches!(r, Reject::PackageMissing(_))));
}

#[test]
fn failed_block_is_reverted_whole() {
    let env = env();
    let mut rng = StdRng::seed_from_u64(16);
    let (a, b) = (key(&env.oracle, &mut rng), key(&env.oracle, &mut rng));
    let roots = env.genesis(&[(a.vk.addr, 100)]);
    let before = env.store.dump().unwrap();

    let good = env.spend(&a, &roots, vec![(b.vk.addr, 100)], 0);
    let again = env.spend(&a, &roots, vec![(a.vk.addr, 100)], 0);
    let mut s = env.state(1);
    let root_before = s.root();
    let err = verify_block(&env.validator, &mut s, &[good, again]).unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(s.root(), root_before);
    assert!(s.commitments().is_empty());
    assert!(!s.has_nullifier(&transparent_nullifier(&roots[0])).unwrap());
    assert_eq!(env.store.dump().unwrap(), before);
}

#[test]
fn replay_is_deterministic() {
    let run = || {
        let env = env();
        let mut rng = StdRng::seed_from_u64(17);
        let (a, b) = (key(&env.oracle, &mut rng), key(&env.oracle, &mut rng));
        let roots = env.genesis(&[(a.vk.addr, 100), (b.vk.addr, 7)]);
        let txs = vec![
            env.spend(&a, &roots[..1], vec![(b.vk.addr, 40), (a.vk.addr, 50)], 10),
            env.spend(&b, &roots[1..], vec![(a.vk.addr, 7)], 0),
        ];
        let mut s = env.state(1);
        let done = commit_block(&env.validator, &mut s, &txs).unwrap();
        (done, env.store.dump().unwrap())
    };
    let (d1, s1) = run();
    let (d2, s2) = run();
    assert_eq!(d1, d2);
    assert_eq!(s1, s2);
}

#[test]
fn mempool_refuses_conflicting_spend() {
    let env = env();
    let mut rng = StdRng::seed_from_u64(18);
    let (a, b) = (key(&env.oracle, &mut rng), key(&env.oracle, &mut rng));
    let roots = env.genesis(&[(a.vk.addr, 100)]);
    let s = env.state(1);
    let mut pool = Mempool::new();
    pool.admit(&env.validator, &s, env.spend(&a, &roots, vec![(b.vk.addr, 100)], 0)).unwrap();
    let err = pool.admit(&env.validator, &s, env.spend(&a, &roots, vec![(a.vk.addr, 90)], 10)).unwrap_err();
    assert!(rejection(err).contains(|r| matches!(r, Reject::NullifierReuse(_))));
    assert_eq!(pool.take().len(), 1);
    assert!(pool.is_empty());
}

#[cfg(feature = "rocksdb")]
#[test]
fn rocks_store_round_trips_a_block() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn KvStore> = Arc::new(RocksStore::open(dir.path()).unwrap());
    let oracle = DevOracle::with_depth(8);
    let mut s = LedgerState::load(store.clone(), oracle.tree_hasher(), 0).unwrap();
    let root = s
        .add_output(Output::Transparent(OutO { addr: Address::default(), asset: sero(3), memo: Memo::default() }))
        .unwrap();
    s.finalize().unwrap();
    let s = LedgerState::load(store, oracle.tree_hasher(), 1).unwrap();
    assert_eq!(s.root(), root);
    assert_eq!(s.get_output(&root).unwrap().unwrap().index, 0);
}
