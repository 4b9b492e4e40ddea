use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use consensus::{KvStore, LedgerState, MemStore, Validator};
use pcd::{DevOracle, Oracle, PoolConfig, WorkerPool};
use primitives::params::ParamTable;
use primitives::*;
use sync::{Wallet, WalletState};
use tx::*;

fn sero(v: u128) -> Asset { Asset::token(Currency::from_symbol("SERO"), v) }

fn fee(v: u128) -> Token { Token { currency: Currency::from_symbol("SERO"), value: v } }

struct Party {
    sk: SpendKey,
    vk: ViewKey,
    wallet: Wallet,
}

struct World {
    oracle: Arc<DevOracle>,
    store: Arc<dyn KvStore>,
    generator: Generator,
    validator: Validator,
    rng: StdRng,
}

impl World {
    fn new(seed: u64, pool: WorkerPool) -> Self {
        let oracle = Arc::new(DevOracle::with_depth(8));
        let pool = Arc::new(pool);
        Self {
            generator: Generator::new(oracle.clone(), pool.clone(), ParamTable::default()),
            validator: Validator::new(oracle.clone(), pool, ParamTable::default()),
            store: Arc::new(MemStore::new()),
            oracle,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn party(&mut self) -> Party {
        let mut b = [0u8; 32];
        self.rng.fill_bytes(&mut b);
        let sk = SpendKey(b);
        let vk = self.oracle.view_key(&sk).unwrap();
        Party { sk, vk, wallet: Wallet::new(WalletState::new(self.oracle.clone(), vec![vk])) }
    }

    fn state(&self, num: u64) -> LedgerState { LedgerState::load(self.store.clone(), self.oracle.tree_hasher(), num).unwrap() }

    fn seal(&self, mut s: LedgerState, parties: &[&Party]) {
        s.finalize().unwrap();
        for p in parties {
            p.wallet.update(&s).unwrap();
        }
    }
}

#[test]
fn shielded_payment_round_trip() {
    let mut w = World::new(41, WorkerPool::inline());
    let (a, b) = (w.party(), w.party());
    let mut s = w.state(0);
    s.add_output(Output::Transparent(OutO { addr: a.vk.addr, asset: sero(100), memo: Memo::default() })).unwrap();
    w.seal(s, &[&a, &b]);

    let (ins, total) = select_inputs(&a.wallet, &a.vk.addr, Currency::from_symbol("SERO"), 60).unwrap();
    assert_eq!(total, 100);
    let param = TxParam {
        from: a.sk,
        fee: fee(10),
        ins,
        outs: vec![
            Reception { addr: b.vk.addr, asset: sero(50), memo: Memo::from_text("hi"), shielded: true },
            Reception { addr: a.vk.addr, asset: sero(40), memo: Memo::default(), shielded: true },
        ],
        pkg: None,
    };
    let mut s = w.state(1);
    let tx = w.generator.generate(&a.wallet, &s, &param, &mut w.rng).unwrap();
    assert_eq!(tx.desc_z.outs.len(), 2);
    assert!(tx.desc_o.outs.is_empty());
    w.validator.apply(&mut s, &tx).unwrap();
    w.seal(s, &[&a, &b]);

    assert_eq!(a.wallet.balance(&a.vk.addr).unwrap()["SERO"], 40);
    assert_eq!(b.wallet.balance(&b.vk.addr).unwrap()["SERO"], 50);

    // b spends its shielded note back to a transparently
    let ins = vec![b.wallet.list_outputs(&b.vk.addr).unwrap()[0].root];
    let param = TxParam {
        from: b.sk,
        fee: fee(5),
        ins,
        outs: vec![Reception { addr: a.vk.addr, asset: sero(45), memo: Memo::default(), shielded: false }],
        pkg: None,
    };
    let mut s = w.state(2);
    let tx = w.generator.generate(&b.wallet, &s, &param, &mut w.rng).unwrap();
    assert_eq!(tx.desc_z.ins.len(), 1);
    w.validator.apply(&mut s, &tx).unwrap();
    w.seal(s, &[&a, &b]);
    assert!(b.wallet.list_outputs(&b.vk.addr).unwrap().is_empty());
    assert_eq!(a.wallet.balance(&a.vk.addr).unwrap()["SERO"], 85);
}

#[test]
fn imbalanced_request_fails_before_proving() {
    let mut w = World::new(42, WorkerPool::inline());
    let a = w.party();
    let mut s = w.state(0);
    let root = s.add_output(Output::Transparent(OutO { addr: a.vk.addr, asset: sero(10), memo: Memo::default() })).unwrap();
    w.seal(s, &[&a]);

    let param = TxParam {
        from: a.sk,
        fee: fee(1),
        ins: vec![root],
        outs: vec![Reception { addr: a.vk.addr, asset: sero(10), memo: Memo::default(), shielded: true }],
        pkg: None,
    };
    let err = w.generator.generate(&a.wallet, &w.state(1), &param, &mut w.rng).unwrap_err();
    assert!(matches!(err, GenError::Rejected(Reject::BalanceMismatch(_))));
    assert_eq!(a.wallet.get_output(&root).unwrap().unwrap().used, 0);
}

#[test]
fn foreign_and_duplicate_inputs_refused() {
    let mut w = World::new(43, WorkerPool::inline());
    let (a, b) = (w.party(), w.party());
    let mut s = w.state(0);
    let root = s.add_output(Output::Transparent(OutO { addr: a.vk.addr, asset: sero(10), memo: Memo::default() })).unwrap();
    w.seal(s, &[&a, &b]);

    let mut param = TxParam { from: b.sk, fee: fee(10), ins: vec![root], outs: vec![], pkg: None };
    let err = w.generator.generate(&a.wallet, &w.state(1), &param, &mut w.rng).unwrap_err();
    assert!(matches!(err, GenError::UnknownInput(_)));

    param.from = a.sk;
    param.ins = vec![root, root];
    let err = w.generator.generate(&a.wallet, &w.state(1), &param, &mut w.rng).unwrap_err();
    assert!(matches!(err, GenError::Rejected(Reject::NullifierReuse(_))));
}

#[test]
fn threaded_pool_builds_valid_transactions() {
    let cfg = PoolConfig { workers: 3, permits: 2, debug: false };
    let mut w = World::new(44, WorkerPool::new(cfg).unwrap());
    let (a, b) = (w.party(), w.party());
    let mut s = w.state(0);
    let root = s.add_output(Output::Transparent(OutO { addr: a.vk.addr, asset: sero(30), memo: Memo::default() })).unwrap();
    w.seal(s, &[&a, &b]);

    let outs = (0..6)
        .map(|_| Reception { addr: b.vk.addr, asset: sero(5), memo: Memo::default(), shielded: true })
        .collect();
    let param = TxParam { from: a.sk, fee: fee(0), ins: vec![root], outs, pkg: None };
    let mut s = w.state(1);
    let tx = w.generator.generate(&a.wallet, &s, &param, &mut w.rng).unwrap();
    w.validator.apply(&mut s, &tx).unwrap();
    w.seal(s, &[&a, &b]);
    assert_eq!(b.wallet.list_outputs(&b.vk.addr).unwrap().len(), 6);
}

#[test]
fn params_serialize_as_json() {
    let param = TxParam {
        from: SpendKey([1u8; 32]),
        fee: fee(3),
        ins: vec![Root([2u8; 32])],
        outs: vec![],
        pkg: Some(PkgAction::Close { id: PkgId([4u8; 32]), key: [5u8; 32] }),
    };
    let json = serde_json::to_string(&param).unwrap();
    let back: TxParam = serde_json::from_str(&json).unwrap();
    assert_eq!(back, param);
}
