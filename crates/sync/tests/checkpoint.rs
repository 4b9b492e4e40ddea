use std::fs;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use consensus::{BlockRecord, KvStore, LedgerState, MemStore};
use pcd::{random_scalar, DevOracle, Oracle, OutputWitness};
use primitives::*;
use sync::*;

fn sero(v: u128) -> Asset { Asset::token(Currency::from_symbol("SERO"), v) }

fn key(oracle: &DevOracle, rng: &mut StdRng) -> ViewKey {
    let mut b = [0u8; 32];
    rng.fill_bytes(&mut b);
    oracle.view_key(&SpendKey(b)).unwrap()
}

fn pay(oracle: &DevOracle, rng: &mut StdRng, addr: Address, v: u128) -> Output {
    let w = OutputWitness {
        addr,
        asset: sero(v),
        memo: Memo::from_text("cp"),
        ar: random_scalar(rng),
        rcm: random_scalar(rng),
        esk: random_scalar(rng),
    };
    Output::Shielded(oracle.generate_output_proof(&w).unwrap())
}

#[test]
fn checkpoint_restores_witnesses_and_owner_maps() {
    let oracle = Arc::new(DevOracle::with_depth(6));
    let mut rng = StdRng::seed_from_u64(31);
    let a = key(&oracle, &mut rng);
    let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
    let dir = tempfile::tempdir().unwrap();
    let cps = CheckpointDir::open(dir.path()).unwrap();

    let mut wallet = WalletState::new(oracle.clone(), vec![a]);
    let mut s = LedgerState::load(store.clone(), oracle.tree_hasher(), 0).unwrap();
    s.add_output(pay(&oracle, &mut rng, a.addr, 12)).unwrap();
    s.add_output(Output::Transparent(OutO { addr: a.addr, asset: sero(4), memo: Memo::default() })).unwrap();
    s.finalize().unwrap();
    wallet.update(&s).unwrap();
    let path = cps.save(&wallet, 0, &s.root()).unwrap();
    assert_eq!(path.file_name().unwrap().to_str().unwrap(), checkpoint_name(0, &s.root()));

    // next block resumes from the checkpoint keyed by the pre-block root
    let mut s1 = LedgerState::load(store, oracle.tree_hasher(), 1).unwrap();
    s1.add_output(pay(&oracle, &mut rng, a.addr, 1)).unwrap();
    s1.finalize().unwrap();
    let block = BlockRecord::load(s1.store().as_ref(), &oracle.tree_hasher(), 1).unwrap().unwrap();
    let mut restored = cps.load_for_block(oracle.clone(), vec![a], &block).unwrap().unwrap();
    assert_eq!(restored.height(), Some(0));
    assert_eq!(restored.list_outputs(&a.addr), wallet.list_outputs(&a.addr));

    restored.update(&s1).unwrap();
    wallet.update(&s1).unwrap();
    assert_eq!(restored.list_outputs(&a.addr), wallet.list_outputs(&a.addr));
    let z = restored.list_outputs(&a.addr).into_iter().find(|t| t.value() == 12).unwrap();
    assert_eq!(restored.get_by_nullifier(&z.nullifier).unwrap().root, z.root);
    assert_eq!(z.path().unwrap().anchor, s1.root());
}

#[test]
fn missing_and_corrupt_checkpoints() {
    let oracle = Arc::new(DevOracle::with_depth(6));
    let dir = tempfile::tempdir().unwrap();
    let cps = CheckpointDir::open(dir.path()).unwrap();
    let root = Root([3u8; 32]);
    assert!(cps.load(oracle.clone(), vec![], 5, &root).unwrap().is_none());

    let wallet = WalletState::new(oracle.clone(), vec![]);
    let path = cps.save(&wallet, 5, &root).unwrap();
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
    let err = cps.load(oracle.clone(), vec![], 5, &root).err().unwrap();
    assert!(matches!(err, WalletError::Checkpoint { .. }));

    fs::write(&path, [9u8, 0, 0]).unwrap();
    assert!(matches!(cps.load(oracle, vec![], 5, &root), Err(WalletError::Checkpoint { .. })));
}

#[test]
fn pruning_thins_old_checkpoints() {
    let oracle = Arc::new(DevOracle::with_depth(6));
    let dir = tempfile::tempdir().unwrap();
    let mut cps = CheckpointDir::open(dir.path()).unwrap().with_retention(64, 10);
    let wallet = WalletState::new(oracle, vec![]);
    for num in 0..400u64 {
        let mut r = [0u8; 32];
        r[4..12].copy_from_slice(&num.to_be_bytes());
        cps.save(&wallet, num, &Root(r)).unwrap();
    }

    let removed = cps.prune(400).unwrap();
    assert!(!removed.is_empty());
    let mut kept: Vec<u64> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| parse_checkpoint_name(e.unwrap().file_name().to_str().unwrap()))
        .collect();
    kept.sort();
    assert_eq!(kept.len() + removed.len(), 400);
    // everything within one margin of the head survives
    assert!((336..400).all(|n| kept.contains(&n)));
    assert!(!kept.contains(&333));
    // one survivor per distance bucket below that
    assert!(kept.iter().filter(|n| **n < 336).count() <= 9);

    // throttled until the interval passes
    assert!(cps.prune(405).unwrap().is_empty());
}

#[cfg(unix)]
#[test]
fn failed_save_leaves_no_file() {
    use std::os::unix::fs::symlink;

    let oracle = Arc::new(DevOracle::with_depth(6));
    let dir = tempfile::tempdir().unwrap();
    let cps = CheckpointDir::open(dir.path()).unwrap();
    let wallet = WalletState::new(oracle.clone(), vec![]);
    let root = Root([5u8; 32]);
    let leftovers = || {
        fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_str().unwrap().starts_with("0000000007."))
            .count()
    };

    // written bytes vanish, so the read-back does not decode
    symlink("/dev/null", cps.path(7, &root)).unwrap();
    let err = cps.save(&wallet, 7, &root).unwrap_err();
    assert!(matches!(err, WalletError::Checkpoint { .. }));
    assert_eq!(leftovers(), 0);

    // the write itself fails
    symlink(dir.path().join("missing/target"), cps.path(7, &root)).unwrap();
    let err = cps.save(&wallet, 7, &root).unwrap_err();
    assert!(matches!(err, WalletError::Io(_)));
    assert_eq!(leftovers(), 0);
    assert!(cps.load(oracle, vec![], 7, &root).unwrap().is_none());

    cps.save(&wallet, 7, &root).unwrap();
    assert_eq!(leftovers(), 1);
}
