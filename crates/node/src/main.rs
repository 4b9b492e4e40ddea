use std::process;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info};

use consensus::{KvStore, MemStore};
use node::{telemetry, MemChain, Node, NodeConfig};
use pcd::{DevOracle, Oracle};
use primitives::{Asset, Currency, Memo, SpendKey, Token};
use tx::{select_inputs, Reception, TxParam};

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => NodeConfig::load(path),
        None => Ok(NodeConfig::default()),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(2);
        }
    };
    if let Err(e) = telemetry::init(&config.log_level) {
        eprintln!("{:#}", e);
    }
    if let Err(e) = run(config) {
        error!(error = %format!("{:#}", e), "node stopped");
        process::exit(1);
    }
}

/// Dev run: fund one key at genesis, shield part of it, then report balances.
fn run(config: NodeConfig) -> anyhow::Result<()> {
    let oracle = Arc::new(DevOracle::new());
    let mut rng = StdRng::from_entropy();
    let sk = SpendKey(rng.gen());
    let vk = oracle.view_key(&sk)?;
    let sero = Currency::from_symbol("SERO");

    let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
    let chain = Arc::new(MemChain::new(store, oracle.tree_hasher(), vec![vk]));
    let mut node = Node::open(config, chain, oracle)?;
    node.genesis(&[(vk.addr, Asset::token(sero, 1_000))])?;

    let (ins, total) = select_inputs(node.wallet(), &vk.addr, sero, 1_000)?;
    let param = TxParam {
        from: sk,
        fee: Token { currency: sero, value: 10 },
        ins,
        outs: vec![
            Reception { addr: vk.addr, asset: Asset::token(sero, 500), memo: Memo::from_text("shielded"), shielded: true },
            Reception { addr: vk.addr, asset: Asset::token(sero, total - 510), memo: Memo::default(), shielded: false },
        ],
        pkg: None,
    };
    let tx = node.generate(&param, &mut rng)?;
    node.submit(tx)?;
    let head = node.produce_block()?;

    for (symbol, value) in node.wallet().balance(&vk.addr)? {
        info!(num = head.num, %symbol, value, "balance");
    }
    Ok(())
}
