//! Block processing.
//!
//! Each block is verified and applied on a fresh ledger state, finalized,
//! folded into the wallet and checkpointed before the new head is
//! published through the state handle. A fatal error halts the node: every
//! later call fails with `NodeError::Halted`.

use std::sync::Arc;

use rand::RngCore;
use tracing::{error, info, instrument, warn};

use consensus::{verify_block, BlockRecord, LedgerState, Mempool, Validator};
use pcd::{Oracle, WorkerPool};
use primitives::{Address, Asset, Memo, OutO, Output, Tx, ViewKey};
use sync::{CheckpointDir, Wallet, WalletState};
use tx::{Generator, TxParam};

use crate::chain::{Chain, Header};
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::handle::{Snapshot, StateHandle};

pub struct Node<C: Chain> {
    config: NodeConfig,
    chain: Arc<C>,
    validator: Validator,
    generator: Generator,
    wallet: Wallet,
    checkpoints: CheckpointDir,
    handle: Arc<StateHandle>,
    mempool: Mempool,
    halted: bool,
}

impl<C: Chain> Node<C> {
    /// Open a node on `chain`. The wallet resumes from the checkpoint of the
    /// current head, or is rebuilt from stored blocks when there is none.
    pub fn open(config: NodeConfig, chain: Arc<C>, oracle: Arc<dyn Oracle>) -> Result<Self> {
        let pool = Arc::new(WorkerPool::new(config.pool)?);
        let validator = Validator::new(oracle.clone(), pool.clone(), config.params);
        let generator = Generator::new(oracle.clone(), pool, config.params);
        let checkpoints =
            CheckpointDir::open(config.checkpoint_dir())?.with_retention(config.retention_margin, config.prune_interval);

        let keys = chain.held_viewing_keys();
        let head = chain.current_header();
        let state = match head {
            None => WalletState::new(oracle, keys),
            Some(h) => match checkpoints.load(oracle.clone(), keys.clone(), h.num, &h.root)? {
                Some(s) => {
                    info!(num = h.num, "wallet restored from checkpoint");
                    s
                }
                None => {
                    warn!(num = h.num, "no checkpoint for head, rescanning");
                    rescan(chain.as_ref(), oracle, keys, &h)?
                }
            },
        };

        Ok(Self {
            handle: Arc::new(StateHandle::new(Snapshot { head, block: None })),
            config,
            chain,
            validator,
            generator,
            wallet: Wallet::new(state),
            checkpoints,
            mempool: Mempool::new(),
            halted: false,
        })
    }

    pub fn config(&self) -> &NodeConfig { &self.config }

    pub fn chain(&self) -> &Arc<C> { &self.chain }

    pub fn wallet(&self) -> &Wallet { &self.wallet }

    pub fn validator(&self) -> &Validator { &self.validator }

    pub fn handle(&self) -> Arc<StateHandle> { self.handle.clone() }

    pub fn pending(&self) -> usize { self.mempool.len() }

    pub fn is_halted(&self) -> bool { self.halted }

    /// Ledger state the next block is built on.
    pub fn next_state(&self) -> Result<LedgerState> {
        let head = self.chain.current_header();
        self.chain.new_ledger_state(head.as_ref().map(|h| &h.hash))
    }

    fn running(&self) -> Result<()> {
        if self.halted {
            return Err(NodeError::Halted);
        }
        Ok(())
    }

    /// Convert `r`, halting on anything fatal.
    fn guard<T, E: Into<NodeError>>(&mut self, r: core::result::Result<T, E>) -> Result<T> {
        r.map_err(|e| {
            let e = e.into();
            if e.is_fatal() {
                error!(error = %e, "halting node");
                self.halted = true;
            }
            e
        })
    }

    /// Block 0, paying each allocation to a transparent output.
    pub fn genesis(&mut self, alloc: &[(Address, Asset)]) -> Result<Header> {
        self.running()?;
        let r = self.chain.new_ledger_state(None);
        let mut state = self.guard(r)?;
        for (addr, asset) in alloc {
            let out = Output::Transparent(OutO { addr: *addr, asset: *asset, memo: Memo::default() });
            self.guard(state.add_output(out))?;
        }
        self.seal(state)
    }

    /// Verify `tx` against the next block's state and queue it.
    pub fn submit(&mut self, tx: Tx) -> Result<()> {
        self.running()?;
        let r = self.next_state();
        let state = self.guard(r)?;
        let r = self.mempool.admit(&self.validator, &state, tx);
        self.guard(r)
    }

    /// Build a transaction from the wallet for the next block.
    pub fn generate<R: RngCore>(&self, param: &TxParam, rng: &mut R) -> Result<Tx> {
        self.running()?;
        let state = self.next_state()?;
        Ok(self.generator.generate(&self.wallet, &state, param, rng)?)
    }

    /// Seal everything in the mempool into the next block. If the block is
    /// rejected, the pending transactions are re-admitted one at a time and
    /// those that still verify wait for the next call.
    pub fn produce_block(&mut self) -> Result<Header> {
        let txs = self.mempool.take();
        match self.process_block(&txs) {
            Err(NodeError::Rejected(e)) => {
                self.requeue(txs)?;
                Err(NodeError::Rejected(e))
            }
            r => r,
        }
    }

    fn requeue(&mut self, txs: Vec<Tx>) -> Result<()> {
        let r = self.next_state();
        let state = self.guard(r)?;
        let mut dropped = 0;
        for tx in txs {
            match self.mempool.admit(&self.validator, &state, tx) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return self.guard(Err(e)),
                Err(e) => {
                    warn!(error = %e, "dropping pending transaction");
                    dropped += 1;
                }
            }
        }
        info!(kept = self.mempool.len(), dropped, "requeued pending transactions");
        Ok(())
    }

    /// Verify, apply and finalize `txs` as the next block. A rejected block
    /// leaves the ledger untouched.
    #[instrument(skip_all, fields(txs = txs.len()))]
    pub fn process_block(&mut self, txs: &[Tx]) -> Result<Header> {
        self.running()?;
        let r = self.next_state();
        let mut state = self.guard(r)?;
        let r = verify_block(&self.validator, &mut state, txs);
        self.guard(r)?;
        self.seal(state)
    }

    fn seal(&mut self, mut state: LedgerState) -> Result<Header> {
        let done = self.guard(state.finalize())?;
        let scan = self.guard(self.wallet.update(&state))?;
        let header = Header::seal(self.chain.current_header().as_ref(), &done);
        let r = self
            .chain
            .append(header)
            .map_err(|e| NodeError::Fatal(format!("block {} finalized but not appended: {}", done.num, e)));
        self.guard(r)?;

        let saved = self.wallet.read().and_then(|w| self.checkpoints.save(&w, done.num, &done.root));
        match saved {
            Err(e) if e.is_invariant() => return self.guard(Err(e)),
            Err(e) => warn!(num = done.num, error = %e, "checkpoint not written"),
            Ok(_) => {}
        }
        if let Err(e) = self.checkpoints.prune(done.num) {
            warn!(num = done.num, error = %e, "checkpoint pruning failed");
        }

        self.handle.swap(Snapshot { head: Some(header), block: Some(done) });
        info!(
            num = done.num,
            root = %done.root.to_hex(),
            added = scan.added,
            spent = scan.spent,
            "block sealed"
        );
        Ok(header)
    }
}

/// Rebuild wallet state by scanning every stored block up to `head`.
fn rescan<C: Chain>(chain: &C, oracle: Arc<dyn Oracle>, keys: Vec<ViewKey>, head: &Header) -> Result<WalletState> {
    let ledger = chain.new_ledger_state(Some(&head.hash))?;
    let mut state = WalletState::new(oracle, keys);
    for num in 0..=head.num {
        let block = BlockRecord::load(ledger.store().as_ref(), ledger.hasher(), num)?
            .ok_or_else(|| NodeError::Fatal(format!("block {} missing from store", num)))?;
        state.scan_block(&block, &ledger)?;
    }
    Ok(state)
}
