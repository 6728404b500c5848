//! The node facade: every entry point that mutates or queries chain state
//! goes through [`Node`]. Block application is serialized by a single state
//! mutex so mining, peer proposals, and replay never interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Consensus, NodeConfig};
use crate::errors::{ChainError, ChainResult};
use crate::events::EventHub;
use crate::genesis::Genesis;
use crate::ledger::Ledger;
use crate::mempool::Mempool;
use crate::peers::PeerSet;
use crate::pow::{self, PowArgs};
use crate::store::BlockStore;
use crate::types::{Account, AccountId, Block, BlockData, BlockTx, Peer, SignedTx};

/// Sentinel for "the latest block" in block range queries.
pub const QUERY_LATEST: u64 = u64::MAX >> 1;

/// The signalling surface the node needs from its worker. Holding this as a
/// trait object breaks the reference cycle between the two: the worker owns
/// a [`Node`], the node only sees the signals.
#[async_trait]
pub trait WorkerSignals: Send + Sync {
    /// Reconciles peers, mempool, and blocks with the rest of the network.
    async fn sync(&self);
    fn signal_start_mining(&self);
    fn signal_cancel_mining(&self) -> CancelGuard;
    fn signal_share_tx(&self, tx: BlockTx);
}

/// Handle held by whoever cancelled a mining round. The cancelled round
/// cannot finish until this is released (or dropped), which guarantees the
/// canceller's state changes are visible before the next round starts.
pub struct CancelGuard {
    _latch: Option<oneshot::Sender<()>>,
}

impl CancelGuard {
    pub(crate) fn new(latch: oneshot::Sender<()>) -> Self {
        Self {
            _latch: Some(latch),
        }
    }

    /// Guard for when no mining round was listening.
    pub(crate) fn noop() -> Self {
        Self { _latch: None }
    }

    /// Frees the cancelled mining round to return.
    pub fn release(self) {}
}

pub struct NodeArgs {
    pub config: NodeConfig,
    pub genesis: Genesis,
    pub beneficiary_id: AccountId,
}

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    genesis: Arc<Genesis>,
    beneficiary_id: AccountId,
    host: String,
    consensus: Consensus,
    peers: PeerSet,
    store: BlockStore,
    ledger: Ledger,
    mempool: Mempool,
    events: EventHub,
    state_mutex: Mutex<()>,
    allow_mining: AtomicBool,
    worker: OnceLock<Arc<dyn WorkerSignals>>,
}

impl Node {
    /// Opens the block store, replays it into a fresh ledger, and seeds the
    /// peer registry with this host and the configured origin peers.
    pub fn new(args: NodeArgs) -> ChainResult<Self> {
        let genesis = Arc::new(args.genesis);
        let store = BlockStore::open(&args.config.db_path)?;
        let ledger = Ledger::load(genesis.clone(), &store)?;
        let mempool = Mempool::with_strategy(&args.config.select_strategy)?;

        let peers = PeerSet::new();
        peers.add(Peer::new(args.config.private_host.clone()));
        for host in &args.config.origin_peers {
            peers.add(Peer::new(host.clone()));
        }

        info!(
            latest = ledger.latest_block().header.number,
            host = %args.config.private_host,
            consensus = %args.config.consensus,
            "chain state loaded"
        );

        Ok(Self {
            inner: Arc::new(NodeInner {
                genesis,
                beneficiary_id: args.beneficiary_id,
                host: args.config.private_host,
                consensus: args.config.consensus,
                peers,
                store,
                ledger,
                mempool,
                events: EventHub::new(),
                state_mutex: Mutex::new(()),
                allow_mining: AtomicBool::new(true),
                worker: OnceLock::new(),
            }),
        })
    }

    /// Registers the worker's signalling surface. Called once by the worker
    /// during startup; later calls are ignored.
    pub fn register_worker(&self, worker: Arc<dyn WorkerSignals>) {
        let _ = self.inner.worker.set(worker);
    }

    fn worker(&self) -> Option<&Arc<dyn WorkerSignals>> {
        self.inner.worker.get()
    }

    // ---------------------------------------------------------------------
    // Transaction intake

    /// Accepts a signed transaction from a wallet: validates it, stamps the
    /// gas terms from genesis, admits it to the mempool, and signals the
    /// worker to gossip it and start mining.
    pub fn upsert_wallet_transaction(&self, signed: SignedTx) -> ChainResult<()> {
        signed.validate(self.inner.genesis.chain_id)?;
        let tx = BlockTx::new(signed, self.inner.genesis.gas_price, 1);
        let count = self.inner.mempool.upsert(tx.clone());
        debug!(tx = %tx, mempool = count, "wallet transaction accepted");
        if let Some(worker) = self.worker() {
            worker.signal_share_tx(tx);
            worker.signal_start_mining();
        }
        Ok(())
    }

    /// Accepts a transaction that arrived over gossip. Same as the wallet
    /// path minus the share signal: the sender already broadcast it.
    pub fn upsert_node_transaction(&self, tx: BlockTx) -> ChainResult<()> {
        tx.validate(self.inner.genesis.chain_id)?;
        let count = self.inner.mempool.upsert(tx.clone());
        debug!(tx = %tx, mempool = count, "node transaction accepted");
        if let Some(worker) = self.worker() {
            worker.signal_start_mining();
        }
        Ok(())
    }

    /// Admits a transaction pulled from a peer's mempool during sync,
    /// bypassing the start-mining signal.
    pub fn upsert_mempool(&self, tx: BlockTx) -> usize {
        self.inner.mempool.upsert(tx)
    }

    // ---------------------------------------------------------------------
    // Mining and block application

    /// Selects the best pending transactions and performs the proof-of-work
    /// search, then applies the won block locally. Cancellable through the
    /// token; fails with [`ChainError::NoTransactions`] on an empty mempool.
    pub async fn mine_new_block(&self, token: &CancellationToken) -> ChainResult<Block> {
        if self.inner.mempool.count() == 0 {
            return Err(ChainError::NoTransactions);
        }
        let txs = self
            .inner
            .mempool
            .pick_best(self.inner.genesis.trans_per_block);
        if txs.is_empty() {
            return Err(ChainError::NoTransactions);
        }

        let args = PowArgs {
            beneficiary_id: self.inner.beneficiary_id.clone(),
            difficulty: self.inner.genesis.difficulty,
            mining_reward: self.inner.genesis.mining_reward,
            prev_block: self.inner.ledger.latest_block(),
            state_root: self.inner.ledger.state_hash(),
            txs,
        };

        let mining_token = token.clone();
        let block = tokio::task::spawn_blocking(move || pow::pow(&mining_token, args))
            .await
            .expect("mining task panicked")?;

        if token.is_cancelled() {
            return Err(ChainError::Cancelled);
        }

        self.validate_update_database(&block)?;
        Ok(block)
    }

    /// Validates and applies a block proposed by a peer, then cancels any
    /// in-flight local mining round. The cancel guard is released only after
    /// the state change has fully landed, so the interrupted round cannot
    /// observe a half-applied chain.
    pub fn process_proposed_block(&self, block: &Block) -> ChainResult<()> {
        debug!(
            number = block.header.number,
            hash = %block.hash(),
            txs = block.txs().len(),
            "processing proposed block"
        );
        self.validate_update_database(block)?;
        if let Some(worker) = self.worker() {
            worker.signal_cancel_mining().release();
        }
        Ok(())
    }

    /// The single write path for blocks. Under the state mutex: validate
    /// against the current tip and state root, persist, advance the tip,
    /// drop the block's transactions from the mempool and apply them, then
    /// credit the mining reward. Individual transaction failures are logged
    /// and skipped; their gas has already been charged.
    pub fn validate_update_database(&self, block: &Block) -> ChainResult<()> {
        let _guard = self.inner.state_mutex.lock();

        block.validate(
            &self.inner.ledger.latest_block(),
            &self.inner.ledger.state_hash(),
        )?;

        self.inner.store.write(&BlockData::from(block))?;
        self.inner.ledger.set_latest_block(block.clone());

        for tx in block.txs() {
            self.inner.mempool.delete(tx);
            if let Err(err) = self.inner.ledger.apply_tx(block, tx) {
                warn!(tx = %tx, error = %err, "transaction failed during block application");
            }
        }
        self.inner.ledger.apply_mining_reward(block);

        info!(
            number = block.header.number,
            hash = %block.hash(),
            "block applied"
        );
        self.emit_block_event(block);
        Ok(())
    }

    /// Rebuilds local state from the network after a detected fork: mining
    /// is paused, ledger and block store reset, and a background task pulls
    /// the chain from peers before mining resumes.
    pub fn resync(&self) -> ChainResult<()> {
        {
            let _guard = self.inner.state_mutex.lock();
            self.inner.allow_mining.store(false, Ordering::SeqCst);
            self.inner.ledger.reset();
            self.inner.store.reset()?;
        }
        info!("resync started");

        let node = self.clone();
        tokio::spawn(async move {
            if let Some(worker) = node.inner.worker.get() {
                worker.sync().await;
            }
            node.inner.allow_mining.store(true, Ordering::SeqCst);
            info!("resync completed");
        });
        Ok(())
    }

    fn emit_block_event(&self, block: &Block) {
        match serde_json::to_string(&BlockData::from(block)) {
            Ok(payload) => self.inner.events.send(format!("viewer: block: {payload}")),
            Err(err) => warn!(error = %err, "unable to encode block event"),
        }
    }

    // ---------------------------------------------------------------------
    // Queries

    pub fn genesis(&self) -> &Genesis {
        &self.inner.genesis
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn consensus(&self) -> Consensus {
        self.inner.consensus
    }

    pub fn beneficiary_id(&self) -> &AccountId {
        &self.inner.beneficiary_id
    }

    pub fn events(&self) -> &EventHub {
        &self.inner.events
    }

    pub fn is_mining_allowed(&self) -> bool {
        self.inner.allow_mining.load(Ordering::SeqCst)
    }

    pub fn latest_block(&self) -> Block {
        self.inner.ledger.latest_block()
    }

    pub fn mempool(&self) -> Vec<BlockTx> {
        self.inner.mempool.copy()
    }

    pub fn mempool_count(&self) -> usize {
        self.inner.mempool.count()
    }

    pub fn accounts(&self) -> HashMap<AccountId, Account> {
        self.inner.ledger.copy_accounts()
    }

    pub fn query_account(&self, account_id: &AccountId) -> ChainResult<Account> {
        self.inner.ledger.query(account_id)
    }

    /// Blocks within the inclusive number range, read back from disk. The
    /// [`QUERY_LATEST`] sentinel in either position resolves to the tip.
    pub fn query_blocks_by_number(&self, from: u64, to: u64) -> Vec<Block> {
        let latest = self.latest_block().header.number;
        let (from, to) = if from == QUERY_LATEST {
            (latest, latest)
        } else if to == QUERY_LATEST {
            (from, latest)
        } else {
            (from, to)
        };

        let mut blocks = Vec::new();
        for data in self.inner.store.iter() {
            match data {
                Ok(data) => {
                    let number = data.header.number;
                    if number >= from && number <= to {
                        blocks.push(Block::from(data));
                    }
                }
                Err(err) => {
                    warn!(error = %err, "block read failed during range query");
                    break;
                }
            }
        }
        blocks
    }

    /// Blocks in which the account appears as sender or recipient. `None`
    /// returns every block.
    pub fn query_blocks_by_account(&self, account_id: Option<&AccountId>) -> Vec<Block> {
        let mut blocks = Vec::new();
        for data in self.inner.store.iter() {
            match data {
                Ok(data) => {
                    let block = Block::from(data);
                    let matches = block.txs().iter().any(|tx| match account_id {
                        Some(id) => tx.signed.tx.from_id == *id || tx.signed.tx.to_id == *id,
                        None => true,
                    });
                    if matches {
                        blocks.push(block);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "block read failed during account query");
                    break;
                }
            }
        }
        blocks
    }

    // ---------------------------------------------------------------------
    // Peers

    /// Every known peer except this node.
    pub fn known_external_peers(&self) -> Vec<Peer> {
        self.inner.peers.copy(&self.inner.host)
    }

    /// Every known peer including this node; leader election needs the full
    /// list.
    pub fn known_peers_with_self(&self) -> Vec<Peer> {
        self.inner.peers.copy("")
    }

    /// Adds a peer unless it is this node; reports whether it was new.
    pub fn add_known_peer(&self, peer: Peer) -> bool {
        if peer.matches(&self.inner.host) {
            return false;
        }
        self.inner.peers.add(peer)
    }

    pub fn remove_known_peer(&self, peer: &Peer) {
        self.inner.peers.remove(peer);
    }
}
