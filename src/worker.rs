//! The worker: three long-running tasks that keep the node participating in
//! the network — peer maintenance, mining, and transaction gossip — plus the
//! sync routine used at startup and after a resync.
//!
//! All signalling is non-blocking. `start_mining` holds at most one pending
//! signal, so bursts of submissions coalesce into a single round.
//! `cancel_mining` carries a latch: the mining round that observes a cancel
//! may not start another round until the canceller releases the latch,
//! which orders peer-block application strictly before the next mine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::PeerClient;
use crate::config::Consensus;
use crate::errors::{ChainError, ChainResult};
use crate::node::{CancelGuard, Node, WorkerSignals};
use crate::types::{Block, BlockData, BlockTx, Peer};

const PEER_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const POA_CYCLE: Duration = Duration::from_secs(12);

/// Pending gossip signals beyond this are dropped rather than queued.
const MAX_TX_SHARE_REQUESTS: usize = 100;

type CancelLatch = oneshot::Receiver<()>;

pub struct Worker {
    node: Node,
    client: PeerClient,
    start_mining: mpsc::Sender<()>,
    cancel_mining: mpsc::Sender<CancelLatch>,
    tx_sharing: mpsc::Sender<BlockTx>,
    shut: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Worker {
    /// Builds the worker, registers its signals with the node, reconciles
    /// with the network once, then spawns the long-running tasks. The
    /// mining task is chosen by the configured consensus scheme.
    pub async fn run(node: Node) -> Arc<Worker> {
        let (start_tx, start_rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let (share_tx, share_rx) = mpsc::channel(MAX_TX_SHARE_REQUESTS);

        let worker = Arc::new(Worker {
            node: node.clone(),
            client: PeerClient::new(),
            start_mining: start_tx,
            cancel_mining: cancel_tx,
            tx_sharing: share_tx,
            shut: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        });

        let signals: Arc<dyn WorkerSignals> = worker.clone();
        node.register_worker(signals);

        // The node must catch up with the network before any task runs.
        worker.sync_with_peers().await;

        let mining_task = match node.consensus() {
            Consensus::Pow => tokio::spawn(pow_task(worker.clone(), start_rx, cancel_rx)),
            Consensus::Poa => tokio::spawn(poa_task(worker.clone(), cancel_rx)),
        };

        let mut handles = worker.handles.lock();
        handles.push(tokio::spawn(peer_task(worker.clone())));
        handles.push(mining_task);
        handles.push(tokio::spawn(share_task(worker.clone(), share_rx)));
        drop(handles);

        worker
    }

    /// Stops every task and waits for them to exit. Any in-flight mining
    /// round is cancelled first.
    pub async fn shutdown(&self) {
        info!("worker shutdown started");
        self.signal_cancel_mining().release();
        self.shut.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!("worker shutdown completed");
    }

    // ---------------------------------------------------------------------
    // Sync

    async fn sync_with_peers(&self) {
        debug!("sync started");
        for peer in self.node.known_external_peers() {
            let status = match self.client.status(&peer).await {
                Ok(status) => status,
                Err(err) => {
                    warn!(peer = %peer, error = %err, "peer status failed during sync");
                    continue;
                }
            };
            self.merge_peers(status.known_peers);

            match self.client.mempool(&peer).await {
                Ok(pool) => {
                    for tx in pool {
                        let sig = tx.signed.signature_hex();
                        debug!(peer = %peer, sig = &sig[..18], "pulled mempool transaction");
                        self.node.upsert_mempool(tx);
                    }
                }
                Err(err) => warn!(peer = %peer, error = %err, "peer mempool failed during sync"),
            }

            if status.latest_block_number > self.node.latest_block().header.number {
                if let Err(err) = self.pull_peer_blocks(&peer).await {
                    warn!(peer = %peer, error = %err, "peer block pull failed during sync");
                }
            }
        }
        self.announce_to_peers().await;
        debug!("sync completed");
    }

    async fn pull_peer_blocks(&self, peer: &Peer) -> ChainResult<()> {
        let from = self.node.latest_block().header.number + 1;
        let blocks = self.client.blocks_from(peer, from).await?;
        debug!(peer = %peer, count = blocks.len(), from, "pulled peer blocks");
        for data in blocks {
            self.node.process_proposed_block(&Block::from(data))?;
        }
        Ok(())
    }

    fn merge_peers(&self, peers: Vec<Peer>) {
        for peer in peers {
            if self.node.add_known_peer(peer.clone()) {
                debug!(peer = %peer, "discovered peer");
            }
        }
    }

    async fn announce_to_peers(&self) {
        let me = Peer::new(self.node.host().to_string());
        for peer in self.node.known_external_peers() {
            if let Err(err) = self.client.announce(&peer, &me).await {
                debug!(peer = %peer, error = %err, "availability announcement failed");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Peer maintenance

    async fn refresh_peers(&self) {
        debug!("peer refresh started");
        for peer in self.node.known_external_peers() {
            match self.client.status(&peer).await {
                Ok(status) => self.merge_peers(status.known_peers),
                Err(err) => {
                    warn!(peer = %peer, error = %err, "peer unreachable, dropping");
                    self.node.remove_known_peer(&peer);
                }
            }
        }
        self.announce_to_peers().await;
        debug!("peer refresh completed");
    }

    // ---------------------------------------------------------------------
    // Mining

    /// One mining round: mine, gossip the won block, and honor any cancel
    /// that arrived while mining. Re-signals itself when work remains.
    async fn run_mining_round(&self, cancel_rx: &mut mpsc::Receiver<CancelLatch>) {
        if !self.node.is_mining_allowed() {
            debug!("mining disallowed, skipping round");
            return;
        }
        if self.node.mempool_count() == 0 {
            debug!("mempool empty, skipping round");
            return;
        }

        // Cancels left over from a round that already ended must not abort
        // this one.
        while cancel_rx.try_recv().is_ok() {
            debug!("drained stale cancel signal");
        }

        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            async move {
                let latch = tokio::select! {
                    maybe = cancel_rx.recv() => maybe,
                    _ = token.cancelled() => None,
                };
                token.cancel();
                latch
            }
        };

        let miner = {
            let token = token.clone();
            let node = self.node.clone();
            async move {
                let result = node.mine_new_block(&token).await;
                token.cancel();
                result
            }
        };

        let (latch, result) = tokio::join!(canceller, miner);

        match result {
            Ok(block) => {
                info!(number = block.header.number, hash = %block.hash(), "mined block");
                self.send_block_to_peers(&block).await;
            }
            Err(ChainError::NoTransactions) => debug!("no transactions to mine"),
            Err(ChainError::Cancelled) => debug!("mining round cancelled"),
            Err(err) => warn!(error = %err, "mining round failed"),
        }

        // The canceller is mid-state-change; it must finish before another
        // round can observe the chain.
        if let Some(latch) = latch {
            debug!("waiting for canceller to release");
            let _ = latch.await;
            debug!("canceller released");
        }

        if self.node.mempool_count() > 0 {
            self.signal_start_mining();
        }
    }

    async fn send_block_to_peers(&self, block: &Block) {
        let data = BlockData::from(block);
        for peer in self.node.known_external_peers() {
            match self.client.propose_block(&peer, &data).await {
                Ok(()) => debug!(peer = %peer, "block proposed"),
                Err(err) => warn!(peer = %peer, error = %err, "block proposal failed"),
            }
        }
    }

    /// Deterministic leader election for proof-of-authority: FNV-1a of the
    /// latest block hash indexes into the sorted list of all known hosts,
    /// this node included. Every honest node therefore picks the same
    /// leader for the same chain tip.
    fn elected_leader(&self) -> Option<String> {
        let mut hosts: Vec<String> = self
            .node
            .known_peers_with_self()
            .into_iter()
            .map(|peer| peer.host)
            .collect();
        if hosts.is_empty() {
            return None;
        }
        hosts.sort();
        let hash = fnv1a32(self.node.latest_block().hash().as_bytes());
        let index = (hash as usize) % hosts.len();
        Some(hosts[index].clone())
    }

    // ---------------------------------------------------------------------
    // Gossip

    async fn share_tx(&self, tx: BlockTx) {
        for peer in self.node.known_external_peers() {
            match self.client.submit_tx(&peer, &tx).await {
                Ok(()) => debug!(peer = %peer, tx = %tx, "transaction shared"),
                Err(err) => warn!(peer = %peer, error = %err, "transaction share failed"),
            }
        }
    }
}

#[async_trait]
impl WorkerSignals for Worker {
    async fn sync(&self) {
        self.sync_with_peers().await;
    }

    fn signal_start_mining(&self) {
        if !self.node.is_mining_allowed() {
            debug!("mining disabled, start signal dropped");
            return;
        }
        // A pending signal already guarantees a round will run.
        let _ = self.start_mining.try_send(());
    }

    fn signal_cancel_mining(&self) -> CancelGuard {
        let (latch_tx, latch_rx) = oneshot::channel();
        match self.cancel_mining.try_send(latch_rx) {
            Ok(()) => CancelGuard::new(latch_tx),
            // A cancel is already pending; that one will stop the round.
            Err(_) => CancelGuard::noop(),
        }
    }

    fn signal_share_tx(&self, tx: BlockTx) {
        if self.tx_sharing.try_send(tx).is_err() {
            warn!("share queue full, transaction not gossiped");
        }
    }
}

async fn peer_task(worker: Arc<Worker>) {
    debug!("peer task started");
    let mut ticker = time::interval(PEER_UPDATE_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => worker.refresh_peers().await,
            _ = worker.shut.cancelled() => {
                debug!("peer task stopped");
                return;
            }
        }
    }
}

async fn pow_task(
    worker: Arc<Worker>,
    mut start_rx: mpsc::Receiver<()>,
    mut cancel_rx: mpsc::Receiver<CancelLatch>,
) {
    debug!("mining task started");
    loop {
        tokio::select! {
            signal = start_rx.recv() => {
                if signal.is_none() {
                    return;
                }
                worker.run_mining_round(&mut cancel_rx).await;
            }
            _ = worker.shut.cancelled() => {
                debug!("mining task stopped");
                return;
            }
        }
    }
}

async fn poa_task(worker: Arc<Worker>, mut cancel_rx: mpsc::Receiver<CancelLatch>) {
    debug!("poa task started");
    let mut ticker = time::interval(POA_CYCLE);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match worker.elected_leader() {
                    Some(leader) if leader == worker.node.host() => {
                        debug!("elected leader for this cycle");
                        worker.run_mining_round(&mut cancel_rx).await;
                    }
                    Some(leader) => debug!(leader = %leader, "not elected this cycle"),
                    None => debug!("no hosts available for election"),
                }
            }
            _ = worker.shut.cancelled() => {
                debug!("poa task stopped");
                return;
            }
        }
    }
}

async fn share_task(worker: Arc<Worker>, mut share_rx: mpsc::Receiver<BlockTx>) {
    debug!("gossip task started");
    loop {
        tokio::select! {
            tx = share_rx.recv() => {
                let Some(tx) = tx else { return };
                worker.share_tx(tx).await;
            }
            _ = worker.shut.cancelled() => {
                debug!("gossip task stopped");
                return;
            }
        }
    }
}

fn fnv1a32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in data {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
