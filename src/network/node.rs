//! A node owns its chain log, its mining-request channel and one Connection per
//! peer it listens to. Peers never touch each other's state: every cross-node
//! effect is a node reading a peer's feeds and then mutating its own chain.

use crate::config::NodeConfig;
use crate::core::{validate_chain, Block, CancelHandle, ChainFeed, ChainLog, Miner};
use crate::error::{BlockchainError, Result};
use crate::network::connection::{ChainFollower, Connection};
use crate::network::observer::NodeObserver;
use crate::network::request::{Delivery, MiningRequest, RequestChannel, RequestFeed};
use crate::utils::current_timestamp;
use log::{debug, warn};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

/// Id in the `node<number>` form used when the caller does not pick one
pub fn random_node_id() -> String {
    format!("node{}", rand::thread_rng().gen_range(0..10_000_000))
}

struct NodeInner {
    id: String,
    chain: ChainLog,
    requests: RequestChannel,
    miner: Miner,
    connections: Mutex<HashMap<String, Connection>>,
    peers: watch::Sender<Vec<String>>,
    next_serial: AtomicU64,
    listening: AtomicBool,
    shutdown: watch::Sender<bool>,
    active_job: Mutex<Option<CancelHandle>>,
    config: NodeConfig,
}

/// Handle to a node. Clones share the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    fn new(id: &str, config: NodeConfig) -> Node {
        let (peers, _) = watch::channel(vec![]);
        let (shutdown, _) = watch::channel(false);
        Node {
            inner: Arc::new(NodeInner {
                id: id.to_string(),
                chain: ChainLog::new(),
                requests: RequestChannel::new(),
                miner: Miner::new(id),
                connections: Mutex::new(HashMap::new()),
                peers,
                next_serial: AtomicU64::new(0),
                listening: AtomicBool::new(false),
                shutdown,
                active_job: Mutex::new(None),
                config,
            }),
        }
    }

    /// Start a new chain: mine and append a genesis block, then listen.
    pub async fn create(id: &str) -> Result<Node> {
        Self::create_with(id, NodeConfig::default()).await
    }

    pub async fn create_with(id: &str, config: NodeConfig) -> Result<Node> {
        let node = Node::new(id, config);
        let payload = node.inner.config.genesis_payload.clone();
        let genesis = node.mine(&payload).await?;
        node.inner.append(genesis)?;
        node.listen();
        Ok(node)
    }

    /// Join the network through `peer`. Spawns the connection's forwarding
    /// tasks on the current tokio runtime.
    ///
    /// The peer's whole chain is replayed and validated from the sentinel
    /// before any wiring happens; on failure neither node is changed and the
    /// new node is torn down.
    pub async fn connect(id: &str, peer: &Node) -> Result<Node> {
        Self::connect_with(id, peer, NodeConfig::default()).await
    }

    pub async fn connect_with(id: &str, peer: &Node, config: NodeConfig) -> Result<Node> {
        let node = Node::new(id, config);
        if let Err(error) = validate_chain(&peer.blocks()) {
            node.inner
                .observer()
                .validation_failed(&node.inner.id, peer.id(), &error);
            node.shutdown();
            return Err(BlockchainError::InvalidPeerChain {
                peer: peer.id().to_string(),
                reason: error.to_string(),
            });
        }
        peer.attach(&node);
        node.attach(peer);
        node.listen();
        Ok(node)
    }

    /// Rebuild a node from blocks read back from storage.
    ///
    /// The blocks must link from genesis; an empty history starts a fresh
    /// chain like [`Node::create_with`].
    pub async fn restore(id: &str, blocks: Vec<Block>, config: NodeConfig) -> Result<Node> {
        let node = Node::new(id, config);
        for block in blocks {
            node.inner.chain.replay(block)?;
        }
        if node.inner.chain.is_empty() {
            let payload = node.inner.config.genesis_payload.clone();
            let genesis = node.mine(&payload).await?;
            node.inner.append(genesis)?;
        }
        node.listen();
        Ok(node)
    }

    /// Wire this node to listen to `peer`'s requests and chain.
    fn attach(&self, peer: &Node) {
        let inner = &self.inner;
        let peer_id = peer.id().to_string();
        let serial = inner.next_serial.fetch_add(1, Ordering::Relaxed);
        let requests = peer.inner.requests.subscribe();
        let chain = peer.inner.chain.subscribe();
        let weak = Arc::downgrade(inner);

        let replaced = {
            let mut connections = inner.connections();
            let request_forwarding =
                tokio::spawn(forward_requests(weak.clone(), peer_id.clone(), requests));
            let chain_forwarding =
                tokio::spawn(follow_chain(weak, peer_id.clone(), serial, chain));
            connections.insert(
                peer_id.clone(),
                Connection::new(&peer_id, serial, request_forwarding, chain_forwarding),
            )
        };
        drop(replaced);

        inner.publish_peers();
        inner.observer().peer_connected(&inner.id, &peer_id);
    }

    /// Start consuming this node's mining requests. Idempotent.
    pub fn listen(&self) {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let feed = self.inner.requests.subscribe();
        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(listen_loop(Arc::downgrade(&self.inner), feed, shutdown));
    }

    /// Ask the network to mine `payload` on top of this node's chain
    pub fn process(&self, payload: &str) -> Result<()> {
        if *self.inner.shutdown.borrow() {
            return Err(BlockchainError::Node(format!(
                "{} has shut down",
                self.inner.id
            )));
        }
        let request =
            MiningRequest::now(payload, &self.inner.id)?.on_tip(self.inner.chain.height());
        debug!("{}: submitted '{payload}'", self.inner.id);
        self.inner.requests.publish(request);
        Ok(())
    }

    pub fn submit(&self, payload: &str) -> Result<()> {
        self.process(payload)
    }

    /// Mine `payload` on the current tail without appending it
    pub async fn mine(&self, payload: &str) -> Result<Block> {
        let inner = &self.inner;
        let anchor = inner.chain.tail();
        let timestamp = current_timestamp()?;
        let mut shutdown = inner.shutdown.subscribe();

        let found = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => None,
            found = inner.miner.mine(&anchor, payload, timestamp) => found,
        };
        let block = found.ok_or_else(|| {
            BlockchainError::Node(format!("{}: mining '{payload}' was cancelled", inner.id))
        })?;
        inner.observer().block_mined(&inner.id, &block, block.get_nonce() + 1);
        Ok(block)
    }

    /// Stop listening to `peer_id`. No-op when not connected.
    pub fn disconnect(&self, peer_id: &str) {
        self.inner.disconnect(peer_id);
    }

    /// Disconnect from a peer whose chain failed validation and return the
    /// resulting condition
    pub fn invalidate(&self, peer_id: &str) -> BlockchainError {
        self.inner.invalidate(peer_id)
    }

    /// Stop listening and tear down every connection. Peers that follow this
    /// node see its feeds end and drop their side.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.send_replace(true) {
            return;
        }
        inner.set_active_job(None);
        let dropped: Vec<Connection> = inner.connections().drain().map(|(_, c)| c).collect();
        inner.publish_peers();
        for connection in dropped {
            inner
                .observer()
                .peer_disconnected(&inner.id, connection.get_peer_id());
        }
        inner.chain.close_feeds();
        inner.requests.close();
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.inner.chain.blocks()
    }

    pub fn last_block(&self) -> Option<Block> {
        self.inner.chain.last_block()
    }

    /// Height of the tail, `None` for an empty chain
    pub fn height(&self) -> Option<u64> {
        self.inner.chain.height()
    }

    /// Every block appended so far, then every later one
    pub fn chain_feed(&self) -> ChainFeed {
        self.inner.chain.subscribe()
    }

    /// Live set of peer ids this node listens to
    pub fn connections(&self) -> watch::Receiver<Vec<String>> {
        self.inner.peers.subscribe()
    }

    pub fn peer_ids(&self) -> Vec<String> {
        self.inner.peers.borrow().clone()
    }

    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.inner.connections().contains_key(peer_id)
    }

    /// Last request accepted on this node's channel
    pub fn latest_request(&self) -> Option<MiningRequest> {
        self.inner.requests.latest()
    }

    /// Resolves once the chain reaches `height`
    pub async fn wait_for_height(&self, height: u64) {
        let mut length = self.inner.chain.watch_len();
        let _ = length.wait_for(|len| *len as u64 > height).await;
    }
}

impl NodeInner {
    fn observer(&self) -> &dyn NodeObserver {
        self.config.observer.as_ref()
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<String, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_active_job(&self, job: Option<CancelHandle>) {
        let mut active = self.active_job.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.cancel();
        }
        *active = job;
    }

    fn publish_peers(&self) {
        let mut ids: Vec<String> = self.connections().keys().cloned().collect();
        ids.sort();
        self.peers.send_replace(ids);
    }

    fn append(&self, block: Block) -> Result<()> {
        match self.chain.append(block.clone()) {
            Ok(()) => {
                self.observer().block_appended(&self.id, &block);
                Ok(())
            }
            Err(error) => {
                self.observer().block_rejected(&self.id, &block, &error);
                Err(error)
            }
        }
    }

    fn disconnect(&self, peer_id: &str) {
        let removed = self.connections().remove(peer_id);
        if let Some(connection) = removed {
            self.publish_peers();
            self.observer().peer_disconnected(&self.id, peer_id);
            drop(connection);
        }
    }

    fn invalidate(&self, peer_id: &str) -> BlockchainError {
        self.disconnect(peer_id);
        BlockchainError::PeerDisconnected {
            peer: peer_id.to_string(),
        }
    }

    /// Remove the connection to `peer_id` unless it was replaced since
    fn drop_connection(&self, peer_id: &str, serial: u64) {
        let current = self
            .connections()
            .get(peer_id)
            .map(Connection::get_serial);
        if current == Some(serial) {
            self.disconnect(peer_id);
        }
    }

    /// Mine one request to completion or until something ends it early.
    ///
    /// A forwarded request arriving meanwhile is newer than anything this node
    /// accepted, so it replaces the current job and everything queued. See
    /// [`supersedes`] for local requests. Returns `false` when the node stops.
    async fn work(
        &self,
        mut delivery: Delivery,
        feed: &mut RequestFeed,
        queue: &mut VecDeque<Delivery>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut tail = self.chain.watch_len();
        let mut peers = self.peers.subscribe();

        'restart: loop {
            let request = delivery.request.clone();
            let anchor = self.chain.tail();
            // already adopted from a peer that mined it first, or a forwarded
            // request that lost to a block mined after it was submitted
            let stale = delivery.via.is_some() && request.is_behind(anchor.height());
            if stale || anchor.block().is_some_and(|last| satisfies(last, &request)) {
                self.set_active_job(None);
                self.observer().job_abandoned(&self.id, &request);
                return true;
            }
            // every node racing on the same request seals the same template
            let mut job = self.miner.job(
                &anchor,
                request.get_payload(),
                request.get_origin_id(),
                request.get_submitted_at(),
            );
            self.set_active_job(Some(job.cancel_handle()));
            self.observer()
                .mining_started(&self.id, &request, job.get_height());
            tail.borrow_and_update();
            peers.borrow_and_update();

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => {
                        self.set_active_job(None);
                        return false;
                    }
                    next = feed.recv() => match next {
                        None => {
                            self.set_active_job(None);
                            return false;
                        }
                        Some(next) if next.request.is_empty() => {}
                        Some(next) if supersedes(&next, &delivery) => {
                            for stale in std::iter::once(&delivery).chain(queue.iter()) {
                                self.observer()
                                    .request_superseded(&self.id, &stale.request, &next.request);
                            }
                            queue.clear();
                            delivery = next;
                            continue 'restart;
                        }
                        Some(next) => queue.push_back(next),
                    },
                    changed = tail.changed() => {
                        let stale = changed.is_err()
                            || self.chain.tail().link_hash() != job.get_previous_hash();
                        if stale {
                            self.set_active_job(None);
                            self.observer().job_abandoned(&self.id, &request);
                            return true;
                        }
                    }
                    changed = peers.changed() => {
                        let feeder_gone = match &delivery.via {
                            Some(via) => !peers.borrow_and_update().contains(via),
                            None => false,
                        };
                        if changed.is_err() || feeder_gone {
                            self.set_active_job(None);
                            self.observer().job_abandoned(&self.id, &request);
                            return true;
                        }
                    }
                    found = job.search() => {
                        *self.active_job.lock().unwrap_or_else(PoisonError::into_inner) = None;
                        match found {
                            Some(block) => {
                                self.observer().block_mined(&self.id, &block, job.attempts());
                                // rejection is reported by append
                                let _ = self.append(block);
                            }
                            None => self.observer().job_abandoned(&self.id, &request),
                        }
                        return true;
                    }
                }
            }
        }
    }
}

/// A forwarded request always replaces the job in flight. A local one only
/// replaces a forwarded job it is newer than; otherwise it queues.
fn supersedes(next: &Delivery, current: &Delivery) -> bool {
    next.via.is_some()
        || (current.via.is_some()
            && next.request.get_submitted_at() > current.request.get_submitted_at())
}

fn satisfies(block: &Block, request: &MiningRequest) -> bool {
    block.get_data() == request.get_payload()
        && block.get_mined_by() == request.get_origin_id()
        && block.get_timestamp() == request.get_submitted_at()
}

async fn listen_loop(
    node: Weak<NodeInner>,
    mut feed: RequestFeed,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut queue: VecDeque<Delivery> = VecDeque::new();
    loop {
        let delivery = match queue.pop_front() {
            Some(delivery) => delivery,
            None => tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => return,
                next = feed.recv() => match next {
                    Some(delivery) => delivery,
                    None => return,
                },
            },
        };
        if delivery.request.is_empty() {
            continue;
        }
        let Some(node) = node.upgrade() else {
            return;
        };
        if !node.work(delivery, &mut feed, &mut queue, &mut shutdown).await {
            return;
        }
    }
}

/// Adopt `peer_id`'s requests that are newer than ours and not our own
async fn forward_requests(node: Weak<NodeInner>, peer_id: String, mut feed: RequestFeed) {
    while let Some(delivery) = feed.recv().await {
        let Some(node) = node.upgrade() else {
            return;
        };
        if delivery.request.is_empty() {
            continue;
        }
        if node
            .requests
            .publish_if_newer(delivery.request, &node.id, &peer_id)
        {
            debug!("{}: adopted request forwarded by {peer_id}", node.id);
        }
    }
}

/// Validate `peer_id`'s chain as it streams in and adopt taller blocks
async fn follow_chain(node: Weak<NodeInner>, peer_id: String, serial: u64, mut feed: ChainFeed) {
    let mut follower = ChainFollower::new();
    while let Some(block) = feed.recv().await {
        let Some(node) = node.upgrade() else {
            return;
        };
        match follower.observe(block, node.chain.height()) {
            Ok(Some(block)) => {
                // a fork is reported by append and leaves the link intact
                let _ = node.append(block);
            }
            Ok(None) => {}
            Err(error) => {
                node.observer().validation_failed(&node.id, &peer_id, &error);
                let condition = node.invalidate(&peer_id);
                warn!("{}: {condition}", node.id);
                return;
            }
        }
    }
    // peer shut down
    if let Some(node) = node.upgrade() {
        node.drop_connection(&peer_id, serial);
    }
}
