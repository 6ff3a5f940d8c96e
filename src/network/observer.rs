//! Node lifecycle hook
//!
//! Every node reports the same small set of events (mining start and
//! success, appends, rejections, validation failures, connect and
//! disconnect) to one injectable [`NodeObserver`]. Nothing below that level
//! is reported.

use crate::core::Block;
use crate::error::BlockchainError;
use crate::network::request::MiningRequest;
use log::{info, warn};
use std::sync::{Mutex, PoisonError};

#[allow(unused_variables)]
pub trait NodeObserver: Send + Sync {
    fn mining_started(&self, node: &str, request: &MiningRequest, height: u64) {}
    fn block_mined(&self, node: &str, block: &Block, attempts: u64) {}
    fn block_appended(&self, node: &str, block: &Block) {}
    /// A candidate did not extend the node's own tail
    fn block_rejected(&self, node: &str, block: &Block, reason: &BlockchainError) {}
    fn request_superseded(&self, node: &str, superseded: &MiningRequest, by: &MiningRequest) {}
    /// The in-flight job lost its anchor or its feeding peer
    fn job_abandoned(&self, node: &str, request: &MiningRequest) {}
    fn validation_failed(&self, node: &str, peer: &str, error: &BlockchainError) {}
    fn peer_connected(&self, node: &str, peer: &str) {}
    fn peer_disconnected(&self, node: &str, peer: &str) {}
}

/// Default observer writing through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl NodeObserver for LogObserver {
    fn mining_started(&self, node: &str, request: &MiningRequest, height: u64) {
        info!(
            "{node}: mining '{}' from {} at height {height}",
            request.get_payload(),
            request.get_origin_id()
        );
    }

    fn block_mined(&self, node: &str, block: &Block, attempts: u64) {
        info!(
            "{node}: mined block {} at height {} after {attempts} attempts",
            block.get_hash(),
            block.get_height()
        );
    }

    fn block_appended(&self, node: &str, block: &Block) {
        info!(
            "{node}: appended block {} at height {}",
            block.get_hash(),
            block.get_height()
        );
    }

    fn block_rejected(&self, node: &str, block: &Block, reason: &BlockchainError) {
        warn!("{node}: rejected block {}: {reason}", block.get_hash());
    }

    fn request_superseded(&self, node: &str, superseded: &MiningRequest, by: &MiningRequest) {
        info!(
            "{node}: request '{}' superseded by '{}' from {}",
            superseded.get_payload(),
            by.get_payload(),
            by.get_origin_id()
        );
    }

    fn job_abandoned(&self, node: &str, request: &MiningRequest) {
        info!("{node}: abandoned mining '{}'", request.get_payload());
    }

    fn validation_failed(&self, node: &str, peer: &str, error: &BlockchainError) {
        warn!("{node}: chain from {peer} failed validation: {error}");
    }

    fn peer_connected(&self, node: &str, peer: &str) {
        info!("{node}: connected to {peer}");
    }

    fn peer_disconnected(&self, node: &str, peer: &str) {
        info!("{node}: disconnected from {peer}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    MiningStarted { node: String, payload: String, height: u64 },
    BlockMined { node: String, hash: String },
    BlockAppended { node: String, hash: String, height: u64 },
    BlockRejected { node: String, hash: String },
    RequestSuperseded { node: String, payload: String },
    JobAbandoned { node: String, payload: String },
    ValidationFailed { node: String, peer: String },
    PeerConnected { node: String, peer: String },
    PeerDisconnected { node: String, peer: String },
}

/// Keeps every event in memory, for tests and the simulation summary
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<NodeEvent>>,
}

impl EventLog {
    pub fn new() -> EventLog {
        EventLog::default()
    }

    fn record(&self, event: NodeEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<NodeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&NodeEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl NodeObserver for EventLog {
    fn mining_started(&self, node: &str, request: &MiningRequest, height: u64) {
        self.record(NodeEvent::MiningStarted {
            node: node.to_string(),
            payload: request.get_payload().to_string(),
            height,
        });
    }

    fn block_mined(&self, node: &str, block: &Block, _attempts: u64) {
        self.record(NodeEvent::BlockMined {
            node: node.to_string(),
            hash: block.get_hash().to_string(),
        });
    }

    fn block_appended(&self, node: &str, block: &Block) {
        self.record(NodeEvent::BlockAppended {
            node: node.to_string(),
            hash: block.get_hash().to_string(),
            height: block.get_height(),
        });
    }

    fn block_rejected(&self, node: &str, block: &Block, _reason: &BlockchainError) {
        self.record(NodeEvent::BlockRejected {
            node: node.to_string(),
            hash: block.get_hash().to_string(),
        });
    }

    fn request_superseded(&self, node: &str, superseded: &MiningRequest, _by: &MiningRequest) {
        self.record(NodeEvent::RequestSuperseded {
            node: node.to_string(),
            payload: superseded.get_payload().to_string(),
        });
    }

    fn job_abandoned(&self, node: &str, request: &MiningRequest) {
        self.record(NodeEvent::JobAbandoned {
            node: node.to_string(),
            payload: request.get_payload().to_string(),
        });
    }

    fn validation_failed(&self, node: &str, peer: &str, _error: &BlockchainError) {
        self.record(NodeEvent::ValidationFailed {
            node: node.to_string(),
            peer: peer.to_string(),
        });
    }

    fn peer_connected(&self, node: &str, peer: &str) {
        self.record(NodeEvent::PeerConnected {
            node: node.to_string(),
            peer: peer.to_string(),
        });
    }

    fn peer_disconnected(&self, node: &str, peer: &str) {
        self.record(NodeEvent::PeerDisconnected {
            node: node.to_string(),
            peer: peer.to_string(),
        });
    }
}
