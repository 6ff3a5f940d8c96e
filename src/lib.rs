//! # Peer Chain
//!
//! A small proof-of-work blockchain network simulated inside one process.
//! Every node keeps its own append-only chain, mines blocks for requests
//! submitted anywhere in the network, and validates whatever its peers send
//! before adopting it.
//!
//! ## Layout
//! - `core/`: blocks, hashing and validation, the resumable miner and the chain log
//! - `network/`: nodes, peer connections, mining-request channels and the observer hook
//! - `storage/`: optional block persistence (sled or in-memory)
//! - `config/`: process settings and per-node options
//! - `utils/`: digests, timestamps and binary encoding
//! - `cli/`: arguments for the demo binary
//!
//! ## Quick tour
//! 1. [`Node::create`] mines a genesis block.
//! 2. [`Node::connect`] validates a peer's whole chain and links the two nodes.
//! 3. [`Node::process`] submits a payload; every node races to mine it and
//!    the first valid block wins.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::{Config, NodeConfig, GLOBAL_CONFIG};
pub use core::{
    check_block, compute_hash, meets_difficulty, validate_block, validate_chain, Anchor, Block,
    BlockTemplate, ChainFeed, ChainLog, Miner, MiningJob, DIFFICULTY_PREFIX, GENESIS_PAYLOAD,
    GENESIS_PREVIOUS_HASH,
};
pub use error::{BlockchainError, Result};
pub use network::{
    random_node_id, EventLog, LogObserver, MiningRequest, Node, NodeEvent, NodeObserver,
};
pub use storage::{persist_chain, BlockStore, MemoryBlockStore, SledBlockStore};
pub use utils::{current_timestamp, sha256_digest, sha256_hex};
