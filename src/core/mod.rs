//! Core chain functionality
//!
//! Blocks, hashing and validation, proof-of-work search and the per-node
//! append-only chain log. Nothing in here knows about peers.

pub mod block;
pub mod chain_log;
pub mod proof_of_work;
pub mod validation;

pub use block::{Block, BlockTemplate, GENESIS_PAYLOAD, GENESIS_PREVIOUS_HASH};
pub use chain_log::{ChainFeed, ChainLog};
pub use proof_of_work::{Attempt, CancelHandle, Miner, MiningJob};
pub use validation::{
    check_block, compute_hash, meets_difficulty, validate_block, validate_chain,
    validate_chain_step, validate_hash_integrity, validate_parent_linkage, Anchor,
    DIFFICULTY_PREFIX,
};
