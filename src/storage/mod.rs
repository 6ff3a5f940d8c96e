//! Chain persistence
//!
//! A node's chain is in-memory; a [`BlockStore`] is an optional sink fed from
//! the chain log and read back with [`crate::network::Node::restore`].

pub mod block_store;

pub use block_store::{persist_chain, BlockStore, MemoryBlockStore, SledBlockStore};
