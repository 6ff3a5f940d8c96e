//! Hashing and validation
//!
//! Pure functions over blocks. Every block that enters any chain log, mined
//! locally or received from a peer, passes [`validate_block`] first.

use crate::core::block::{Block, BlockTemplate, GENESIS_PREVIOUS_HASH};
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_hex;

/// A hash satisfies the proof-of-work when its hex form starts with this
pub const DIFFICULTY_PREFIX: &str = "00";

/// The block a candidate is validated against.
///
/// `Sentinel` stands in for the "block before genesis" (height -1). It has no
/// hash of its own and never leaves the validation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    Sentinel,
    Block(Block),
}

impl Anchor {
    /// The value a child's `previous_hash` must equal
    pub fn link_hash(&self) -> &str {
        match self {
            Anchor::Sentinel => GENESIS_PREVIOUS_HASH,
            Anchor::Block(block) => block.get_hash(),
        }
    }

    /// Height the next block must carry
    pub fn next_height(&self) -> u64 {
        match self {
            Anchor::Sentinel => 0,
            Anchor::Block(block) => block.get_height() + 1,
        }
    }

    pub fn height(&self) -> Option<u64> {
        self.block().map(Block::get_height)
    }

    pub fn block(&self) -> Option<&Block> {
        match self {
            Anchor::Sentinel => None,
            Anchor::Block(block) => Some(block),
        }
    }
}

impl From<Option<Block>> for Anchor {
    fn from(block: Option<Block>) -> Self {
        block.map_or(Anchor::Sentinel, Anchor::Block)
    }
}

/// SHA-256 over the canonical encoding of every field except the hash
pub fn compute_hash(template: &BlockTemplate) -> String {
    let mut data = Vec::with_capacity(128);
    template.write_canonical(&mut data);
    sha256_hex(data.as_slice())
}

pub fn meets_difficulty(hash: &str) -> bool {
    hash.starts_with(DIFFICULTY_PREFIX)
}

pub fn validate_hash_integrity(block: &Block) -> bool {
    block.get_hash() == block.recompute_hash()
}

pub fn validate_parent_linkage(last: &Anchor, block: &Block) -> bool {
    last.link_hash() == block.get_previous_hash() && last.next_height() == block.get_height()
}

/// Like [`validate_block`] but says which check failed
pub fn check_block(last: &Anchor, block: &Block) -> Result<()> {
    if !validate_parent_linkage(last, block) {
        return Err(BlockchainError::Validation(format!(
            "block {} at height {} does not extend {} at height {}",
            block.get_hash(),
            block.get_height(),
            last.link_hash(),
            last.next_height() as i64 - 1
        )));
    }
    if !meets_difficulty(block.get_hash()) {
        return Err(BlockchainError::Validation(format!(
            "block {} at height {} misses the difficulty target",
            block.get_hash(),
            block.get_height()
        )));
    }
    if !validate_hash_integrity(block) {
        return Err(BlockchainError::Validation(format!(
            "block {} at height {} does not match its contents",
            block.get_hash(),
            block.get_height()
        )));
    }
    Ok(())
}

pub fn validate_block(last: &Anchor, block: &Block) -> bool {
    check_block(last, block).is_ok()
}

/// One step of a whole-chain fold: the candidate if it validly extends
/// `last`, `None` once anything has failed.
pub fn validate_chain_step(last: Option<&Anchor>, candidate: Option<Block>) -> Option<Block> {
    let last = last?;
    let candidate = candidate?;
    validate_block(last, &candidate).then_some(candidate)
}

/// Fold [`check_block`] over a full chain starting at the sentinel.
///
/// Returns the anchor for the last block on success.
pub fn validate_chain<'a, I>(blocks: I) -> Result<Anchor>
where
    I: IntoIterator<Item = &'a Block>,
{
    blocks
        .into_iter()
        .try_fold(Anchor::Sentinel, |anchor, block| {
            check_block(&anchor, block)?;
            Ok(Anchor::Block(block.clone()))
        })
}
