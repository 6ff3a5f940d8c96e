//! Per-node append-only chain with replay-then-live fan-out.
//!
//! Appends and subscriptions both take the write lock, so a new subscriber
//! receives the existing blocks followed by exactly the blocks appended after
//! it, with nothing skipped or repeated.

use crate::core::block::Block;
use crate::core::validation::{check_block, validate_parent_linkage, Anchor};
use crate::error::{BlockchainError, Result};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, watch};

struct ChainState {
    blocks: Vec<Block>,
    subscribers: Vec<mpsc::UnboundedSender<Block>>,
}

impl ChainState {
    fn tail(&self) -> Anchor {
        self.blocks.last().cloned().into()
    }
}

pub struct ChainLog {
    inner: RwLock<ChainState>,
    length: watch::Sender<usize>,
}

impl Default for ChainLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainLog {
    pub fn new() -> ChainLog {
        let (length, _) = watch::channel(0);
        ChainLog {
            inner: RwLock::new(ChainState {
                blocks: vec![],
                subscribers: vec![],
            }),
            length,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ChainState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate `block` against the current tail and append it
    pub fn append(&self, block: Block) -> Result<()> {
        let mut state = self.write();
        check_block(&state.tail(), &block)?;
        self.push(&mut state, block);
        Ok(())
    }

    /// Append a block read back from local storage.
    ///
    /// Only parent linkage is checked; content was validated when the block
    /// was first appended.
    pub fn replay(&self, block: Block) -> Result<()> {
        let mut state = self.write();
        if !validate_parent_linkage(&state.tail(), &block) {
            return Err(BlockchainError::Validation(format!(
                "stored block {} at height {} does not link to the chain",
                block.get_hash(),
                block.get_height()
            )));
        }
        self.push(&mut state, block);
        Ok(())
    }

    fn push(&self, state: &mut ChainState, block: Block) {
        state
            .subscribers
            .retain(|subscriber| subscriber.send(block.clone()).is_ok());
        state.blocks.push(block);
        self.length.send_replace(state.blocks.len());
    }

    /// Feed of every block so far, then every block appended later
    pub fn subscribe(&self) -> ChainFeed {
        let mut state = self.write();
        let (tx, rx) = mpsc::unbounded_channel();
        for block in &state.blocks {
            // receiver is still in scope, send cannot fail
            let _ = tx.send(block.clone());
        }
        state.subscribers.push(tx);
        ChainFeed { rx }
    }

    /// Notified with the new length after every append
    pub fn watch_len(&self) -> watch::Receiver<usize> {
        self.length.subscribe()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read().blocks.clone()
    }

    pub fn last_block(&self) -> Option<Block> {
        self.read().blocks.last().cloned()
    }

    pub fn tail(&self) -> Anchor {
        self.read().tail()
    }

    pub fn height(&self) -> Option<u64> {
        self.read().blocks.last().map(Block::get_height)
    }

    pub fn len(&self) -> usize {
        self.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().blocks.is_empty()
    }

    /// Drop every live subscriber; their feeds end after draining
    pub fn close_feeds(&self) {
        self.write().subscribers.clear();
    }
}

/// Ordered stream of blocks from one [`ChainLog`]
pub struct ChainFeed {
    rx: mpsc::UnboundedReceiver<Block>,
}

impl ChainFeed {
    /// Next block, or `None` once the chain log is gone
    pub async fn recv(&mut self) -> Option<Block> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Block> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::proof_of_work::MiningJob;

    fn mine_on(log: &ChainLog, data: &str) -> Block {
        MiningJob::new(&log.tail(), data, "node1", 0)
            .run_to_completion()
            .unwrap()
    }

    #[test]
    fn test_append_enforces_linkage() {
        let log = ChainLog::new();
        let genesis = mine_on(&log, "Genesis");
        log.append(genesis.clone()).unwrap();

        // mined against the sentinel, so it no longer links
        let stale = MiningJob::new(&Anchor::Sentinel, "again", "node1", 0)
            .run_to_completion()
            .unwrap();
        assert!(log.append(stale).is_err());
        assert!(log.append(genesis).is_err());
        assert_eq!(log.len(), 1);
        assert_eq!(log.height(), Some(0));
    }

    #[test]
    fn test_subscriber_gets_history_then_live_blocks() {
        let log = ChainLog::new();
        let genesis = mine_on(&log, "Genesis");
        log.append(genesis.clone()).unwrap();

        let mut feed = log.subscribe();
        let next = mine_on(&log, "x");
        log.append(next.clone()).unwrap();

        assert_eq!(feed.try_recv(), Some(genesis));
        assert_eq!(feed.try_recv(), Some(next));
        assert_eq!(feed.try_recv(), None);
    }

    #[test]
    fn test_replay_skips_content_checks_but_not_linkage() {
        let source = ChainLog::new();
        let genesis = mine_on(&source, "Genesis");
        let mut forged = genesis.template();
        forged.data = "tampered".to_string();
        let forged = forged.seal(genesis.get_hash().to_string());

        let log = ChainLog::new();
        log.replay(forged.clone()).unwrap();
        assert_eq!(log.last_block(), Some(forged));

        let orphan = MiningJob::new(&Anchor::Sentinel, "orphan", "node1", 0)
            .run_to_completion()
            .unwrap();
        assert!(log.replay(orphan).is_err());
    }

    #[tokio::test]
    async fn test_watch_len_tracks_appends() {
        let log = ChainLog::new();
        let mut len = log.watch_len();
        log.append(mine_on(&log, "Genesis")).unwrap();

        len.changed().await.unwrap();
        assert_eq!(*len.borrow(), 1);
    }
}
