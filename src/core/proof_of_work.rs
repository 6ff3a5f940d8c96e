use crate::core::block::{Block, BlockTemplate};
use crate::core::validation::{compute_hash, meets_difficulty, Anchor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One hash computed during the search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub nonce: u64,
    pub hash: String,
}

/// Stops a [`MiningJob`] from another task.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Resumable proof-of-work search for a single block.
///
/// Height and parent hash are fixed from the anchor when the job is created;
/// only the nonce moves. Iterating the job yields one [`Attempt`] per nonce,
/// starting at zero. The job's state lives outside any future, so dropping an
/// in-flight [`MiningJob::search`] loses nothing but the current poll.
#[derive(Debug)]
pub struct MiningJob {
    template: BlockTemplate,
    next_nonce: u64,
    solved: bool,
    cancel: CancelHandle,
}

impl MiningJob {
    pub fn new(anchor: &Anchor, data: &str, mined_by: &str, timestamp: i64) -> MiningJob {
        MiningJob {
            template: BlockTemplate {
                height: anchor.next_height(),
                data: data.to_string(),
                previous_hash: anchor.link_hash().to_string(),
                nonce: 0,
                timestamp,
                mined_by: mined_by.to_string(),
            },
            next_nonce: 0,
            solved: false,
            cancel: CancelHandle::default(),
        }
    }

    pub fn get_height(&self) -> u64 {
        self.template.height
    }

    pub fn get_previous_hash(&self) -> &str {
        &self.template.previous_hash
    }

    pub fn get_data(&self) -> &str {
        &self.template.data
    }

    /// Number of nonces tried so far
    pub fn attempts(&self) -> u64 {
        self.next_nonce
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Try nonces until one satisfies the difficulty predicate, handing
    /// control back to the scheduler before every attempt.
    ///
    /// Returns `None` once the job is cancelled.
    pub async fn search(&mut self) -> Option<Block> {
        loop {
            tokio::task::yield_now().await;
            let attempt = self.next()?;
            if meets_difficulty(&attempt.hash) {
                return Some(self.seal(attempt));
            }
        }
    }

    /// Blocking variant of [`MiningJob::search`]
    pub fn run_to_completion(mut self) -> Option<Block> {
        let attempt = self.by_ref().find(|attempt| meets_difficulty(&attempt.hash))?;
        Some(self.seal(attempt))
    }

    fn seal(&mut self, attempt: Attempt) -> Block {
        self.solved = true;
        let mut template = self.template.clone();
        template.nonce = attempt.nonce;
        template.seal(attempt.hash)
    }
}

impl Iterator for MiningJob {
    type Item = Attempt;

    fn next(&mut self) -> Option<Attempt> {
        if self.solved || self.is_cancelled() {
            return None;
        }
        let nonce = self.next_nonce;
        self.next_nonce = nonce.checked_add(1)?;
        self.template.nonce = nonce;
        Some(Attempt {
            nonce,
            hash: compute_hash(&self.template),
        })
    }
}

/// Builds mining jobs on behalf of one node.
#[derive(Debug, Clone)]
pub struct Miner {
    node_id: String,
}

impl Miner {
    pub fn new(node_id: &str) -> Miner {
        Miner {
            node_id: node_id.to_string(),
        }
    }

    /// A job for `data` on top of `anchor`, credited to `origin`
    pub fn job(&self, anchor: &Anchor, data: &str, origin: &str, timestamp: i64) -> MiningJob {
        MiningJob::new(anchor, data, origin, timestamp)
    }

    /// Mine `data` on top of `anchor` for this miner's own node
    pub async fn mine(&self, anchor: &Anchor, data: &str, timestamp: i64) -> Option<Block> {
        self.job(anchor, data, &self.node_id, timestamp).search().await
    }
}
