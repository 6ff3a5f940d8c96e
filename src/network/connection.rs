use crate::core::{check_block, Anchor, Block};
use crate::error::Result;
use tokio::task::JoinHandle;

/// One side of a link between two nodes: the two tasks through which this
/// node listens to `peer_id`. Dropping the connection stops both.
#[derive(Debug)]
pub struct Connection {
    peer_id: String,
    serial: u64,
    request_forwarding: JoinHandle<()>,
    chain_forwarding: JoinHandle<()>,
}

impl Connection {
    pub fn new(
        peer_id: &str,
        serial: u64,
        request_forwarding: JoinHandle<()>,
        chain_forwarding: JoinHandle<()>,
    ) -> Connection {
        Connection {
            peer_id: peer_id.to_string(),
            serial,
            request_forwarding,
            chain_forwarding,
        }
    }

    pub fn get_peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Distinguishes a reconnect from the link it replaced
    pub fn get_serial(&self) -> u64 {
        self.serial
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.request_forwarding.abort();
        self.chain_forwarding.abort();
    }
}

/// Validating view of a peer's chain as it streams in.
///
/// Consecutive re-deliveries of the same hash are ignored. Every other block
/// must extend the previous one, starting from the sentinel. Valid blocks are
/// offered for adoption only when they are taller than the receiver's tail.
#[derive(Debug)]
pub struct ChainFollower {
    anchor: Anchor,
    last_hash: Option<String>,
}

impl Default for ChainFollower {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainFollower {
    pub fn new() -> ChainFollower {
        ChainFollower {
            anchor: Anchor::Sentinel,
            last_hash: None,
        }
    }

    /// Height of the last validated peer block
    pub fn height(&self) -> Option<u64> {
        self.anchor.height()
    }

    /// `Ok(Some(block))` to adopt, `Ok(None)` to skip, `Err` when the peer's
    /// chain is broken
    pub fn observe(&mut self, block: Block, own_height: Option<u64>) -> Result<Option<Block>> {
        if self.last_hash.as_deref() == Some(block.get_hash()) {
            return Ok(None);
        }
        self.last_hash = Some(block.get_hash().to_string());

        check_block(&self.anchor, &block)?;
        self.anchor = Anchor::Block(block.clone());

        if own_height.map_or(true, |height| block.get_height() > height) {
            Ok(Some(block))
        } else {
            Ok(None)
        }
    }
}
