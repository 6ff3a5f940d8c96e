use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::network::Node;
use log::{error, info};
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

const BLOCKS_TREE: &str = "blocks";

/// Durable home for one node's chain, keyed by block height
pub trait BlockStore: Send + Sync {
    fn get(&self, height: u64) -> Result<Option<Block>>;
    /// Insert or overwrite the block at its height
    fn put(&self, block: &Block) -> Result<()>;
    /// Every stored block in ascending height order
    fn query_all(&self) -> Result<Vec<Block>>;
    fn clear(&self) -> Result<()>;
}

pub struct SledBlockStore {
    db: Db,
    path: PathBuf,
}

impl SledBlockStore {
    pub fn open(path: impl AsRef<Path>) -> Result<SledBlockStore> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        Ok(SledBlockStore { db, path })
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    fn blocks_tree(&self) -> Result<Tree> {
        self.db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))
    }
}

impl BlockStore for SledBlockStore {
    fn get(&self, height: u64) -> Result<Option<Block>> {
        let tree = self.blocks_tree()?;
        match tree
            .get(height.to_be_bytes())
            .map_err(|e| BlockchainError::Database(format!("Failed to get block: {e}")))?
        {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    fn put(&self, block: &Block) -> Result<()> {
        let tree = self.blocks_tree()?;
        let data = block.serialize()?;
        tree.insert(block.get_height().to_be_bytes(), data)
            .map_err(|e| BlockchainError::Database(format!("Failed to store block: {e}")))?;
        tree.flush()?;
        Ok(())
    }

    fn query_all(&self) -> Result<Vec<Block>> {
        let tree = self.blocks_tree()?;
        // big-endian keys iterate in height order
        tree.iter()
            .values()
            .map(|value| {
                let bytes = value
                    .map_err(|e| BlockchainError::Database(format!("Failed to read block: {e}")))?;
                Block::deserialize(bytes.as_ref())
            })
            .collect()
    }

    fn clear(&self) -> Result<()> {
        let tree = self.blocks_tree()?;
        tree.clear()?;
        tree.flush()?;
        Ok(())
    }
}

/// Store that lives and dies with the process
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<BTreeMap<u64, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> MemoryBlockStore {
        MemoryBlockStore::default()
    }

    fn blocks(&self) -> MutexGuard<'_, BTreeMap<u64, Block>> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, height: u64) -> Result<Option<Block>> {
        Ok(self.blocks().get(&height).cloned())
    }

    fn put(&self, block: &Block) -> Result<()> {
        self.blocks().insert(block.get_height(), block.clone());
        Ok(())
    }

    fn query_all(&self) -> Result<Vec<Block>> {
        Ok(self.blocks().values().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.blocks().clear();
        Ok(())
    }
}

/// Write every block of `node`'s chain to `store`, past and future.
///
/// The sink stops at the first storage error; the node's chain is never
/// affected by it.
pub fn persist_chain(node: &Node, store: Arc<dyn BlockStore>) -> JoinHandle<()> {
    let node_id = node.id().to_string();
    let mut feed = node.chain_feed();
    tokio::spawn(async move {
        while let Some(block) = feed.recv().await {
            if let Err(e) = store.put(&block) {
                error!("{node_id}: stopped persisting chain: {e}");
                return;
            }
        }
        info!("{node_id}: chain feed closed, persistence finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Anchor, MiningJob};
    use crate::testnet::{create_temp_dir, mine_chain, CONVERGENCE_TIMEOUT};

    fn chain_of(len: usize) -> Vec<Block> {
        mine_chain(len, "node1")
    }

    struct FailingStore;

    impl BlockStore for FailingStore {
        fn get(&self, _height: u64) -> Result<Option<Block>> {
            Ok(None)
        }

        fn put(&self, _block: &Block) -> Result<()> {
            Err(BlockchainError::Database("disk full".to_string()))
        }

        fn query_all(&self) -> Result<Vec<Block>> {
            Ok(vec![])
        }

        fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_error_ends_sink_not_node() {
        let node = Node::create("node1").await.unwrap();
        let sink = persist_chain(&node, Arc::new(FailingStore));

        // the genesis write fails and the sink finishes on its own
        tokio::time::timeout(CONVERGENCE_TIMEOUT, sink)
            .await
            .unwrap()
            .unwrap();

        node.process("x").unwrap();
        tokio::time::timeout(CONVERGENCE_TIMEOUT, node.wait_for_height(1))
            .await
            .unwrap();
        assert_eq!(node.last_block().unwrap().get_data(), "x");
    }

    #[test]
    fn test_sled_store_orders_by_height() {
        let dir = create_temp_dir().unwrap();
        let store = SledBlockStore::open(dir.path().join("chain")).unwrap();
        let blocks = chain_of(3);

        // out of order on purpose
        store.put(&blocks[2]).unwrap();
        store.put(&blocks[0]).unwrap();
        store.put(&blocks[1]).unwrap();

        assert_eq!(store.query_all().unwrap(), blocks);
        assert_eq!(store.get(1).unwrap(), Some(blocks[1].clone()));
        assert_eq!(store.get(7).unwrap(), None);
    }

    #[test]
    fn test_sled_store_clears() {
        let dir = create_temp_dir().unwrap();
        let path = dir.path().join("chain");
        let store = SledBlockStore::open(&path).unwrap();
        for block in &chain_of(2) {
            store.put(block).unwrap();
        }

        assert_eq!(store.get_path(), path.as_path());
        assert_eq!(store.query_all().unwrap().len(), 2);
        store.clear().unwrap();
        assert!(store.query_all().unwrap().is_empty());
        assert_eq!(store.get(0).unwrap(), None);
    }

    #[test]
    fn test_put_overwrites_same_height() {
        let store = MemoryBlockStore::new();
        let blocks = chain_of(1);
        let other = MiningJob::new(&Anchor::Sentinel, "other", "node2", 0)
            .run_to_completion()
            .unwrap();

        store.put(&blocks[0]).unwrap();
        store.put(&other).unwrap();
        assert_eq!(store.query_all().unwrap(), vec![other]);
    }
}
