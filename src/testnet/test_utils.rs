//! Test utilities for network testing

use crate::core::{Anchor, Block, MiningJob};
use crate::error::{BlockchainError, Result};
use crate::network::Node;
use std::time::Duration;
use tempfile::TempDir;

/// Upper bound for any convergence wait in tests
pub const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// Mine a valid chain of `len` blocks, genesis first
pub fn mine_chain(len: usize, mined_by: &str) -> Vec<Block> {
    let mut anchor = Anchor::Sentinel;
    let mut blocks = Vec::with_capacity(len);
    for i in 0..len {
        let data = if i == 0 {
            "Genesis".to_string()
        } else {
            format!("block {i}")
        };
        if let Some(block) = MiningJob::new(&anchor, &data, mined_by, i as i64).run_to_completion()
        {
            anchor = Anchor::Block(block.clone());
            blocks.push(block);
        }
    }
    blocks
}

/// Copy of `block` with its data replaced and the stale hash kept, the way a
/// tampered block looks after a round trip through JSON
pub fn forge_block(block: &Block, data: &str) -> Result<Block> {
    let mut value = serde_json::to_value(block)?;
    value["data"] = serde_json::Value::String(data.to_string());
    Ok(serde_json::from_value(value)?)
}

/// `count` nodes where each one joined through the previous
pub async fn create_test_network(count: usize) -> Result<Vec<Node>> {
    let mut nodes: Vec<Node> = Vec::with_capacity(count);
    for i in 0..count {
        let id = format!("node{i}");
        let node = match nodes.last() {
            Some(peer) => Node::connect(&id, peer).await?,
            None => Node::create(&id).await?,
        };
        nodes.push(node);
    }
    Ok(nodes)
}

/// Wait until every node reaches `height`
pub async fn wait_for_all(nodes: &[Node], height: u64) -> Result<()> {
    for node in nodes {
        tokio::time::timeout(CONVERGENCE_TIMEOUT, node.wait_for_height(height))
            .await
            .map_err(|_| {
                BlockchainError::Node(format!("{} never reached height {height}", node.id()))
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{validate_chain, validate_hash_integrity};

    #[test]
    fn test_mine_chain_is_valid() {
        let blocks = mine_chain(3, "node1");
        assert_eq!(blocks.len(), 3);
        assert_eq!(validate_chain(&blocks).unwrap().height(), Some(2));
    }

    #[test]
    fn test_forge_block_breaks_integrity() {
        let blocks = mine_chain(1, "node1");
        let forged = forge_block(&blocks[0], "tampered").unwrap();
        assert_eq!(forged.get_hash(), blocks[0].get_hash());
        assert_eq!(forged.get_data(), "tampered");
        assert!(!validate_hash_integrity(&forged));
    }

    #[tokio::test]
    async fn test_create_test_network_converges() {
        let nodes = create_test_network(3).await.unwrap();
        wait_for_all(&nodes, 0).await.unwrap();

        let genesis = nodes[0].blocks();
        for node in &nodes {
            assert_eq!(node.blocks(), genesis);
        }
    }
}
