//! Network integration tests
//!
//! Whole-node scenarios on the cooperative runtime: convergence, request
//! arbitration, rejection of tampered peers and persistence round trips.

use peer_chain::core::{meets_difficulty, validate_chain, validate_hash_integrity, Block};
use peer_chain::network::{EventLog, Node, NodeEvent};
use peer_chain::storage::{persist_chain, BlockStore, MemoryBlockStore, SledBlockStore};
use peer_chain::{BlockchainError, NodeConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(10);

async fn wait_for_all(nodes: &[&Node], height: u64) {
    for node in nodes {
        timeout(WAIT, node.wait_for_height(height))
            .await
            .unwrap_or_else(|_| panic!("{} never reached height {height}", node.id()));
    }
}

fn payloads(node: &Node) -> Vec<String> {
    node.blocks()
        .iter()
        .map(|block| block.get_data().to_string())
        .collect()
}

fn forge(block: &Block, data: &str) -> Block {
    let mut value = serde_json::to_value(block).unwrap();
    value["data"] = serde_json::Value::String(data.to_string());
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_two_node_genesis_convergence() {
    let a = Node::create("a").await.unwrap();
    assert_eq!(a.blocks().len(), 1);
    assert_eq!(a.blocks()[0].get_height(), 0);

    let b = Node::connect("b", &a).await.unwrap();
    wait_for_all(&[&b], 0).await;

    assert_eq!(b.blocks(), a.blocks());
    assert_eq!(b.blocks()[0].get_hash(), a.blocks()[0].get_hash());
    assert_eq!(b.peer_ids(), vec!["a".to_string()]);
    assert_eq!(a.peer_ids(), vec!["b".to_string()]);
}

#[tokio::test]
async fn test_propagated_mining() {
    let a = Node::create("a").await.unwrap();
    let b = Node::connect("b", &a).await.unwrap();
    let genesis = a.blocks()[0].clone();

    a.submit("x").unwrap();
    wait_for_all(&[&a, &b], 1).await;

    for node in [&a, &b] {
        let block = node.blocks()[1].clone();
        assert_eq!(block.get_data(), "x");
        assert_eq!(block.get_previous_hash(), genesis.get_hash());
        assert_eq!(block.get_mined_by(), "a");
        assert!(meets_difficulty(block.get_hash()));
    }
    assert_eq!(a.blocks(), b.blocks());
}

#[tokio::test]
async fn test_propagation_across_a_line() {
    let a = Node::create("a").await.unwrap();
    let b = Node::connect("b", &a).await.unwrap();
    let c = Node::connect("c", &b).await.unwrap();

    c.submit("from the edge").unwrap();
    wait_for_all(&[&a, &b, &c], 1).await;
    a.submit("from the root").unwrap();
    wait_for_all(&[&a, &b, &c], 2).await;

    for node in [&a, &b, &c] {
        assert_eq!(
            payloads(node),
            vec!["Genesis", "from the edge", "from the root"]
        );
        assert!(validate_chain(&node.blocks()).is_ok());
    }
    assert_eq!(a.blocks()[1].get_mined_by(), "c");
}

#[tokio::test]
async fn test_invalid_peer_rejection() {
    let honest = Node::create("honest").await.unwrap();
    honest.submit("x").unwrap();
    wait_for_all(&[&honest], 1).await;

    let mut blocks = honest.blocks();
    blocks[1] = forge(&blocks[1], "tampered");
    assert!(!validate_hash_integrity(&blocks[1]));

    let liar = Node::restore("liar", blocks.clone(), NodeConfig::default())
        .await
        .unwrap();
    let events = Arc::new(EventLog::new());
    let config = NodeConfig::default().with_observer(events.clone());

    let err = match Node::connect_with("b", &liar, config).await {
        Ok(_) => panic!("connected to a tampered chain"),
        Err(err) => err,
    };

    assert!(matches!(err, BlockchainError::InvalidPeerChain { ref peer, .. } if peer == "liar"));
    assert!(err.is_peer_fault());
    assert_eq!(liar.blocks(), blocks);
    assert!(liar.peer_ids().is_empty());
    assert_eq!(
        events.count(|e| matches!(e, NodeEvent::ValidationFailed { peer, .. } if peer == "liar")),
        1
    );
}

#[tokio::test]
async fn test_forwarding_arbitration() {
    let a = Node::create("a").await.unwrap();
    let b = Node::connect("b", &a).await.unwrap();

    a.submit("a").unwrap();
    // keep the two submissions on distinct milliseconds
    std::thread::sleep(Duration::from_millis(5));
    b.submit("b").unwrap();

    wait_for_all(&[&a, &b], 1).await;
    // give any straggling job a chance to land
    sleep(Duration::from_millis(100)).await;

    for node in [&a, &b] {
        let mined = payloads(node);
        assert!(!mined.contains(&"a".to_string()), "{mined:?}");
        assert_eq!(mined, vec!["Genesis", "b"]);
    }
}

#[tokio::test]
async fn test_arbitration_with_interleaved_submits() {
    let a = Node::create("a").await.unwrap();
    let b = Node::connect("b", &a).await.unwrap();
    wait_for_all(&[&b], 0).await;

    for round in 0..6u64 {
        let first = format!("a{round}");
        let second = format!("b{round}");
        a.submit(&first).unwrap();
        // let both nodes pick up the first request before the second lands
        for _ in 0..round % 3 {
            tokio::task::yield_now().await;
        }
        std::thread::sleep(Duration::from_millis(2));
        b.submit(&second).unwrap();

        wait_for_all(&[&a, &b], round + 1).await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(a.height(), Some(round + 1), "{:?}", payloads(&a));
        assert_eq!(a.blocks(), b.blocks());
        let last = a.last_block().unwrap();
        assert!(
            last.get_data() == first || last.get_data() == second,
            "round {round}: {:?}",
            payloads(&a)
        );
    }
    assert!(validate_chain(&a.blocks()).is_ok());
}

#[tokio::test]
async fn test_disconnected_node_stops_following() {
    let a = Node::create("a").await.unwrap();
    let b = Node::connect("b", &a).await.unwrap();
    wait_for_all(&[&b], 0).await;

    b.disconnect("a");
    b.disconnect("a");
    assert!(b.peer_ids().is_empty());

    a.submit("x").unwrap();
    wait_for_all(&[&a], 1).await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(b.height(), Some(0));
}

#[tokio::test]
async fn test_chain_feed_replays_then_follows() {
    let a = Node::create("a").await.unwrap();
    let mut feed = a.chain_feed();

    a.submit("x").unwrap();
    let genesis = timeout(WAIT, feed.recv()).await.unwrap().unwrap();
    let next = timeout(WAIT, feed.recv()).await.unwrap().unwrap();

    assert_eq!(genesis.get_height(), 0);
    assert_eq!(next.get_data(), "x");
    assert_eq!(next.get_previous_hash(), genesis.get_hash());
}

#[tokio::test]
async fn test_persistence_round_trip() {
    let a = Node::create("a").await.unwrap();
    let store = Arc::new(MemoryBlockStore::new());
    let sink = persist_chain(&a, store.clone());

    a.submit("x").unwrap();
    a.submit("y").unwrap();
    wait_for_all(&[&a], 2).await;
    a.shutdown();
    timeout(WAIT, sink).await.unwrap().unwrap();

    let stored = store.query_all().unwrap();
    assert_eq!(stored, a.blocks());
    assert_eq!(store.get(2).unwrap().map(|b| b.get_data().to_string()), Some("y".to_string()));

    let restored = Node::restore("a", stored, NodeConfig::default())
        .await
        .unwrap();
    restored.submit("z").unwrap();
    wait_for_all(&[&restored], 3).await;
    assert_eq!(payloads(&restored), vec!["Genesis", "x", "y", "z"]);
}

#[tokio::test]
async fn test_sled_sink_persists_chain() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SledBlockStore::open(dir.path().join("chain")).unwrap());

    let a = Node::create("a").await.unwrap();
    let b = Node::connect("b", &a).await.unwrap();
    let sink = persist_chain(&b, store.clone());

    a.submit("x").unwrap();
    wait_for_all(&[&a, &b], 1).await;
    b.shutdown();
    timeout(WAIT, sink).await.unwrap().unwrap();

    let stored = store.query_all().unwrap();
    assert_eq!(stored, b.blocks());
    assert!(validate_chain(&stored).is_ok());
}
