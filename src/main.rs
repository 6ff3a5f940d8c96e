use clap::Parser;
use log::{error, info, LevelFilter};
use peer_chain::cli::FormatArg;
use peer_chain::{
    persist_chain, random_node_id, validate_chain, Block, BlockStore, Command, Node, NodeConfig,
    Opt, SledBlockStore, GLOBAL_CONFIG,
};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Some(path) = &opt.config {
        if let Err(e) = GLOBAL_CONFIG.load_file(path) {
            error!("Error: {e}");
            process::exit(1);
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Error: failed to start runtime: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_command(opt.command)) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn open_store(db: Option<String>) -> Result<SledBlockStore, Box<dyn std::error::Error>> {
    let path = db.unwrap_or_else(|| GLOBAL_CONFIG.get_db_path());
    Ok(SledBlockStore::open(path)?)
}

fn print_blocks(blocks: &[Block], format: FormatArg) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        FormatArg::Json => println!("{}", serde_json::to_string_pretty(blocks)?),
        FormatArg::Text => {
            for block in blocks {
                println!("Height: {}", block.get_height());
                println!("Data: {}", block.get_data());
                println!("Pre block hash: {}", block.get_previous_hash());
                println!("Cur block hash: {}", block.get_hash());
                println!("Nonce: {}", block.get_nonce());
                println!("Timestamp: {}", block.get_timestamp());
                println!("Mined by: {}", block.get_mined_by());
                println!();
            }
        }
    }
    Ok(())
}

async fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Simulate {
            nodes,
            db,
            timeout: seconds,
            data,
        } => {
            if nodes == 0 {
                return Err("At least one node is required".into());
            }
            let limit = Duration::from_secs(seconds);
            let store: Arc<dyn BlockStore> = Arc::new(open_store(db)?);
            store.clear()?;

            let first_id = GLOBAL_CONFIG.get_node_id().unwrap_or_else(random_node_id);
            let first = Node::create(&first_id).await?;
            let sink = persist_chain(&first, store.clone());

            // each new node joins through the most recently added one
            let mut network = vec![first];
            while network.len() < nodes {
                let mut id = random_node_id();
                while network.iter().any(|node| node.id() == id) {
                    id = random_node_id();
                }
                let peer = &network[network.len() - 1];
                let node = Node::connect(&id, peer).await?;
                network.push(node);
            }

            for (i, payload) in data.iter().enumerate() {
                let node = &network[i % network.len()];
                info!("submitting '{payload}' to {}", node.id());
                node.process(payload)?;
                let height = (i + 1) as u64;
                for node in &network {
                    timeout(limit, node.wait_for_height(height)).await?;
                }
            }

            for node in &network {
                println!("== {} ==", node.id());
                print_blocks(&node.blocks(), FormatArg::Text)?;
            }

            for node in &network {
                node.shutdown();
            }
            timeout(limit, sink).await??;
            println!("Persisted {} blocks", store.query_all()?.len());
        }
        Command::Printchain { db, format } => {
            let store = open_store(db)?;
            print_blocks(&store.query_all()?, format)?;
        }
        Command::Replay { db } => {
            let store = open_store(db)?;
            let blocks = store.query_all()?;
            let tail = validate_chain(&blocks)?;
            let id = GLOBAL_CONFIG.get_node_id().unwrap_or_else(random_node_id);
            let node = Node::restore(&id, blocks, NodeConfig::default()).await?;
            match tail.height() {
                Some(height) => println!("Chain is valid up to height {height}"),
                None => println!("No blocks stored, {} started a fresh chain", node.id()),
            }
            node.shutdown();
        }
        Command::Clear { db } => {
            let store = open_store(db)?;
            store.clear()?;
            println!("Done!");
        }
    }
    Ok(())
}
