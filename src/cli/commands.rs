use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// Output format for printed chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatArg {
    #[default]
    Text,
    Json,
}

impl FromStr for FormatArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(FormatArg::Text),
            "json" => Ok(FormatArg::Json),
            _ => Err(format!("Invalid format: {s}. Valid options: text, json")),
        }
    }
}

impl std::fmt::Display for FormatArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatArg::Text => write!(f, "text"),
            FormatArg::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "peer-chain")]
pub struct Opt {
    #[arg(
        long = "config",
        global = true,
        help = "TOML file with db_path, node_id and genesis_payload"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        name = "simulate",
        about = "Run an in-process network, mine the given payloads and persist the result"
    )]
    Simulate {
        #[arg(long = "nodes", default_value_t = 3, help = "Number of nodes to start")]
        nodes: usize,
        #[arg(long = "db", help = "Database path for the first node's chain")]
        db: Option<String>,
        #[arg(
            long = "timeout",
            default_value_t = 30,
            help = "Seconds to wait for the network to converge"
        )]
        timeout: u64,
        #[arg(help = "Payloads to mine, submitted round-robin")]
        data: Vec<String>,
    },
    #[command(name = "printchain", about = "Print all persisted blocks")]
    Printchain {
        #[arg(long = "db", help = "Database path")]
        db: Option<String>,
        #[arg(long = "format", default_value_t = FormatArg::Text, help = "text or json")]
        format: FormatArg,
    },
    #[command(
        name = "replay",
        about = "Restore a node from the database and validate its chain"
    )]
    Replay {
        #[arg(long = "db", help = "Database path")]
        db: Option<String>,
    },
    #[command(name = "clear", about = "Delete every persisted block")]
    Clear {
        #[arg(long = "db", help = "Database path")]
        db: Option<String>,
    },
}
