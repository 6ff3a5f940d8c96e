//! Configuration management
//!
//! Process-wide settings (environment plus an optional TOML file) and the
//! per-node options handed to [`crate::network::Node`].

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};

use crate::network::observer::{LogObserver, NodeObserver};
use std::sync::Arc;

/// Options fixed when a node is built
#[derive(Clone)]
pub struct NodeConfig {
    pub genesis_payload: String,
    pub observer: Arc<dyn NodeObserver>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::from_config(&GLOBAL_CONFIG)
    }
}

impl NodeConfig {
    pub fn from_config(config: &Config) -> NodeConfig {
        NodeConfig {
            genesis_payload: config.get_genesis_payload(),
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn NodeObserver>) -> NodeConfig {
        self.observer = observer;
        self
    }
}
