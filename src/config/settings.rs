use crate::core::GENESIS_PAYLOAD;
use crate::error::Result;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

static DEFAULT_DB_PATH: &str = "./data/chain";

const DB_PATH_KEY: &str = "DB_PATH";
const NODE_ID_KEY: &str = "NODE_ID";
const GENESIS_PAYLOAD_KEY: &str = "GENESIS_PAYLOAD";

/// Optional TOML file layered over the environment
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    db_path: Option<String>,
    node_id: Option<String>,
    genesis_payload: Option<String>,
}

pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();
        map.insert(
            String::from(DB_PATH_KEY),
            env::var(DB_PATH_KEY).unwrap_or_else(|_| String::from(DEFAULT_DB_PATH)),
        );
        map.insert(
            String::from(GENESIS_PAYLOAD_KEY),
            env::var(GENESIS_PAYLOAD_KEY).unwrap_or_else(|_| String::from(GENESIS_PAYLOAD)),
        );
        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            map.insert(String::from(NODE_ID_KEY), node_id);
        }

        Config {
            inner: RwLock::new(map),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge settings from a TOML file; keys absent from the file keep
    /// their current values
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.load_str(&text)
    }

    pub fn load_str(&self, text: &str) -> Result<()> {
        let settings: FileSettings = toml::from_str(text)?;
        let mut inner = self.write();
        if let Some(db_path) = settings.db_path {
            inner.insert(String::from(DB_PATH_KEY), db_path);
        }
        if let Some(node_id) = settings.node_id {
            inner.insert(String::from(NODE_ID_KEY), node_id);
        }
        if let Some(payload) = settings.genesis_payload {
            inner.insert(String::from(GENESIS_PAYLOAD_KEY), payload);
        }
        Ok(())
    }

    pub fn get_db_path(&self) -> String {
        self.read()
            .get(DB_PATH_KEY)
            .cloned()
            .unwrap_or_else(|| String::from(DEFAULT_DB_PATH))
    }

    pub fn set_db_path(&self, path: String) {
        self.write().insert(String::from(DB_PATH_KEY), path);
    }

    pub fn get_node_id(&self) -> Option<String> {
        self.read().get(NODE_ID_KEY).cloned()
    }

    pub fn set_node_id(&self, node_id: String) {
        self.write().insert(String::from(NODE_ID_KEY), node_id);
    }

    pub fn get_genesis_payload(&self) -> String {
        self.read()
            .get(GENESIS_PAYLOAD_KEY)
            .cloned()
            .unwrap_or_else(|| String::from(GENESIS_PAYLOAD))
    }
}
