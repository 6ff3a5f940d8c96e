use crate::core::validation::compute_hash;
use crate::error::Result;
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Payload of the first block a node mines when it starts a chain
pub const GENESIS_PAYLOAD: &str = "Genesis";

/// `previous_hash` carried by every height-0 block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Everything a block commits to except its own hash.
///
/// The miner mutates `nonce` on a template until the digest satisfies the
/// difficulty predicate, then seals it into a [`Block`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub height: u64,
    pub data: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub timestamp: i64,
    pub mined_by: String,
}

impl BlockTemplate {
    /// Append the canonical byte form of every field to `out`.
    ///
    /// Strings are length-prefixed so that moving bytes between adjacent
    /// fields always changes the encoding.
    pub fn write_canonical(&self, out: &mut Vec<u8>) {
        out.extend(self.height.to_be_bytes());
        write_str(out, &self.data);
        write_str(out, &self.previous_hash);
        out.extend(self.nonce.to_be_bytes());
        out.extend(self.timestamp.to_be_bytes());
        write_str(out, &self.mined_by);
    }

    pub fn seal(self, hash: String) -> Block {
        Block {
            height: self.height,
            data: self.data,
            previous_hash: self.previous_hash,
            nonce: self.nonce,
            timestamp: self.timestamp,
            mined_by: self.mined_by,
            hash,
        }
    }
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    out.extend((value.len() as u64).to_be_bytes());
    out.extend(value.as_bytes());
}

/// Immutable unit of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    height: u64,
    data: String,
    previous_hash: String,
    nonce: u64,
    timestamp: i64,
    mined_by: String,
    hash: String,
}

impl Block {
    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_data(&self) -> &str {
        self.data.as_str()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_mined_by(&self) -> &str {
        self.mined_by.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// The block with its hash stripped, as it was fed to the digest
    pub fn template(&self) -> BlockTemplate {
        BlockTemplate {
            height: self.height,
            data: self.data.clone(),
            previous_hash: self.previous_hash.clone(),
            nonce: self.nonce,
            timestamp: self.timestamp,
            mined_by: self.mined_by.clone(),
        }
    }

    /// Digest recomputed from the other fields
    pub fn recompute_hash(&self) -> String {
        compute_hash(&self.template())
    }
}
