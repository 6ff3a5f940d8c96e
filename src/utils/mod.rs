//! Utility functions and helpers
//!
//! Hashing, wall-clock time and binary encoding shared by the chain core
//! and the block store.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, sha256_digest, sha256_hex};
pub use serialization::{deserialize, serialize};
