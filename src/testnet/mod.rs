//! Test helpers
//!
//! Pre-mined chains, tampered blocks and small line-topology networks shared
//! by the unit tests.

pub mod test_utils;

pub use test_utils::*;
