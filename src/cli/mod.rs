//! Command-line interface
//!
//! Argument parsing for the `peer-chain` demo binary.

pub mod commands;

pub use commands::{Command, FormatArg, Opt};
