//! Command-line interface
//!
//! Argument parsing for the `nosod` binary. The commands themselves are
//! carried out in `main.rs`.

pub mod commands;

pub use commands::{Command, Opt, PeerQueryArg};
