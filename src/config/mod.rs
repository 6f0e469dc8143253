//! Configuration management
//!
//! TOML configuration for the node: logging level, database location, the
//! node's listen address and mode, and the peer directory address.

pub mod settings;

pub use settings::{
    Config, DnsConfig, NodeConfig, NodeMode, CONFIG_FILE_NAME, DEFAULT_CONFIG_FOLDER,
    KEYSTORE_FILE_NAME,
};
