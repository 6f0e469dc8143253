// Node configuration, loaded from a TOML file and passed explicitly to
// whatever needs it. Precedence: file, then NODE_ADDRESS / NODE_MODE from
// the environment, then command line flags.

use crate::error::{BlockchainError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_FOLDER: &str = ".nosod";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEYSTORE_FILE_NAME: &str = "keystore";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const NODE_MODE_KEY: &str = "NODE_MODE";

/// The role a process plays; fixed for its whole lifetime
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    Dns,
    Seed,
    SuperNode,
    #[default]
    Node,
}

impl NodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMode::Dns => "dns",
            NodeMode::Seed => "seed",
            NodeMode::SuperNode => "supernode",
            NodeMode::Node => "node",
        }
    }

    /// Modes that take part in block gossip
    pub fn gossips(&self) -> bool {
        !matches!(self, NodeMode::Dns)
    }

    /// Modes that serve the peer directory
    pub fn serves_directory(&self) -> bool {
        !matches!(self, NodeMode::Node)
    }
}

impl FromStr for NodeMode {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<NodeMode> {
        match s {
            "dns" => Ok(NodeMode::Dns),
            "seed" => Ok(NodeMode::Seed),
            "supernode" => Ok(NodeMode::SuperNode),
            "node" => Ok(NodeMode::Node),
            other => Err(BlockchainError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub address: String,
    pub port: u16,
    /// Kept as text so an unknown mode is reported when the node is built
    pub mode: String,
    pub bootstrap: Option<String>,
    pub generator_interval_secs: u64,
    pub dev_generator: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            address: "0.0.0.0".to_string(),
            port: 45050,
            mode: NodeMode::Node.to_string(),
            bootstrap: None,
            generator_interval_secs: 5,
            dev_generator: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub address: String,
    pub port: u16,
}

impl Default for DnsConfig {
    fn default() -> Self {
        DnsConfig {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder holding the config file, keystore and (by default) the database
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// The file this config was read from, `None` when defaults were used
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
    pub log_level: String,
    /// Relative paths are taken from `config_dir`
    pub database_path: String,
    pub node: NodeConfig,
    pub dns: DnsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            config_dir: PathBuf::from(DEFAULT_CONFIG_FOLDER),
            loaded_from: None,
            log_level: "info".to_string(),
            database_path: "data".to_string(),
            node: NodeConfig::default(),
            dns: DnsConfig::default(),
        }
    }
}

impl Config {
    /// `$HOME/.nosod`
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = env::var_os("HOME")
            .ok_or_else(|| BlockchainError::Config("HOME is not set".to_string()))?;
        Ok(PathBuf::from(home).join(DEFAULT_CONFIG_FOLDER))
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Read `file` (or the default location) and apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(file: Option<&Path>) -> Result<Config> {
        let file = match file {
            Some(file) => file.to_path_buf(),
            None => Self::default_config_dir()?.join(CONFIG_FILE_NAME),
        };
        let config_dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        // runs before the logger exists; callers report `loaded_from`
        let mut config = if file.exists() {
            let text = fs::read_to_string(&file)?;
            let mut config = Self::from_toml_str(&text)
                .map_err(|e| BlockchainError::Config(format!("{}: {e}", file.display())))?;
            config.loaded_from = Some(file);
            config
        } else {
            Config::default()
        };
        config.config_dir = config_dir;
        config.apply_env_with(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Write a default config file into `dir`; an existing file is an error
    pub fn write_default(dir: &Path) -> Result<PathBuf> {
        let file = dir.join(CONFIG_FILE_NAME);
        if file.exists() {
            return Err(BlockchainError::Config(format!(
                "config file {} already exists",
                file.display()
            )));
        }
        fs::create_dir_all(dir)?;
        let text = toml::to_string_pretty(&Config::default())?;
        fs::write(&file, text)?;
        info!("Wrote default config to {}", file.display());
        Ok(file)
    }

    /// Apply `NODE_ADDRESS` (`host:port`) and `NODE_MODE` as read by `lookup`
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.set_node_address(&addr)?;
        }
        if let Some(mode) = lookup(NODE_MODE_KEY) {
            self.node.mode = mode;
        }
        Ok(())
    }

    pub fn set_node_address(&mut self, addr: &str) -> Result<()> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| BlockchainError::Config(format!("expected host:port, got '{addr}'")))?;
        self.node.port = port
            .parse()
            .map_err(|e| BlockchainError::Config(format!("bad port in '{addr}': {e}")))?;
        self.node.address = host.to_string();
        Ok(())
    }

    pub fn mode(&self) -> Result<NodeMode> {
        self.node.mode.parse()
    }

    pub fn database_dir(&self) -> PathBuf {
        let path = Path::new(&self.database_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.config_dir.join(KEYSTORE_FILE_NAME)
    }

    pub fn node_listen_addr(&self) -> String {
        format!("{}:{}", self.node.address, self.node.port)
    }

    pub fn dns_listen_addr(&self) -> String {
        format!("{}:{}", self.dns.address, self.dns.port)
    }
}
