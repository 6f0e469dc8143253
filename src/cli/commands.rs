use crate::error::{BlockchainError, Result};
use crate::network::DirectoryQuery;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// Which peer directory listing to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerQueryArg {
    SelfDescriptor,
    Seeds,
    Nodes,
    Resolve,
}

impl FromStr for PeerQueryArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "self" => Ok(PeerQueryArg::SelfDescriptor),
            "seeds" => Ok(PeerQueryArg::Seeds),
            "nodes" => Ok(PeerQueryArg::Nodes),
            "resolve" => Ok(PeerQueryArg::Resolve),
            _ => Err(format!(
                "Invalid query: {s}. Valid options: self, seeds, nodes, resolve"
            )),
        }
    }
}

impl std::fmt::Display for PeerQueryArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerQueryArg::SelfDescriptor => write!(f, "self"),
            PeerQueryArg::Seeds => write!(f, "seeds"),
            PeerQueryArg::Nodes => write!(f, "nodes"),
            PeerQueryArg::Resolve => write!(f, "resolve"),
        }
    }
}

impl PeerQueryArg {
    /// `resolve` needs the address to look up; the listings take none
    pub fn into_query(self, address: Option<String>) -> Result<DirectoryQuery> {
        match (self, address) {
            (PeerQueryArg::SelfDescriptor, None) => Ok(DirectoryQuery::SelfDescriptor),
            (PeerQueryArg::Seeds, None) => Ok(DirectoryQuery::Seeds),
            (PeerQueryArg::Nodes, None) => Ok(DirectoryQuery::Nodes),
            (PeerQueryArg::Resolve, Some(address)) => Ok(DirectoryQuery::Resolve { address }),
            (PeerQueryArg::Resolve, None) => Err(BlockchainError::Config(
                "resolve needs an ADDRESS to look up".to_string(),
            )),
            (query, Some(_)) => Err(BlockchainError::Config(format!(
                "'{query}' does not take an address"
            ))),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "nosod", about = "Noso peer-to-peer ledger node")]
pub struct Opt {
    #[arg(
        long = "config",
        global = true,
        help = "Config file (default: $HOME/.nosod/config.toml)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "init", about = "Write a default config file and create the ledger")]
    Init,
    #[command(name = "node", about = "Run a node until interrupted")]
    Node {
        #[arg(long = "node-address", help = "Address to listen on")]
        node_address: Option<String>,
        #[arg(long = "node-port", help = "Port to listen on")]
        node_port: Option<u16>,
        #[arg(long = "node-mode", help = "Node mode (dns, seed, supernode, node)")]
        node_mode: Option<String>,
        #[arg(long = "dns-address", help = "Address the peer directory listens on")]
        dns_address: Option<String>,
        #[arg(long = "dns-port", help = "Port the peer directory listens on")]
        dns_port: Option<u16>,
        #[arg(short = 's', long = "seed", help = "Seed to bootstrap from (host:port)")]
        seed: Option<String>,
    },
    #[command(name = "status", about = "Check the ledger and print its cursor")]
    Status,
    #[command(name = "blocks", about = "Print stored blocks with heights in [from, to)")]
    Blocks {
        #[arg(long = "from", default_value_t = 0, help = "First height to print")]
        from: u64,
        #[arg(long = "to", help = "Height to stop before (default: past the tip)")]
        to: Option<u64>,
    },
    #[command(name = "peers", about = "Query a running peer directory")]
    Peers {
        #[arg(long = "dns", help = "Directory address (default: configured dns address)")]
        dns: Option<String>,
        #[arg(help = "Query: self, seeds, nodes or resolve")]
        query: PeerQueryArg,
        #[arg(help = "Peer address, for resolve")]
        address: Option<String>,
        #[arg(long = "binary", help = "Ask for the binary encoding")]
        binary: bool,
    },
    #[command(name = "address", about = "Derive a legacy account address from a public key")]
    Address {
        #[arg(help = "Public key string")]
        public_key: String,
        #[arg(long = "multisig", help = "Derive a multisig (M) address")]
        multisig: bool,
    },
    #[command(name = "validate-address", about = "Check a legacy account address")]
    ValidateAddress {
        #[arg(help = "The address to check")]
        address: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_flags() {
        let opt = Opt::try_parse_from([
            "nosod",
            "node",
            "--node-port",
            "45051",
            "--node-mode",
            "seed",
            "-s",
            "127.0.0.1:45050",
        ])
        .unwrap();
        match opt.command {
            Command::Node {
                node_port,
                node_mode,
                seed,
                node_address,
                ..
            } => {
                assert_eq!(node_port, Some(45051));
                assert_eq!(node_mode.as_deref(), Some("seed"));
                assert_eq!(seed.as_deref(), Some("127.0.0.1:45050"));
                assert!(node_address.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let opt = Opt::try_parse_from(["nosod", "status", "--config", "/tmp/n/config.toml"]).unwrap();
        assert_eq!(opt.config, Some(PathBuf::from("/tmp/n/config.toml")));
    }

    #[test]
    fn test_peer_query_needs_address_only_for_resolve() {
        assert_eq!(
            PeerQueryArg::Seeds.into_query(None).unwrap(),
            DirectoryQuery::Seeds
        );
        assert_eq!(
            PeerQueryArg::Resolve
                .into_query(Some("10.0.0.1".to_string()))
                .unwrap(),
            DirectoryQuery::Resolve {
                address: "10.0.0.1".to_string()
            }
        );
        assert!(PeerQueryArg::Resolve.into_query(None).is_err());
        assert!(PeerQueryArg::Nodes
            .into_query(Some("10.0.0.1".to_string()))
            .is_err());
    }

    #[test]
    fn test_unknown_peer_query_is_rejected() {
        assert!(Opt::try_parse_from(["nosod", "peers", "everyone"]).is_err());
    }
}
