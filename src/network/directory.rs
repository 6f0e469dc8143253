//! Peer directory
//!
//! Read-only view of the peer registry for discovery: our own descriptor,
//! the seed list, the node list and lookups by address. `DirectoryServer`
//! answers one request per TCP connection; the request is a JSON document
//! and the response comes back as JSON or bincode, whichever was asked for.

use crate::config::NodeMode;
use crate::error::{BlockchainError, Result};
use crate::network::listener;
use crate::network::peer::{PeerInfo, PeerRegistry};
use crate::runtime::{ShutdownSignal, TaskGroup};
use crate::utils::{deserialize_exact, serialize};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

const DIRECTORY_TIMEOUT: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryQuery {
    #[serde(rename = "self")]
    SelfDescriptor,
    Seeds,
    Nodes,
    Resolve { address: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Json,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRequest {
    pub query: DirectoryQuery,
    #[serde(default)]
    pub encoding: Encoding,
}

impl DirectoryRequest {
    pub fn new(query: DirectoryQuery, encoding: Encoding) -> DirectoryRequest {
        DirectoryRequest { query, encoding }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryResponse {
    Peer(PeerInfo),
    Peers(Vec<PeerInfo>),
    NotFound(String),
    Error(String),
}

impl DirectoryResponse {
    pub fn encode(&self, encoding: Encoding) -> Result<Vec<u8>> {
        match encoding {
            Encoding::Json => Ok(serde_json::to_vec(self)?),
            Encoding::Binary => serialize(self),
        }
    }

    pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<DirectoryResponse> {
        match encoding {
            Encoding::Json => serde_json::from_slice(bytes)
                .map_err(|e| BlockchainError::Decode(format!("Bad directory response: {e}"))),
            Encoding::Binary => deserialize_exact(bytes),
        }
    }
}

#[derive(Clone)]
pub struct PeerDirectory {
    registry: Arc<PeerRegistry>,
}

impl PeerDirectory {
    pub fn new(registry: Arc<PeerRegistry>) -> PeerDirectory {
        PeerDirectory { registry }
    }

    pub fn self_descriptor(&self) -> Result<PeerInfo> {
        self.registry.local()
    }

    pub fn seeds(&self) -> Result<Vec<PeerInfo>> {
        self.registry
            .with_modes(&[NodeMode::Seed, NodeMode::SuperNode])
    }

    pub fn nodes(&self) -> Result<Vec<PeerInfo>> {
        self.registry.with_modes(&[NodeMode::Node])
    }

    /// Look a peer up by `address` or `address:port`, ourselves included
    pub fn resolve(&self, address: &str) -> Result<Option<PeerInfo>> {
        let me = self.registry.local()?;
        if me.address == address || me.endpoint() == address {
            return Ok(Some(me));
        }
        Ok(self.registry.find_by_address(address)?.into_iter().next())
    }

    pub fn answer(&self, query: &DirectoryQuery) -> DirectoryResponse {
        let result = match query {
            DirectoryQuery::SelfDescriptor => self.self_descriptor().map(DirectoryResponse::Peer),
            DirectoryQuery::Seeds => self.seeds().map(DirectoryResponse::Peers),
            DirectoryQuery::Nodes => self.nodes().map(DirectoryResponse::Peers),
            DirectoryQuery::Resolve { address } => self.resolve(address).map(|found| match found {
                Some(peer) => DirectoryResponse::Peer(peer),
                None => DirectoryResponse::NotFound(address.clone()),
            }),
        };
        result.unwrap_or_else(|e| DirectoryResponse::Error(e.to_string()))
    }
}

pub struct DirectoryServer {
    local_addr: SocketAddr,
}

impl DirectoryServer {
    pub fn start(
        addr: &str,
        directory: PeerDirectory,
        shutdown: ShutdownSignal,
        tasks: TaskGroup,
    ) -> Result<DirectoryServer> {
        let (listener, local_addr) = listener::bind(addr)?;
        info!("Peer directory listening on {local_addr}");
        listener::serve(
            "directory",
            listener,
            shutdown,
            tasks,
            Arc::new(move |stream: TcpStream, peer_addr: SocketAddr| {
                serve_request(&directory, stream, peer_addr)
            }),
        )?;
        Ok(DirectoryServer { local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn serve_request(directory: &PeerDirectory, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_millis(DIRECTORY_TIMEOUT)))?;
    stream.set_write_timeout(Some(Duration::from_millis(DIRECTORY_TIMEOUT)))?;

    let request = {
        let reader = BufReader::new(&stream);
        Deserializer::from_reader(reader)
            .into_iter::<DirectoryRequest>()
            .next()
            .ok_or_else(|| BlockchainError::Decode(format!("Empty request from {peer_addr}")))?
            .map_err(|e| BlockchainError::Decode(format!("Bad request from {peer_addr}: {e}")))?
    };
    debug!("Directory query from {peer_addr}: {:?}", request.query);

    let body = directory.answer(&request.query).encode(request.encoding)?;
    stream.write_all(&body)?;
    stream.flush()?;
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

/// Ask the directory at `addr` (`host:port`) one question
pub fn query_directory(addr: &str, request: &DirectoryRequest) -> Result<DirectoryResponse> {
    let target = addr
        .to_socket_addrs()
        .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?
        .next()
        .ok_or_else(|| BlockchainError::Network(format!("No address for {addr}")))?;

    let mut stream = TcpStream::connect_timeout(&target, Duration::from_millis(DIRECTORY_TIMEOUT))
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream.set_read_timeout(Some(Duration::from_millis(DIRECTORY_TIMEOUT)))?;
    stream.set_write_timeout(Some(Duration::from_millis(DIRECTORY_TIMEOUT)))?;

    serde_json::to_writer(&stream, request)
        .map_err(|e| BlockchainError::Network(format!("Failed to send request: {e}")))?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)?;

    let mut body = Vec::new();
    stream.read_to_end(&mut body)?;
    DirectoryResponse::decode(&body, request.encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> PeerDirectory {
        let registry = Arc::new(PeerRegistry::new(PeerInfo::new(
            "192.0.2.1",
            45050,
            "dns-1",
            NodeMode::Dns,
        )));
        registry
            .upsert(PeerInfo::new("192.0.2.10", 45050, "seed-1", NodeMode::Seed))
            .unwrap();
        registry
            .upsert(PeerInfo::new("192.0.2.11", 45050, "super-1", NodeMode::SuperNode))
            .unwrap();
        registry
            .upsert(PeerInfo::new("192.0.2.20", 45050, "node-1", NodeMode::Node))
            .unwrap();
        PeerDirectory::new(registry)
    }

    #[test]
    fn test_lists_split_by_mode() {
        let directory = directory();
        let seeds: Vec<String> = directory.seeds().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(seeds, vec!["seed-1", "super-1"]);
        let nodes: Vec<String> = directory.nodes().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(nodes, vec!["node-1"]);
        assert_eq!(directory.self_descriptor().unwrap().id, "dns-1");
    }

    #[test]
    fn test_resolve() {
        let directory = directory();
        assert_eq!(
            directory.resolve("192.0.2.20").unwrap().unwrap().id,
            "node-1"
        );
        assert_eq!(
            directory.resolve("192.0.2.1:45050").unwrap().unwrap().id,
            "dns-1"
        );
        assert_eq!(
            directory.answer(&DirectoryQuery::Resolve {
                address: "198.51.100.1".to_string()
            }),
            DirectoryResponse::NotFound("198.51.100.1".to_string())
        );
    }

    #[test]
    fn test_request_json_shape() {
        let request: DirectoryRequest = serde_json::from_str(r#"{"query":"seeds"}"#).unwrap();
        assert_eq!(request, DirectoryRequest::new(DirectoryQuery::Seeds, Encoding::Json));
        let resolve: DirectoryRequest = serde_json::from_str(
            r#"{"query":{"resolve":{"address":"1.2.3.4"}},"encoding":"binary"}"#,
        )
        .unwrap();
        assert_eq!(resolve.encoding, Encoding::Binary);
        let me: DirectoryRequest = serde_json::from_str(r#"{"query":"self"}"#).unwrap();
        assert_eq!(me.query, DirectoryQuery::SelfDescriptor);
    }

    #[test]
    fn test_server_answers_in_both_encodings() {
        let shutdown = ShutdownSignal::new();
        let tasks = TaskGroup::new();
        let server =
            DirectoryServer::start("127.0.0.1:0", directory(), shutdown.clone(), tasks.clone())
                .unwrap();
        let addr = server.local_addr().to_string();

        let json = query_directory(
            &addr,
            &DirectoryRequest::new(DirectoryQuery::Nodes, Encoding::Json),
        )
        .unwrap();
        match json {
            DirectoryResponse::Peers(peers) => assert_eq!(peers[0].id, "node-1"),
            other => panic!("unexpected response {other:?}"),
        }

        let binary = query_directory(
            &addr,
            &DirectoryRequest::new(DirectoryQuery::SelfDescriptor, Encoding::Binary),
        )
        .unwrap();
        match binary {
            DirectoryResponse::Peer(peer) => assert_eq!(peer.mode, NodeMode::Dns),
            other => panic!("unexpected response {other:?}"),
        }

        shutdown.trigger();
        tasks.join_all();
    }
}
