//! Peer descriptors and the shared registry
//!
//! The registry is the only place peer state is mutated. Gossip marks peers
//! connected or disconnected, the directory reads snapshots, and the node's
//! own descriptor lives here too so address discovery updates are visible to
//! both.

use crate::config::NodeMode;
use crate::error::{BlockchainError, Result};
use crate::storage::{peer_key, RecordStore};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct PeerInfo {
    pub address: String,
    pub port: u16,
    pub id: String,
    pub mode: NodeMode,
    pub connected: bool,
    pub direction: Direction,
}

impl PeerInfo {
    pub fn new(address: &str, port: u16, id: &str, mode: NodeMode) -> PeerInfo {
        PeerInfo {
            address: address.to_string(),
            port,
            id: id.to_string(),
            mode,
            connected: false,
            direction: Direction::Unknown,
        }
    }

    /// `address:port`, the form the transport dials
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn store_key(&self) -> String {
        peer_key(&self.address, &self.id)
    }

    /// True while the advertised address is a wildcard bind address
    pub fn has_unspecified_address(&self) -> bool {
        self.address
            .parse::<IpAddr>()
            .map(|ip| ip.is_unspecified())
            .unwrap_or(false)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.endpoint().parse().map_err(|e| {
            BlockchainError::Network(format!("Invalid peer address {}: {e}", self.endpoint()))
        })
    }
}

pub struct PeerRegistry {
    local: RwLock<PeerInfo>,
    peers: RwLock<HashMap<String, PeerInfo>>,
}

impl PeerRegistry {
    pub fn new(local: PeerInfo) -> PeerRegistry {
        PeerRegistry {
            local: RwLock::new(local),
            peers: RwLock::new(HashMap::new()),
        }
    }

    fn read_peers(&self) -> Result<RwLockReadGuard<'_, HashMap<String, PeerInfo>>> {
        self.peers
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))
    }

    fn write_peers(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, PeerInfo>>> {
        self.peers
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire peer lock: {e}")))
    }

    pub fn local(&self) -> Result<PeerInfo> {
        let local = self
            .local
            .read()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire local peer lock: {e}")))?;
        Ok(local.clone())
    }

    pub fn local_id(&self) -> Result<String> {
        Ok(self.local()?.id)
    }

    /// Mutate our own descriptor and return the updated copy
    pub fn update_local(&self, update: impl FnOnce(&mut PeerInfo)) -> Result<PeerInfo> {
        let mut local = self
            .local
            .write()
            .map_err(|e| BlockchainError::Network(format!("Failed to acquire local peer lock: {e}")))?;
        update(&mut local);
        Ok(local.clone())
    }

    /// Insert or replace a peer. Returns true when the id was new.
    pub fn upsert(&self, peer: PeerInfo) -> Result<bool> {
        if peer.id == self.local_id()? {
            return Ok(false);
        }
        let mut peers = self.write_peers()?;
        let is_new = !peers.contains_key(&peer.id);
        if is_new {
            info!("Registered peer {} at {}", peer.id, peer.endpoint());
        }
        peers.insert(peer.id.clone(), peer);
        Ok(is_new)
    }

    pub fn get(&self, id: &str) -> Result<Option<PeerInfo>> {
        Ok(self.read_peers()?.get(id).cloned())
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.read_peers()?.contains_key(id))
    }

    pub fn set_connected(&self, id: &str, connected: bool) -> Result<()> {
        if let Some(peer) = self.write_peers()?.get_mut(id) {
            if peer.connected != connected {
                debug!(
                    "Peer {id} is now {}",
                    if connected { "connected" } else { "disconnected" }
                );
            }
            peer.connected = connected;
        }
        Ok(())
    }

    /// Every known peer, ordered by id
    pub fn all(&self) -> Result<Vec<PeerInfo>> {
        let mut peers: Vec<PeerInfo> = self.read_peers()?.values().cloned().collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(peers)
    }

    pub fn connected(&self) -> Result<Vec<PeerInfo>> {
        Ok(self.all()?.into_iter().filter(|p| p.connected).collect())
    }

    pub fn with_modes(&self, modes: &[NodeMode]) -> Result<Vec<PeerInfo>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|p| modes.contains(&p.mode))
            .collect())
    }

    pub fn find_by_address(&self, address: &str) -> Result<Vec<PeerInfo>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|p| p.address == address || p.endpoint() == address)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.read_peers().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the persisted snapshot with the current registry contents
    pub fn save_to(&self, store: &RecordStore<PeerInfo>) -> Result<usize> {
        let peers = self.all()?;
        let mut batch = store.batch();
        for key in store.list_keys()? {
            batch.delete(&key);
        }
        for peer in &peers {
            batch.put(&peer.store_key(), peer)?;
        }
        batch.commit()?;
        debug!("Saved {} peers", peers.len());
        Ok(peers.len())
    }

    /// Load a persisted snapshot. Restored peers start disconnected.
    pub fn load_from(&self, store: &RecordStore<PeerInfo>) -> Result<usize> {
        let mut loaded = 0;
        for mut peer in store.list_values()? {
            peer.connected = false;
            if self.upsert(peer)? {
                loaded += 1;
            }
        }
        if loaded > 0 {
            info!("Restored {loaded} peers from storage");
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageManager;
    use tempfile::TempDir;

    fn registry() -> PeerRegistry {
        PeerRegistry::new(PeerInfo::new("0.0.0.0", 45050, "self", NodeMode::Node))
    }

    #[test]
    fn test_upsert_and_lookup() {
        let registry = registry();
        let peer = PeerInfo::new("10.0.0.2", 45050, "peer-a", NodeMode::Seed);
        assert!(registry.upsert(peer.clone()).unwrap());
        assert!(!registry.upsert(peer.clone()).unwrap());
        assert_eq!(registry.get("peer-a").unwrap(), Some(peer));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_local_descriptor_is_not_a_peer() {
        let registry = registry();
        let me = registry.local().unwrap();
        assert!(!registry.upsert(me).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_connected_filter() {
        let registry = registry();
        registry
            .upsert(PeerInfo::new("10.0.0.2", 1, "a", NodeMode::Node))
            .unwrap();
        registry
            .upsert(PeerInfo::new("10.0.0.3", 1, "b", NodeMode::Node))
            .unwrap();
        registry.set_connected("b", true).unwrap();
        let connected: Vec<String> = registry
            .connected()
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(connected, vec!["b"]);
    }

    #[test]
    fn test_update_local_address() {
        let registry = registry();
        assert!(registry.local().unwrap().has_unspecified_address());
        let updated = registry
            .update_local(|me| me.address = "203.0.113.7".to_string())
            .unwrap();
        assert_eq!(updated.endpoint(), "203.0.113.7:45050");
        assert!(!registry.local().unwrap().has_unspecified_address());
    }

    #[test]
    fn test_snapshot_roundtrip_through_store() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::open(dir.path()).unwrap();

        let registry = registry();
        let mut seed = PeerInfo::new("10.0.0.9", 45050, "seed-1", NodeMode::Seed);
        seed.connected = true;
        registry.upsert(seed).unwrap();
        assert_eq!(registry.save_to(storage.peers()).unwrap(), 1);
        assert_eq!(
            storage.peers().list_keys().unwrap(),
            vec!["10.0.0.9:seed-1".to_string()]
        );

        let restored = PeerRegistry::new(PeerInfo::new("0.0.0.0", 1, "other", NodeMode::Dns));
        assert_eq!(restored.load_from(storage.peers()).unwrap(), 1);
        let peer = restored.get("seed-1").unwrap().unwrap();
        assert!(!peer.connected);
        assert_eq!(peer.mode, NodeMode::Seed);
    }
}
