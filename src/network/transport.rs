//! TCP gossip overlay
//!
//! Every frame travels on its own short connection as one JSON document,
//! the same framing the node has always used for peer messages. Two frames
//! exist:
//!
//! - `Hello` introduces a node. An unknown sender is registered and answered
//!   with our own `Hello`, which also tells it the address we saw it
//!   connect from.
//! - `Publish` carries one topic message. Messages are identified by a hash
//!   of (origin, sequence, payload); a bounded LRU of seen ids drops
//!   duplicates. First-seen messages are delivered to the local subscriber
//!   and relayed to every connected peer except the one that sent it and
//!   the origin.

use crate::error::{BlockchainError, Result};
use crate::network::listener;
use crate::network::peer::{Direction, PeerInfo, PeerRegistry};
use crate::network::topic::{Topic, TopicMessage};
use crate::runtime::{ShutdownSignal, TaskGroup};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{debug, error, info, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::collections::{HashMap, HashSet};
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SEEN_CACHE_SIZE: usize = 4096;
const TCP_WRITE_TIMEOUT: u64 = 5000;
const TCP_READ_TIMEOUT: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Hello {
        peer: PeerInfo,
        observed_address: Option<String>,
    },
    Publish {
        topic: String,
        message_id: String,
        origin: String,
        sender: String,
        data: Vec<u8>,
    },
}

/// Cheap to clone handle on a bound gossip listener
#[derive(Clone)]
pub struct GossipTransport {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<PeerRegistry>,
    listen_addr: SocketAddr,
    seen: Mutex<LruCache<String, ()>>,
    topics: Mutex<HashMap<String, Sender<TopicMessage>>>,
    dialed: Mutex<HashSet<String>>,
    sequence: AtomicU64,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| BlockchainError::Network(format!("{what} lock poisoned")))
}

impl GossipTransport {
    /// Bind the listener and start accepting frames until `shutdown` fires
    pub fn bind(
        addr: &str,
        registry: Arc<PeerRegistry>,
        shutdown: ShutdownSignal,
        tasks: TaskGroup,
    ) -> Result<GossipTransport> {
        let (listener, listen_addr) = listener::bind(addr)?;

        // port 0 means the OS picked one; advertise the real port
        registry.update_local(|me| me.port = listen_addr.port())?;
        info!("Gossip transport listening on {listen_addr}");

        let capacity = NonZeroUsize::new(SEEN_CACHE_SIZE)
            .ok_or_else(|| BlockchainError::Config("seen cache size must be non-zero".into()))?;
        let transport = GossipTransport {
            inner: Arc::new(Inner {
                registry,
                listen_addr,
                seen: Mutex::new(LruCache::new(capacity)),
                topics: Mutex::new(HashMap::new()),
                dialed: Mutex::new(HashSet::new()),
                sequence: AtomicU64::new(0),
            }),
        };

        let handler = transport.clone();
        listener::serve(
            "gossip",
            listener,
            shutdown,
            tasks,
            Arc::new(move |stream: TcpStream, peer_addr: SocketAddr| {
                handler.handle_connection(stream, peer_addr)
            }),
        )?;
        Ok(transport)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.inner.listen_addr
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.inner.registry
    }

    fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        for frame in Deserializer::from_reader(reader).into_iter::<Frame>() {
            let frame = frame
                .map_err(|e| BlockchainError::Decode(format!("Bad frame from {peer_addr}: {e}")))?;
            if let Err(e) = self.process_frame(frame, peer_addr) {
                warn!("Error processing frame from {peer_addr}: {e}");
            }
        }

        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn process_frame(&self, frame: Frame, peer_addr: SocketAddr) -> Result<()> {
        match frame {
            Frame::Hello {
                peer,
                observed_address,
            } => self.handle_hello(peer, observed_address, peer_addr),
            Frame::Publish {
                topic,
                message_id,
                origin,
                sender,
                data,
            } => self.handle_publish(topic, message_id, origin, sender, data),
        }
    }

    fn handle_hello(
        &self,
        mut peer: PeerInfo,
        observed_address: Option<String>,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        let registry = &self.inner.registry;

        if let Some(observed) = observed_address {
            let me = registry.local()?;
            if me.has_unspecified_address() {
                registry.update_local(|me| me.address = observed.clone())?;
                info!("Learned our public address {observed} from {}", peer.id);
            }
        }

        if peer.has_unspecified_address() {
            peer.address = peer_addr.ip().to_string();
        }
        peer.connected = true;

        if let Some(known) = registry.get(&peer.id)? {
            peer.direction = known.direction;
            registry.upsert(peer)?;
            return Ok(());
        }

        let dialed = lock(&self.inner.dialed, "dialed set")?.remove(&peer.endpoint());
        if dialed {
            peer.direction = Direction::Outbound;
            registry.upsert(peer)?;
            return Ok(());
        }

        peer.direction = Direction::Inbound;
        let endpoint = peer.socket_addr()?;
        registry.upsert(peer)?;

        let reply = Frame::Hello {
            peer: registry.local()?,
            observed_address: Some(peer_addr.ip().to_string()),
        };
        send_frame(endpoint, &reply)
    }

    fn handle_publish(
        &self,
        topic: String,
        message_id: String,
        origin: String,
        sender: String,
        data: Vec<u8>,
    ) -> Result<()> {
        if !self.mark_seen(&message_id)? {
            debug!("Dropping duplicate message {message_id}");
            return Ok(());
        }
        self.inner.registry.set_connected(&sender, true)?;

        let subscriber = lock(&self.inner.topics, "topic table")?.get(&topic).cloned();
        if let Some(subscriber) = subscriber {
            let message = TopicMessage {
                origin: origin.clone(),
                received_from: sender.clone(),
                data: data.clone(),
            };
            if subscriber.send(message).is_err() {
                debug!("Subscriber for '{topic}' is gone");
            }
        }

        let local_id = self.inner.registry.local_id()?;
        let relay = Frame::Publish {
            topic,
            message_id,
            origin: origin.clone(),
            sender: local_id,
            data,
        };
        self.broadcast(&relay, &[sender.as_str(), origin.as_str()]);
        Ok(())
    }

    /// Insert into the seen cache; false when it was already there
    fn mark_seen(&self, message_id: &str) -> Result<bool> {
        let mut seen = lock(&self.inner.seen, "seen cache")?;
        if seen.contains(message_id) {
            return Ok(false);
        }
        seen.put(message_id.to_string(), ());
        Ok(true)
    }

    /// Send `frame` to every connected peer not in `skip`.
    /// Returns (attempted, delivered).
    fn broadcast(&self, frame: &Frame, skip: &[&str]) -> (usize, usize) {
        let peers = match self.inner.registry.connected() {
            Ok(peers) => peers,
            Err(e) => {
                error!("Failed to read peer registry: {e}");
                return (0, 0);
            }
        };

        let mut attempted = 0;
        let mut delivered = 0;
        for peer in peers.iter().filter(|p| !skip.contains(&p.id.as_str())) {
            attempted += 1;
            match peer.socket_addr().and_then(|addr| send_frame(addr, frame)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Failed to reach peer {} at {}: {e}", peer.id, peer.endpoint());
                    if let Err(e) = self.inner.registry.set_connected(&peer.id, false) {
                        error!("Failed to update peer {}: {e}", peer.id);
                    }
                }
            }
        }
        (attempted, delivered)
    }

    /// Publish a new message originating here
    pub fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        let origin = self.inner.registry.local_id()?;
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let message_id = message_id(&origin, sequence, &data);
        self.mark_seen(&message_id)?;

        let frame = Frame::Publish {
            topic: topic.to_string(),
            message_id,
            origin: origin.clone(),
            sender: origin,
            data,
        };
        let (attempted, delivered) = self.broadcast(&frame, &[]);
        if attempted > 0 && delivered == 0 {
            return Err(BlockchainError::Network(format!(
                "could not reach any of {attempted} peers for '{topic}'"
            )));
        }
        debug!("Published on '{topic}' to {delivered}/{attempted} peers");
        Ok(())
    }

    /// Introduce ourselves to the node at `addr` (`host:port`)
    pub fn connect(&self, addr: &str) -> Result<()> {
        let target = addr
            .to_socket_addrs()
            .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?
            .find(|a| a.is_ipv4())
            .ok_or_else(|| BlockchainError::Network(format!("No IPv4 address for {addr}")))?;

        lock(&self.inner.dialed, "dialed set")?.insert(target.to_string());
        let hello = Frame::Hello {
            peer: self.inner.registry.local()?,
            observed_address: None,
        };
        send_frame(target, &hello)?;
        info!("Sent hello to {target}");
        Ok(())
    }

    /// Subscribe to `topic`. A topic can only be joined once at a time.
    pub fn join(&self, topic: &str) -> Result<TransportTopic> {
        let mut topics = lock(&self.inner.topics, "topic table")?;
        if topics.contains_key(topic) {
            return Err(BlockchainError::Network(format!(
                "topic '{topic}' already joined"
            )));
        }
        let (sender, receiver) = channel();
        topics.insert(topic.to_string(), sender);
        info!("Joined topic '{topic}'");
        Ok(TransportTopic {
            name: topic.to_string(),
            transport: self.clone(),
            receiver: Mutex::new(receiver),
        })
    }

    fn leave(&self, topic: &str) {
        if let Ok(mut topics) = self.inner.topics.lock() {
            topics.remove(topic);
        }
    }
}

pub fn message_id(origin: &str, sequence: u64, data: &[u8]) -> String {
    let mut input = Vec::with_capacity(origin.len() + 8 + data.len());
    input.extend_from_slice(origin.as_bytes());
    input.extend_from_slice(&sequence.to_be_bytes());
    input.extend_from_slice(data);
    HEXLOWER.encode(&sha256_digest(&input))
}

/// Write one frame on a fresh connection
pub fn send_frame(addr: SocketAddr, frame: &Frame) -> Result<()> {
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_millis(TCP_WRITE_TIMEOUT))
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;

    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;

    serde_json::to_writer(&stream, frame)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data: {e}")))?;

    let _ = stream.flush();
    let _ = stream.shutdown(Shutdown::Write);
    Ok(())
}

/// Subscription handle returned by [`GossipTransport::join`]
pub struct TransportTopic {
    name: String,
    transport: GossipTransport,
    receiver: Mutex<Receiver<TopicMessage>>,
}

impl Topic for TransportTopic {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, data: Vec<u8>) -> Result<()> {
        self.transport.publish(&self.name, data)
    }

    fn next_message(&self, timeout: Duration) -> Result<Option<TopicMessage>> {
        let receiver = lock(&self.receiver, "topic receiver")?;
        match receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BlockchainError::Network(format!(
                "subscription to '{}' closed",
                self.name
            ))),
        }
    }
}

impl Drop for TransportTopic {
    fn drop(&mut self) {
        self.transport.leave(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeMode;
    use std::net::TcpListener;
    use std::time::Instant;

    struct TestNode {
        transport: GossipTransport,
        shutdown: ShutdownSignal,
        tasks: TaskGroup,
    }

    impl TestNode {
        fn start(id: &str) -> TestNode {
            let registry = Arc::new(PeerRegistry::new(PeerInfo::new(
                "0.0.0.0",
                0,
                id,
                NodeMode::Node,
            )));
            let shutdown = ShutdownSignal::new();
            let tasks = TaskGroup::new();
            let transport =
                GossipTransport::bind("127.0.0.1:0", registry, shutdown.clone(), tasks.clone())
                    .unwrap();
            TestNode {
                transport,
                shutdown,
                tasks,
            }
        }

        fn endpoint(&self) -> String {
            self.transport.listen_addr().to_string()
        }

        fn stop(self) {
            self.shutdown.trigger();
            self.tasks.join_all();
        }
    }

    fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check() {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn test_frame_json_shape() {
        let frame = Frame::Publish {
            topic: "blocks".to_string(),
            message_id: "abc".to_string(),
            origin: "a".to_string(),
            sender: "a".to_string(),
            data: vec![1, 2],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.starts_with("{\"Publish\""));
        assert_eq!(serde_json::from_str::<Frame>(&json).unwrap(), frame);
    }

    #[test]
    fn test_message_id_depends_on_sequence() {
        assert_ne!(message_id("a", 0, b"x"), message_id("a", 1, b"x"));
        assert_eq!(message_id("a", 0, b"x"), message_id("a", 0, b"x"));
    }

    #[test]
    fn test_join_twice_fails() {
        let node = TestNode::start("solo");
        let topic = node.transport.join("blocks").unwrap();
        assert!(node.transport.join("blocks").is_err());
        drop(topic);
        assert!(node.transport.join("blocks").is_ok());
        node.stop();
    }

    #[test]
    fn test_publish_without_peers_succeeds() {
        let node = TestNode::start("solo");
        node.transport.publish("blocks", b"nobody".to_vec()).unwrap();
        node.stop();
    }

    #[test]
    fn test_hello_registers_both_sides_and_messages_flow() {
        let a = TestNode::start("node-a");
        let b = TestNode::start("node-b");
        let b_topic = b.transport.join("blocks").unwrap();

        a.transport.connect(&b.endpoint()).unwrap();
        wait_until("b to register a", || {
            b.transport.registry().contains("node-a").unwrap()
        });
        wait_until("a to register b", || {
            a.transport.registry().contains("node-b").unwrap()
        });

        let b_at_a = a.transport.registry().get("node-b").unwrap().unwrap();
        assert_eq!(b_at_a.direction, Direction::Outbound);
        assert!(b_at_a.connected);
        let a_at_b = b.transport.registry().get("node-a").unwrap().unwrap();
        assert_eq!(a_at_b.direction, Direction::Inbound);
        assert_eq!(a_at_b.address, "127.0.0.1");

        // a advertised 0.0.0.0 and learned its address from b's reply
        assert_eq!(a.transport.registry().local().unwrap().address, "127.0.0.1");

        a.transport.publish("blocks", b"payload".to_vec()).unwrap();
        let mut received = None;
        wait_until("b to receive the message", || {
            received = b_topic.next_message(Duration::from_millis(50)).unwrap();
            received.is_some()
        });
        let received = received.unwrap();
        assert_eq!(received.origin, "node-a");
        assert_eq!(received.received_from, "node-a");
        assert_eq!(received.data, b"payload");

        drop(b_topic);
        a.stop();
        b.stop();
    }

    #[test]
    fn test_connection_threads_are_reaped() {
        let node = TestNode::start("busy");
        let target = node.transport.listen_addr();
        for seq in 0..100u64 {
            let frame = Frame::Publish {
                topic: "blocks".to_string(),
                message_id: message_id("remote", seq, b"x"),
                origin: "remote".to_string(),
                sender: "remote".to_string(),
                data: b"x".to_vec(),
            };
            send_frame(target, &frame).unwrap();
        }

        // only the accept loop should be left
        wait_until("connection threads to exit", || node.tasks.reap_finished() == 1);
        node.stop();
    }

    #[test]
    fn test_publish_fails_when_every_peer_is_unreachable() {
        let node = TestNode::start("lonely");
        // grab a free port and close it again so nothing listens there
        let dead_port = {
            let free = TcpListener::bind("127.0.0.1:0").unwrap();
            free.local_addr().unwrap().port()
        };
        let mut ghost = PeerInfo::new("127.0.0.1", dead_port, "ghost", NodeMode::Node);
        ghost.connected = true;
        node.transport.registry().upsert(ghost).unwrap();

        assert!(node.transport.publish("blocks", b"x".to_vec()).is_err());
        let ghost = node.transport.registry().get("ghost").unwrap().unwrap();
        assert!(!ghost.connected);
        node.stop();
    }
}
