use crate::config::{Config, NodeMode};
use crate::core::{ChainIntegrity, IntegrityOutcome, Ledger, Status};
use crate::error::{BlockchainError, Result};
use crate::network::{
    resolve_to_socket_addr, DirectoryServer, GossipChannel, GossipTransport, PeerDirectory,
    PeerInfo, PeerRegistry, BLOCKS_TOPIC, DEFAULT_RESOLVE_TIMEOUT,
};
use crate::node::dev::run_generator;
use crate::node::identity::NodeIdentity;
use crate::runtime::{ShutdownSignal, TaskGroup};
use crate::storage::StorageManager;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reason recorded by whichever task hit a fatal condition first
#[derive(Clone, Default)]
struct FatalSlot {
    reason: Arc<Mutex<Option<String>>>,
}

impl FatalSlot {
    fn record(&self, reason: String, shutdown: &ShutdownSignal) {
        error!("Fatal: {reason}");
        if let Ok(mut slot) = self.reason.lock() {
            slot.get_or_insert(reason);
        }
        shutdown.trigger();
    }

    fn get(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Addresses bound by `start`
#[derive(Debug, Clone, Copy, Default)]
struct Endpoints {
    gossip: Option<SocketAddr>,
    directory: Option<SocketAddr>,
}

/// One node process. The mode is fixed at construction.
///
/// `new` opens the ledger and validates it, `start` brings up the mode's
/// listeners and workers, `shutdown` tears everything down again. All
/// workers watch the same `ShutdownSignal` and are joined through one
/// `TaskGroup` before the store is closed.
pub struct Node {
    config: Config,
    mode: NodeMode,
    identity: NodeIdentity,
    ledger: Arc<Ledger>,
    registry: Arc<PeerRegistry>,
    shutdown: ShutdownSignal,
    tasks: TaskGroup,
    fatal: FatalSlot,
    endpoints: Mutex<Endpoints>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Node {
    pub fn new(config: Config) -> Result<Node> {
        let mode = config.mode()?;

        let db_path = config.database_dir();
        let storage = Arc::new(StorageManager::open(&db_path)?);
        info!("Opened ledger at {}", db_path.display());
        let ledger = Arc::new(Ledger::new(storage));

        let status = match ChainIntegrity::new(&ledger).check() {
            Ok(outcome) => report_integrity(&outcome),
            Err(e) => {
                let _ = ledger.storage().close();
                return Err(e);
            }
        };
        info!(
            "Ledger at block {} ({})",
            status.last_block, status.last_hash
        );

        let identity = NodeIdentity::load_or_create(&config.keystore_path())?;
        let registry = Arc::new(PeerRegistry::new(PeerInfo::new(
            &config.node.address,
            config.node.port,
            identity.id(),
            mode,
        )));

        Ok(Node {
            config,
            mode,
            identity,
            ledger,
            registry,
            shutdown: ShutdownSignal::new(),
            tasks: TaskGroup::new(),
            fatal: FatalSlot::default(),
            endpoints: Mutex::new(Endpoints::default()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn id(&self) -> &str {
        self.identity.id()
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Gossip listen address once started
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.endpoints.lock().ok().and_then(|e| e.gossip)
    }

    /// Peer directory address once started (directory modes only)
    pub fn directory_addr(&self) -> Option<SocketAddr> {
        self.endpoints.lock().ok().and_then(|e| e.directory)
    }

    /// Why the node stopped on its own, if it did
    pub fn fatal_reason(&self) -> Option<String> {
        self.fatal.get()
    }

    /// Bring up the listeners and workers for this node's mode
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(BlockchainError::Config("node already started".to_string()));
        }
        info!("Starting {} node {}", self.mode, self.id());

        let transport = GossipTransport::bind(
            &self.config.node_listen_addr(),
            self.registry.clone(),
            self.shutdown.clone(),
            self.tasks.clone(),
        )?;
        self.set_endpoint(|e| e.gossip = Some(transport.listen_addr()));

        match self.mode {
            NodeMode::Node => self.run_participant(&transport),
            NodeMode::Seed | NodeMode::SuperNode | NodeMode::Dns => {
                self.restore_peers();
                // dns nodes bind the transport for identity only
                if self.mode.gossips() {
                    self.run_gossip(&transport)?;
                }
                self.run_directory()
            }
        }
    }

    /// Block until the shutdown signal fires
    pub fn wait(&self) {
        self.shutdown.wait();
    }

    /// Stop every worker and close the store. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.trigger();
        info!("Shutting down {} node", self.mode);

        if self.mode.serves_directory() {
            if let Err(e) = self.registry.save_to(self.ledger.storage().peers()) {
                error!("Failed to save peer snapshot: {e}");
            }
        }

        self.tasks.join_all();
        self.ledger.storage().close()?;
        info!("Node stopped");
        Ok(())
    }

    fn set_endpoint(&self, update: impl FnOnce(&mut Endpoints)) {
        if let Ok(mut endpoints) = self.endpoints.lock() {
            update(&mut endpoints);
        }
    }

    fn run_participant(&self, transport: &GossipTransport) -> Result<()> {
        let bootstrap = self.config.node.bootstrap.as_deref();
        if let Some(addr) = bootstrap {
            info!("Connecting to seed {addr}");
            if let Err(e) = connect_bootstrap(transport, addr) {
                warn!("Could not reach seed {addr}: {e}");
            }
        }

        let channel = self.run_gossip(transport)?;

        if self.config.node.dev_generator && bootstrap.is_none() {
            let ledger = self.ledger.clone();
            let shutdown = self.shutdown.clone();
            let fatal = self.fatal.clone();
            let interval = Duration::from_secs(self.config.node.generator_interval_secs.max(1));
            self.tasks.spawn("generator", move || {
                if let Err(e) = run_generator(&ledger, &channel, interval, &shutdown) {
                    fatal.record(format!("block generator failed: {e}"), &shutdown);
                }
            })?;
        }
        Ok(())
    }

    /// Join the block topic and start the receive loop
    fn run_gossip(&self, transport: &GossipTransport) -> Result<Arc<GossipChannel>> {
        let topic = match transport.join(BLOCKS_TOPIC) {
            Ok(topic) => topic,
            Err(e) => {
                let reason = format!("could not join '{BLOCKS_TOPIC}': {e}");
                self.fatal.record(reason.clone(), &self.shutdown);
                return Err(BlockchainError::Network(reason));
            }
        };
        let channel = Arc::new(GossipChannel::new(
            Box::new(topic),
            self.id(),
            self.ledger.clone(),
        ));

        let receiver = channel.clone();
        let shutdown = self.shutdown.clone();
        let fatal = self.fatal.clone();
        self.tasks.spawn("gossip-receive", move || {
            if let Err(e) = receiver.run(&shutdown) {
                fatal.record(format!("gossip subscription failed: {e}"), &shutdown);
            }
        })?;
        Ok(channel)
    }

    fn run_directory(&self) -> Result<()> {
        let server = DirectoryServer::start(
            &self.config.dns_listen_addr(),
            PeerDirectory::new(self.registry.clone()),
            self.shutdown.clone(),
            self.tasks.clone(),
        )?;
        self.set_endpoint(|e| e.directory = Some(server.local_addr()));
        Ok(())
    }

    fn restore_peers(&self) {
        if let Err(e) = self.registry.load_from(self.ledger.storage().peers()) {
            warn!("Could not restore peer snapshot: {e}");
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Error during node shutdown: {e}");
        }
    }
}

fn report_integrity(outcome: &IntegrityOutcome) -> Status {
    match outcome {
        IntegrityOutcome::GenesisInitialized(_) => info!("Fresh ledger, created genesis block"),
        IntegrityOutcome::CursorTrusted(_) => info!("Ledger cursor verified"),
        IntegrityOutcome::Rescanned(_) => info!("Ledger cursor rebuilt by rescan"),
    }
    outcome.status().clone()
}

fn connect_bootstrap(transport: &GossipTransport, addr: &str) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| BlockchainError::Config(format!("expected host:port, got '{addr}'")))?;
    let port = port
        .parse()
        .map_err(|e| BlockchainError::Config(format!("bad port in '{addr}': {e}")))?;
    let target = resolve_to_socket_addr(host, port, DEFAULT_RESOLVE_TIMEOUT)?;
    transport.connect(&target.to_string())
}
