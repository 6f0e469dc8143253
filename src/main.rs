// Entry point for the nosod binary
// Every command loads the config first so logging and paths come from one place
use clap::Parser;
use log::{debug, error, info};
use noso_node::{
    address_from_public_key, is_valid_address, query_directory, AddressKind, BlockchainError,
    ChainIntegrity, Command, Config, DirectoryRequest, Encoding, Ledger, Node, Opt, StorageManager,
};
use std::path::Path;
use std::process;
use std::sync::Arc;

fn main() {
    let opt = Opt::parse();

    let config = match Config::load(opt.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    // config level first, RUST_LOG on top
    env_logger::Builder::new()
        .parse_filters(&config.log_level)
        .parse_default_env()
        .init();
    match &config.loaded_from {
        Some(file) => debug!("Loaded config from {}", file.display()),
        None => info!("No config file found, using defaults"),
    }

    if let Err(e) = run_command(opt.command, config, opt.config.as_deref()) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(
    command: Command,
    mut config: Config,
    config_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Init => {
            let dir = match config_file.and_then(Path::parent) {
                Some(dir) => dir.to_path_buf(),
                None => Config::default_config_dir()?,
            };
            let file = Config::write_default(&dir)?;
            let config = Config::load(Some(file.as_path()))?;
            let ledger = open_ledger(&config)?;
            ChainIntegrity::new(&ledger).check()?;
            ledger.storage().close()?;
            println!("Wrote {}", file.display());
            println!("Created ledger at {}", config.database_dir().display());
        }
        Command::Node {
            node_address,
            node_port,
            node_mode,
            dns_address,
            dns_port,
            seed,
        } => {
            if let Some(address) = node_address {
                config.node.address = address;
            }
            if let Some(port) = node_port {
                config.node.port = port;
            }
            if let Some(mode) = node_mode {
                config.node.mode = mode;
            }
            if let Some(address) = dns_address {
                config.dns.address = address;
            }
            if let Some(port) = dns_port {
                config.dns.port = port;
            }
            if seed.is_some() {
                config.node.bootstrap = seed;
            }
            run_node(config)?;
        }
        Command::Status => {
            // read only: an empty or stale store is reported, never repaired
            let ledger = open_ledger(&config)?;
            let report = ChainIntegrity::new(&ledger).inspect()?;
            let storage = ledger.storage();
            let summary = serde_json::json!({
                "last_block": report.tip.as_ref().map(|s| s.last_block),
                "last_hash": report.tip.as_ref().map(|s| s.last_hash.clone()),
                "cursor": report.cursor,
                "cursor_current": report.cursor_is_current(),
                "blocks": storage.blocks().count()?,
                "transactions": storage.transactions().count()?,
                "pending_transactions": storage.pending_transactions().count()?,
                "peers": storage.peers().count()?,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            storage.close()?;
        }
        Command::Blocks { from, to } => {
            let ledger = open_ledger(&config)?;
            let to = match to {
                Some(to) => to,
                None => ledger.status()?.last_block + 1,
            };
            for block in ledger.blocks_in_range(from, to)? {
                println!("{}", serde_json::to_string_pretty(&block)?);
            }
            ledger.storage().close()?;
        }
        Command::Peers {
            dns,
            query,
            address,
            binary,
        } => {
            let target = dns.unwrap_or_else(|| config.dns_listen_addr());
            let encoding = if binary {
                Encoding::Binary
            } else {
                Encoding::Json
            };
            let request = DirectoryRequest::new(query.into_query(address)?, encoding);
            let response = query_directory(&target, &request)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Address {
            public_key,
            multisig,
        } => {
            let kind = if multisig {
                AddressKind::Multisig
            } else {
                AddressKind::Normal
            };
            println!("{}", address_from_public_key(&public_key, kind));
        }
        Command::ValidateAddress { address } => {
            if !is_valid_address(&address) {
                return Err(BlockchainError::InvalidAddress(address).into());
            }
            println!("Address {address} is valid");
        }
    }
    Ok(())
}

fn open_ledger(config: &Config) -> Result<Ledger, BlockchainError> {
    let storage = StorageManager::open(config.database_dir())?;
    Ok(Ledger::new(Arc::new(storage)))
}

fn run_node(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let node = Node::new(config)?;

    let signal = node.shutdown_signal();
    ctrlc::set_handler(move || {
        if signal.trigger() {
            info!("Received termination signal");
        }
    })?;

    if let Err(e) = node.start() {
        node.shutdown()?;
        return Err(e.into());
    }
    node.wait();
    node.shutdown()?;

    match node.fatal_reason() {
        Some(reason) => Err(reason.into()),
        None => Ok(()),
    }
}
