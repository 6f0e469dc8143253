// Shared accept loop for the gossip transport and the peer directory.
// The listener is polled in non-blocking mode so the loop notices the
// shutdown signal; each accepted connection gets its own tracked thread.

use crate::error::{BlockchainError, Result};
use crate::runtime::{ShutdownSignal, TaskGroup};
use log::{error, info, warn};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub type ConnectionHandler = Arc<dyn Fn(TcpStream, SocketAddr) -> Result<()> + Send + Sync>;

pub fn bind(addr: &str) -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr)
        .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
    listener.set_nonblocking(true).map_err(|e| {
        BlockchainError::Network(format!("Failed to configure listener on {addr}: {e}"))
    })?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

/// Spawn the accept loop as a task named `name`
pub fn serve(
    name: &'static str,
    listener: TcpListener,
    shutdown: ShutdownSignal,
    tasks: TaskGroup,
    handler: ConnectionHandler,
) -> Result<()> {
    let worker_tasks = tasks.clone();
    tasks.spawn(name, move || {
        accept_loop(name, listener, shutdown, worker_tasks, handler)
    })
}

fn accept_loop(
    name: &'static str,
    listener: TcpListener,
    shutdown: ShutdownSignal,
    tasks: TaskGroup,
    handler: ConnectionHandler,
) {
    while !shutdown.is_triggered() {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                let handler = handler.clone();
                let spawned = tasks.spawn(&format!("{name}-conn"), move || {
                    let result = stream
                        .set_nonblocking(false)
                        .map_err(BlockchainError::from)
                        .and_then(|_| handler(stream, peer_addr));
                    if let Err(e) = result {
                        warn!("Error handling connection from {peer_addr}: {e}");
                    }
                });
                if let Err(e) = spawned {
                    error!("Dropping connection from {peer_addr}: {e}");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                tasks.reap_finished();
                shutdown.wait_timeout(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!("Error accepting connection: {e}");
                shutdown.wait_timeout(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    if let Ok(addr) = listener.local_addr() {
        info!("{name} on {addr} stopped");
    }
}
