use crate::error::{BlockchainError, Result};
use log::debug;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve `host` and pair the first IPv4 address with `port`.
///
/// The system resolver has no timeout of its own, so the lookup runs on a
/// helper thread and is abandoned once `timeout` passes.
pub fn resolve_to_socket_addr(host: &str, port: u16, timeout: Duration) -> Result<SocketAddr> {
    let query = format!("{host}:{port}");
    let (sender, receiver) = mpsc::channel();

    let lookup = query.clone();
    thread::Builder::new()
        .name("resolve".to_string())
        .spawn(move || {
            let result = lookup
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<_>>());
            let _ = sender.send(result);
        })
        .map_err(|e| BlockchainError::Network(format!("Failed to start lookup: {e}")))?;

    let addrs = receiver
        .recv_timeout(timeout)
        .map_err(|_| {
            BlockchainError::Network(format!("Timed out resolving '{host}' after {timeout:?}"))
        })?
        .map_err(|e| BlockchainError::Network(format!("Failed to resolve address '{host}': {e}")))?;

    let resolved = addrs
        .into_iter()
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| BlockchainError::Network(format!("No IPv4 address found for '{host}'")))?;
    debug!("Resolved {query} to {resolved}");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ip_literal() {
        let addr = resolve_to_socket_addr("127.0.0.1", 45050, DEFAULT_RESOLVE_TIMEOUT).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:45050");
    }

    #[test]
    fn test_ipv6_only_has_no_ipv4() {
        assert!(resolve_to_socket_addr("::1", 1, DEFAULT_RESOLVE_TIMEOUT).is_err());
    }
}
