//! UDP socket construction
//!
//! Sockets are built with socket2 so address reuse, broadcast and multicast
//! options are set before bind, then handed out as std sockets.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

pub use std::net::UdpSocket;

use crate::error::NetworkError;

/// Limited broadcast address used when no explicit target is configured
pub const BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Socket options applied before bind
#[derive(Debug, Clone, Default)]
pub struct SocketOptions {
    pub reuse_address: bool,
    pub broadcast: bool,
    /// Set the multicast TTL (1 keeps traffic on the local subnet)
    pub multicast_ttl: Option<u32>,
    /// Blocking receive timeout; `None` blocks forever
    pub read_timeout: Option<Duration>,
}

/// Create and bind a UDP socket
pub fn create_socket(
    bind_addr: SocketAddr,
    options: &SocketOptions,
) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::SocketFailed(e.to_string()))?;

    if options.reuse_address {
        socket
            .set_reuse_address(true)
            .map_err(|e| NetworkError::SocketFailed(format!("SO_REUSEADDR: {}", e)))?;
    }

    if options.broadcast {
        socket
            .set_broadcast(true)
            .map_err(|e| NetworkError::SocketFailed(format!("SO_BROADCAST: {}", e)))?;
    }

    if let Some(ttl) = options.multicast_ttl {
        socket
            .set_multicast_ttl_v4(ttl)
            .map_err(|e| NetworkError::SocketFailed(format!("IP_MULTICAST_TTL: {}", e)))?;
    }

    if let Some(timeout) = options.read_timeout {
        socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| NetworkError::SocketFailed(format!("SO_RCVTIMEO: {}", e)))?;
    }

    socket
        .bind(&SockAddr::from(bind_addr))
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind_addr, e)))?;

    Ok(socket.into())
}

/// Join the multicast group on the given interface
pub fn join_multicast(
    socket: &UdpSocket,
    group: Ipv4Addr,
    interface: Ipv4Addr,
) -> Result<(), NetworkError> {
    socket
        .join_multicast_v4(&group, &interface)
        .map_err(|e| NetworkError::MulticastJoin {
            group,
            reason: e.to_string(),
        })
}

/// sACN multicast group for a universe: 239.255.<hi>.<lo>
pub fn multicast_group(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(239, 255, hi, lo)
}

/// Whether an I/O error is just an expired receive timeout
pub fn is_timeout(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
