//! Lighting transport: socket ownership and lifecycle
//!
//! A transport owns a data plane socket (binary sACN packets) and a control
//! plane socket (JSON messages) and plays one of two roles:
//!
//! - `Server`: sends levels and override messages to clients
//! - `Client`: receives them
//!
//! ```text
//! Uninitialized --setup()--> Ready --broadcast()--> Broadcasting
//!                              |  \--receive()----> Receiving
//!                              v
//!               close_connection() from any state --> Closed
//! ```
//!
//! Only `setup()` can fail. After setup every call absorbs network and
//! protocol errors, logs them, and reports through its return value.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::config::{NetworkConfig, NetworkMode};
use crate::constants::MAX_CONTROL_MESSAGE_SIZE;
use crate::error::{ConfigError, NetworkError};
use crate::network::receiver::SequenceTracker;
use crate::network::udp::{self, SocketOptions, UdpSocket, BROADCAST_ADDR};
use crate::protocol::e131::{PacketEncoder, MAX_PACKET_LEN};

/// Which side of the link this transport is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    /// Role for a configured network mode, `None` when networking is off
    pub fn from_mode(mode: NetworkMode) -> Option<Self> {
        match mode {
            NetworkMode::Server => Some(Role::Server),
            NetworkMode::Client => Some(Role::Client),
            NetworkMode::Disabled => None,
        }
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Uninitialized,
    Ready,
    Broadcasting,
    Receiving,
    Closed,
}

/// Where the server sends data plane packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTarget {
    /// One multicast group per universe
    Multicast,
    Unicast(IpAddr),
    Broadcast,
}

impl DataTarget {
    /// Multicast if enabled, else the first unicast address, else broadcast
    pub fn resolve(config: &NetworkConfig) -> Self {
        if config.enable_multicast {
            DataTarget::Multicast
        } else if let Some(addr) = config.unicast_addresses.first() {
            DataTarget::Unicast(*addr)
        } else {
            DataTarget::Broadcast
        }
    }

    /// Destination for a packet of `universe`
    pub fn address_for(&self, universe: u16, port: u16) -> SocketAddr {
        match *self {
            DataTarget::Multicast => {
                SocketAddr::new(IpAddr::V4(udp::multicast_group(universe)), port)
            }
            DataTarget::Unicast(addr) => SocketAddr::new(addr, port),
            DataTarget::Broadcast => SocketAddr::new(IpAddr::V4(BROADCAST_ADDR), port),
        }
    }
}

impl std::fmt::Display for DataTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataTarget::Multicast => write!(f, "multicast"),
            DataTarget::Unicast(addr) => write!(f, "unicast {}", addr),
            DataTarget::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub invalid_packets: u64,
    pub out_of_order: u64,
    pub control_sent: u64,
    pub control_received: u64,
}

/// sACN lighting transport with a JSON control plane
pub struct LightingTransport {
    pub(crate) role: Role,
    pub(crate) config: NetworkConfig,
    pub(crate) num_channels: usize,
    pub(crate) state: TransportState,
    pub(crate) playing: bool,

    pub(crate) data_socket: Option<UdpSocket>,
    pub(crate) control_socket: Option<UdpSocket>,

    // Server side
    pub(crate) encoder: PacketEncoder,
    pub(crate) target: DataTarget,
    pub(crate) sequence: u8,

    // Client side
    pub(crate) sequences: SequenceTracker,
    pub(crate) channel_state: Vec<f32>,
    pub(crate) recv_buffer: Vec<u8>,
    pub(crate) control_buffer: Vec<u8>,

    pub(crate) stats: TransportStats,
}

impl LightingTransport {
    /// Create a transport without opening any socket
    pub fn new(
        role: Role,
        config: NetworkConfig,
        num_channels: usize,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if num_channels == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "hardware.gpio_len",
                reason: "at least one channel is required".into(),
            });
        }
        if config.last_universe(num_channels).is_none() {
            return Err(ConfigError::InvalidUniverse(
                config.universe_start as u32 + config.universe_count(num_channels) as u32 - 1,
            ));
        }

        Ok(Self {
            role,
            encoder: PacketEncoder::new(&config.source_name, config.priority),
            target: DataTarget::resolve(&config),
            config,
            num_channels,
            state: TransportState::Uninitialized,
            playing: false,
            data_socket: None,
            control_socket: None,
            sequence: 0,
            sequences: SequenceTracker::new(),
            channel_state: vec![0.0; num_channels],
            recv_buffer: vec![0u8; MAX_PACKET_LEN + 64],
            control_buffer: vec![0u8; MAX_CONTROL_MESSAGE_SIZE],
            stats: TransportStats::default(),
        })
    }

    /// Create a transport and open its sockets
    pub fn open(
        role: Role,
        config: NetworkConfig,
        num_channels: usize,
    ) -> Result<Self, ConfigError> {
        let mut transport = Self::new(role, config, num_channels)?;
        transport.setup()?;
        Ok(transport)
    }

    /// Open the data and control sockets for this role.
    ///
    /// A data plane failure is fatal. A control plane failure only disables
    /// override delivery.
    pub fn setup(&mut self) -> Result<(), ConfigError> {
        match self.state {
            TransportState::Uninitialized => {}
            TransportState::Closed => {
                tracing::warn!("setup() called on a closed transport, ignoring");
                return Ok(());
            }
            _ => {
                tracing::debug!("Transport already set up");
                return Ok(());
            }
        }

        match self.role {
            Role::Server => self.setup_server()?,
            Role::Client => self.setup_client()?,
        }

        self.state = TransportState::Ready;
        Ok(())
    }

    fn setup_server(&mut self) -> Result<(), NetworkError> {
        let any = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

        let data_options = if self.config.enable_multicast {
            SocketOptions {
                reuse_address: true,
                multicast_ttl: Some(self.config.multicast_ttl),
                ..Default::default()
            }
        } else {
            SocketOptions {
                reuse_address: true,
                broadcast: true,
                ..Default::default()
            }
        };
        self.data_socket = Some(udp::create_socket(any, &data_options)?);

        tracing::info!(
            "sACN server initialized: {} on port {}, universe {}, {} channels",
            self.target,
            self.config.sacn_port,
            self.config.universe_start,
            self.num_channels
        );

        let control_options = SocketOptions {
            reuse_address: true,
            broadcast: true,
            ..Default::default()
        };
        self.control_socket = match udp::create_socket(any, &control_options) {
            Ok(socket) => {
                tracing::info!("Control plane initialized, port {}", self.config.control_port);
                Some(socket)
            }
            Err(e) => {
                tracing::warn!("Control plane unavailable: {}", e);
                None
            }
        };

        Ok(())
    }

    fn setup_client(&mut self) -> Result<(), NetworkError> {
        let data_addr = SocketAddr::new(self.config.bind_address, self.config.sacn_port);
        let data_options = SocketOptions {
            reuse_address: true,
            read_timeout: Some(self.config.receive_timeout()),
            ..Default::default()
        };
        let data_socket = udp::create_socket(data_addr, &data_options)?;

        if self.config.enable_multicast {
            let interface = match self.config.bind_address {
                IpAddr::V4(addr) => addr,
                IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
            };
            for universe in self.universes() {
                let group = udp::multicast_group(universe);
                udp::join_multicast(&data_socket, group, interface)?;
                tracing::info!("Joined multicast group {} for universe {}", group, universe);
            }
        }

        tracing::info!(
            "sACN client listening on {}, universes {}-{}, {} channels",
            data_socket.local_addr().map_err(|e| NetworkError::BindFailed(e.to_string()))?,
            self.config.universe_start,
            self.universes().last().unwrap_or(self.config.universe_start),
            self.num_channels
        );
        self.data_socket = Some(data_socket);

        let control_addr = SocketAddr::new(self.config.bind_address, self.config.control_port);
        let control_options = SocketOptions {
            reuse_address: true,
            read_timeout: Some(self.config.control_timeout()),
            ..Default::default()
        };
        self.control_socket = match udp::create_socket(control_addr, &control_options) {
            Ok(socket) => {
                tracing::info!("Control plane listening on {}", control_addr);
                Some(socket)
            }
            Err(e) => {
                tracing::warn!("Control plane unavailable: {}", e);
                None
            }
        };

        Ok(())
    }

    /// Release both sockets. Safe to call at any time, any number of times.
    pub fn close_connection(&mut self) {
        if self.state == TransportState::Closed {
            return;
        }
        self.data_socket = None;
        self.control_socket = None;
        self.playing = false;
        self.state = TransportState::Closed;
        tracing::info!("Lighting transport closed");
    }

    /// Whether steady-state calls may proceed, logging why not
    pub(crate) fn check_usable(&self, operation: &str, role: Role) -> bool {
        if self.role != role {
            tracing::warn!("{}() is not available in {:?} role", operation, self.role);
            return false;
        }
        match self.state {
            TransportState::Closed => {
                tracing::debug!("Transport closed, skipping {}()", operation);
                false
            }
            TransportState::Uninitialized => {
                tracing::warn!("Transport not set up, skipping {}()", operation);
                false
            }
            _ => true,
        }
    }

    /// Universes covered by this transport's channel count
    pub fn universes(&self) -> impl Iterator<Item = u16> {
        let start = self.config.universe_start;
        let count = self.config.universe_count(self.num_channels) as u16;
        start..start + count
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            self.state,
            TransportState::Ready | TransportState::Broadcasting | TransportState::Receiving
        )
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn data_target(&self) -> DataTarget {
        self.target
    }

    /// Whether the control plane socket is open
    pub fn has_control_plane(&self) -> bool {
        self.control_socket.is_some()
    }

    /// Local address of the data plane socket
    pub fn data_local_addr(&self) -> Option<SocketAddr> {
        self.data_socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Local address of the control plane socket
    pub fn control_local_addr(&self) -> Option<SocketAddr> {
        self.control_socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn set_playing(&mut self) {
        self.playing = true;
    }

    pub fn unset_playing(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

impl Drop for LightingTransport {
    fn drop(&mut self) {
        self.close_connection();
    }
}
