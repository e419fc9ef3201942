//! Network subsystem: sACN data plane and JSON control plane over UDP

pub mod udp;
pub mod transport;
pub mod sender;
pub mod receiver;

pub use udp::{UdpSocket, create_socket};
pub use transport::{DataTarget, LightingTransport, Role, TransportState, TransportStats};
pub use sender::split_universes;
pub use receiver::{SequenceCheck, SequenceTracker};
