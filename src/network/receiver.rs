//! Client role: data plane receive, sequence tracking, control messages

use std::collections::HashMap;

use crate::error::ProtocolError;
use crate::network::transport::{LightingTransport, Role, TransportState};
use crate::network::udp;
use crate::protocol::control::ControlMessage;
use crate::protocol::{dmx_to_level, e131};

/// Below this last-seen value a smaller sequence number counts as out of
/// order; at or above it the sender is assumed to have wrapped past 255
pub const SEQUENCE_WRAP_GUARD: u8 = 250;

/// Result of checking a packet's sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// First packet seen for the universe
    First,
    InOrder,
    /// Older than the last packet; applied anyway
    OutOfOrder { last: u8 },
}

/// Last sequence number seen per universe.
///
/// Detection only: late packets are still applied, there is no reordering.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last: HashMap<u16, u8>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sequence` for `universe` and classify it against the last one
    pub fn observe(&mut self, universe: u16, sequence: u8) -> SequenceCheck {
        let check = match self.last.get(&universe) {
            None => SequenceCheck::First,
            Some(&last) if sequence < last && last < SEQUENCE_WRAP_GUARD => {
                SequenceCheck::OutOfOrder { last }
            }
            Some(_) => SequenceCheck::InOrder,
        };
        self.last.insert(universe, sequence);
        check
    }

    pub fn last(&self, universe: u16) -> Option<u8> {
        self.last.get(&universe).copied()
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }
}

impl LightingTransport {
    /// Receive and apply one data packet.
    ///
    /// Blocks at most for the configured receive timeout. The packet
    /// overwrites the channels of its universe and the whole channel frame
    /// is returned. Returns `None` on timeout, on invalid packets, and on
    /// universes this client does not cover; the caller retries next tick.
    pub fn receive(&mut self) -> Option<Vec<f32>> {
        if !self.check_usable("receive", Role::Client) {
            return None;
        }
        let socket = self.data_socket.as_ref()?;

        let (len, source) = match socket.recv_from(&mut self.recv_buffer) {
            Ok(received) => received,
            Err(e) if udp::is_timeout(&e) => return None,
            Err(e) => {
                tracing::error!("Error receiving sACN packet: {}", e);
                return None;
            }
        };
        self.stats.packets_received += 1;
        self.stats.bytes_received += len as u64;

        let Some(packet) = e131::decode(&self.recv_buffer[..len]) else {
            self.stats.invalid_packets += 1;
            return None;
        };

        let Some(offset) = self.universe_offset(packet.universe) else {
            tracing::debug!(
                "Ignoring universe {} from {} (outside {}..={})",
                packet.universe,
                source,
                self.config.universe_start,
                self.universes().last().unwrap_or(self.config.universe_start)
            );
            return None;
        };

        let check = self.sequences.observe(packet.universe, packet.sequence);
        if let SequenceCheck::OutOfOrder { last } = check {
            self.stats.out_of_order += 1;
            tracing::warn!(
                "Out-of-order packet: universe={}, seq={} < {}",
                packet.universe,
                packet.sequence,
                last
            );
        }

        let end = (offset + self.config.universe_boundary).min(self.num_channels);
        for (i, slot) in self.channel_state[offset..end].iter_mut().enumerate() {
            *slot = packet.channel_data.get(i).copied().map_or(0.0, dmx_to_level);
        }

        tracing::trace!(
            "Received sACN packet: universe={}, seq={}, channels={}",
            packet.universe,
            packet.sequence,
            packet.channel_data.len()
        );

        self.state = TransportState::Receiving;
        Some(self.channel_state.clone())
    }

    /// Poll the control plane for one message.
    ///
    /// Waits at most for the short control timeout. Malformed JSON and
    /// messages without a `type` are logged and dropped.
    pub fn receive_control_message(&mut self) -> Option<ControlMessage> {
        if !self.check_usable("receive_control_message", Role::Client) {
            return None;
        }
        let socket = self.control_socket.as_ref()?;

        let (len, source) = match socket.recv_from(&mut self.control_buffer) {
            Ok(received) => received,
            Err(e) if udp::is_timeout(&e) => return None,
            Err(e) => {
                tracing::error!("Error receiving control message: {}", e);
                return None;
            }
        };

        match ControlMessage::from_slice(&self.control_buffer[..len]) {
            Ok(message) => {
                self.stats.control_received += 1;
                tracing::debug!("Received control message type '{}' from {}", message.kind, source);
                Some(message)
            }
            Err(ProtocolError::MissingMessageType) => {
                tracing::warn!("Control message missing 'type' field from {}", source);
                None
            }
            Err(e) => {
                tracing::warn!("Invalid control message from {}: {}", source, e);
                None
            }
        }
    }

    /// Offset of a universe's first channel in the local frame
    fn universe_offset(&self, universe: u16) -> Option<usize> {
        let index = universe.checked_sub(self.config.universe_start)? as usize;
        let offset = index * self.config.universe_boundary;
        (offset < self.num_channels).then_some(offset)
    }

    /// Last sequence number seen for a universe
    pub fn last_sequence(&self, universe: u16) -> Option<u8> {
        self.sequences.last(universe)
    }

    /// Current channel levels as last received
    pub fn channel_state(&self) -> &[f32] {
        &self.channel_state
    }
}
