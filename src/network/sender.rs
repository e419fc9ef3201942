//! Server role: data plane broadcast and override delivery

use std::net::{IpAddr, SocketAddr};

use crate::constants::MAX_UNIVERSE;
use crate::network::transport::{LightingTransport, Role, TransportState};
use crate::network::udp::BROADCAST_ADDR;
use crate::overrides::OverrideSets;
use crate::protocol::control::ControlMessage;
use crate::protocol::level_to_dmx;

/// Split channel slots into universes of at most `boundary` slots.
///
/// An empty frame still yields one single-slot universe. Universes past the
/// sACN range are dropped.
pub fn split_universes(channels: &[u8], universe_start: u16, boundary: usize) -> Vec<(u16, &[u8])> {
    const EMPTY_UNIVERSE: &[u8] = &[0];

    if channels.is_empty() {
        return vec![(universe_start, EMPTY_UNIVERSE)];
    }

    channels
        .chunks(boundary.max(1))
        .enumerate()
        .map_while(|(index, chunk)| {
            u16::try_from(index)
                .ok()
                .and_then(|offset| universe_start.checked_add(offset))
                .filter(|universe| *universe <= MAX_UNIVERSE)
                .map(|universe| (universe, chunk))
        })
        .collect()
}

impl LightingTransport {
    /// Send one frame of levels, one packet per universe.
    ///
    /// Levels are clamped to `[0.0, 1.0]` and rounded to DMX values. All
    /// universes of a frame share one sequence number, which advances once
    /// per call. Send failures are logged and the remaining universes are
    /// still sent. Returns the number of packets sent.
    pub fn broadcast(&mut self, frame: &[f32], use_overrides: bool) -> usize {
        if !self.check_usable("broadcast", Role::Server) {
            return 0;
        }
        let Some(socket) = self.data_socket.as_ref() else {
            return 0;
        };

        let dmx: Vec<u8> = frame.iter().map(|&level| level_to_dmx(level)).collect();
        let universes =
            split_universes(&dmx, self.config.universe_start, self.config.universe_boundary);
        let expected = dmx.len().div_ceil(self.config.universe_boundary).max(1);
        if universes.len() < expected {
            tracing::warn!(
                "Frame of {} channels exceeds the universe range, {} universes dropped",
                dmx.len(),
                expected - universes.len()
            );
        }

        let mut sent = 0;
        for (universe, data) in universes {
            let packet = match self.encoder.encode(universe, self.sequence, data) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::error!("Failed to encode universe {}: {}", universe, e);
                    continue;
                }
            };

            let target = self.target.address_for(universe, self.config.sacn_port);
            match socket.send_to(&packet, target) {
                Ok(bytes) => {
                    sent += 1;
                    self.stats.packets_sent += 1;
                    self.stats.bytes_sent += bytes as u64;
                    tracing::trace!(
                        "Sent sACN packet: universe={}, seq={}, channels={}, overrides={}",
                        universe,
                        self.sequence,
                        data.len(),
                        use_overrides
                    );
                }
                Err(e) => {
                    self.stats.send_errors += 1;
                    tracing::error!("sACN send error to {}: {}", target, e);
                }
            }
        }

        self.sequence = self.sequence.wrapping_add(1);
        self.state = TransportState::Broadcasting;
        sent
    }

    /// Send the override sets as one control message to every unicast
    /// client, or to the broadcast address when none are configured.
    ///
    /// Delivery is best effort: there is no acknowledgement or retry.
    /// Returns whether at least one datagram was sent.
    pub fn broadcast_overrides(&mut self, overrides: &OverrideSets) -> bool {
        if !self.check_usable("broadcast_overrides", Role::Server) {
            return false;
        }
        let Some(socket) = self.control_socket.as_ref() else {
            tracing::debug!("Control plane not available, skipping override broadcast");
            return false;
        };

        let data = match ControlMessage::overrides(overrides).to_bytes() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Failed to encode override message: {}", e);
                return false;
            }
        };

        let port = self.config.control_port;
        let targets: Vec<SocketAddr> = if self.config.unicast_addresses.is_empty() {
            vec![SocketAddr::new(IpAddr::V4(BROADCAST_ADDR), port)]
        } else {
            self.config
                .unicast_addresses
                .iter()
                .map(|addr| SocketAddr::new(*addr, port))
                .collect()
        };

        let mut delivered = false;
        for target in targets {
            match socket.send_to(&data, target) {
                Ok(_) => {
                    delivered = true;
                    self.stats.control_sent += 1;
                    tracing::info!("Sent overrides to {}", target);
                }
                Err(e) => {
                    self.stats.send_errors += 1;
                    tracing::error!("Failed to send override message to {}: {}", target, e);
                }
            }
        }
        delivered
    }

    /// Sequence number the next frame will carry
    pub fn next_sequence(&self) -> u8 {
        self.sequence
    }
}
