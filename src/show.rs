//! Show orchestration: one tick per audio block on the server, one tick per
//! receive on the client

use std::time::{Duration, Instant};

use crate::analysis::BandEnergyEngine;
use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::network::{LightingTransport, Role};
use crate::output::LightOutput;
use crate::overrides::{ChannelOverrideTable, OverrideSets};
use crate::protocol::control::ControlMessage;

/// Server side of the show: audio in, levels out
pub struct ServerShow {
    engine: BandEnergyEngine,
    overrides: ChannelOverrideTable,
    transport: Option<LightingTransport>,
    output: Option<Box<dyn LightOutput>>,
    /// Periodic override resend, `None` when disabled
    resend_interval: Option<Duration>,
    last_override_send: Option<Instant>,
    frames: u64,
}

impl ServerShow {
    /// Build the analysis engine, the override table and, in server mode,
    /// an open server transport. With networking disabled the show only
    /// drives a local output.
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let channels = config.hardware.gpio_len;
        let engine = BandEnergyEngine::new(config.audio.analysis_config(channels))?;

        let transport = match Role::from_mode(config.network.mode) {
            Some(Role::Server) => Some(LightingTransport::open(
                Role::Server,
                config.network.clone(),
                channels,
            )?),
            Some(Role::Client) => {
                return Err(ConfigError::InvalidSetting {
                    name: "network.mode",
                    reason: "the server show runs in 'server' or 'disabled' mode".into(),
                });
            }
            None => {
                tracing::info!("Networking disabled, driving local output only");
                None
            }
        };

        let resend_secs = config.network.override_resend_secs;
        Ok(Self {
            engine,
            overrides: ChannelOverrideTable::from_sets(&config.overrides.to_sets()),
            transport,
            output: None,
            resend_interval: (resend_secs > 0).then(|| Duration::from_secs(resend_secs)),
            last_override_send: None,
            frames: 0,
        })
    }

    /// Also drive a local output every tick
    pub fn with_output(mut self, output: Box<dyn LightOutput>) -> Self {
        self.output = Some(output);
        self
    }

    /// Run one tick: analyse the block, broadcast the levels and drive the
    /// local output with overrides applied. Returns the local frame.
    ///
    /// Levels go on the wire without overrides; clients receive the table
    /// on the control plane and apply it themselves, so every override is
    /// applied exactly once per output.
    pub fn tick(&mut self, samples: &[i16]) -> Vec<f32> {
        let levels = self.engine.calculate_levels(samples);

        if self.override_resend_due() {
            self.send_overrides();
        }

        if let Some(transport) = self.transport.as_mut() {
            transport.broadcast(&levels, !self.overrides.is_empty());
        }

        let frame = self.overrides.apply(&levels);

        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.write_frame(&frame) {
                tracing::warn!("Local output failed: {}", e);
            }
        }

        self.frames += 1;
        frame
    }

    /// Replace the override table and push it to clients right away
    pub fn set_overrides(&mut self, sets: &OverrideSets) {
        self.overrides.replace(sets);
        tracing::info!(
            "Overrides set: {} off, {} on, {} inverted",
            sets.always_off.len(),
            sets.always_on.len(),
            sets.inverted.len()
        );
        self.send_overrides();
    }

    fn override_resend_due(&self) -> bool {
        if self.transport.is_none() {
            return false;
        }
        match (self.last_override_send, self.resend_interval) {
            (None, _) => true,
            (Some(last), Some(interval)) => last.elapsed() >= interval,
            (Some(_), None) => false,
        }
    }

    fn send_overrides(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        transport.broadcast_overrides(&self.overrides.to_sets());
        self.last_override_send = Some(Instant::now());
    }

    pub fn overrides(&self) -> &ChannelOverrideTable {
        &self.overrides
    }

    pub fn engine(&self) -> &BandEnergyEngine {
        &self.engine
    }

    pub fn transport(&self) -> Option<&LightingTransport> {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> Option<&mut LightingTransport> {
        self.transport.as_mut()
    }

    /// Ticks run so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Switch the local output off and close the transport
    pub fn shutdown(&mut self) {
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.all_off() {
                tracing::warn!("Failed to switch local output off: {}", e);
            }
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.unset_playing();
            transport.close_connection();
        }
        tracing::info!("Server show stopped after {} frames", self.frames);
    }
}

/// Client side of the show: network in, output out
pub struct ClientShow {
    transport: LightingTransport,
    overrides: ChannelOverrideTable,
    output: Box<dyn LightOutput>,
    frames: u64,
}

impl ClientShow {
    /// Open a client transport. `[overrides]` from the config is the
    /// initial table until the server sends its own.
    pub fn new(config: &AppConfig, output: Box<dyn LightOutput>) -> Result<Self, ConfigError> {
        let transport = LightingTransport::open(
            Role::Client,
            config.network.clone(),
            config.hardware.gpio_len,
        )?;

        if output.channel_count() < config.hardware.gpio_len {
            tracing::warn!(
                "Output drives {} channels, {} configured; extra channels are dropped",
                output.channel_count(),
                config.hardware.gpio_len
            );
        }

        Ok(Self {
            transport,
            overrides: ChannelOverrideTable::from_sets(&config.overrides.to_sets()),
            output,
            frames: 0,
        })
    }

    /// Run one tick: take at most one control message, then wait for one
    /// data packet. Returns the frame written to the output, or `None`
    /// when nothing arrived.
    pub fn tick(&mut self) -> Option<Vec<f32>> {
        if let Some(message) = self.transport.receive_control_message() {
            self.handle_control(&message);
        }

        let levels = self.transport.receive()?;
        let frame = self.overrides.apply(&levels);

        if let Err(e) = self.output.write_frame(&frame) {
            tracing::warn!("Output failed: {}", e);
        }
        self.frames += 1;
        Some(frame)
    }

    fn handle_control(&mut self, message: &ControlMessage) {
        if message.is_overrides() {
            self.overrides.update_from_message(message);
        } else {
            tracing::debug!("Ignoring control message of type '{}'", message.kind);
        }
    }

    pub fn overrides(&self) -> &ChannelOverrideTable {
        &self.overrides
    }

    pub fn transport(&self) -> &LightingTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut LightingTransport {
        &mut self.transport
    }

    /// Frames written so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Switch the output off and close the transport
    pub fn shutdown(&mut self) {
        if let Err(e) = self.output.all_off() {
            tracing::warn!("Failed to switch output off: {}", e);
        }
        self.transport.close_connection();
        tracing::info!("Client show stopped after {} frames", self.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkMode;
    use crate::error::OutputError;
    use std::sync::{Arc, Mutex};

    /// Output that records every frame it is given
    #[derive(Clone, Default)]
    struct RecordingOutput {
        frames: Arc<Mutex<Vec<Vec<f32>>>>,
        channels: usize,
    }

    impl LightOutput for RecordingOutput {
        fn channel_count(&self) -> usize {
            self.channels
        }

        fn set_level(&mut self, _channel: usize, _level: f32) -> Result<(), OutputError> {
            Ok(())
        }

        fn write_frame(&mut self, frame: &[f32]) -> Result<(), OutputError> {
            self.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    fn local_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.chunk_size = 1024;
        config.hardware.gpio_len = 4;
        config
    }

    #[test]
    fn test_silence_gives_dark_frame() {
        let output = RecordingOutput {
            channels: 4,
            ..Default::default()
        };
        let mut show = ServerShow::new(&local_config())
            .unwrap()
            .with_output(Box::new(output.clone()));

        let frame = show.tick(&[0; 1024]);

        assert_eq!(frame, vec![0.0; 4]);
        assert_eq!(show.frames(), 1);
        assert!(show.transport().is_none());
        assert_eq!(output.frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_config_overrides_applied() {
        let mut config = local_config();
        config.overrides.always_on = vec![1];
        config.overrides.inverted = vec![3];
        let mut show = ServerShow::new(&config).unwrap();

        let frame = show.tick(&[0; 1024]);
        assert_eq!(frame, vec![0.0, 1.0, 0.0, 1.0]);

        show.set_overrides(&OverrideSets::new([1], [], []));
        let frame = show.tick(&[0; 1024]);
        assert_eq!(frame, vec![0.0; 4]);
    }

    /// Output whose driver rejects every write
    struct FailingOutput;

    impl LightOutput for FailingOutput {
        fn channel_count(&self) -> usize {
            4
        }

        fn set_level(&mut self, _channel: usize, _level: f32) -> Result<(), OutputError> {
            Err(OutputError::Driver("pin export failed".into()))
        }
    }

    #[test]
    fn test_output_failure_does_not_stop_ticks() {
        let mut show = ServerShow::new(&local_config())
            .unwrap()
            .with_output(Box::new(FailingOutput));

        assert_eq!(show.tick(&[0; 1024]), vec![0.0; 4]);
        assert_eq!(show.tick(&[0; 1024]), vec![0.0; 4]);
        assert_eq!(show.frames(), 2);
        show.shutdown();
    }

    #[test]
    fn test_server_show_rejects_client_mode() {
        let mut config = local_config();
        config.network.mode = NetworkMode::Client;
        assert!(matches!(
            ServerShow::new(&config),
            Err(ConfigError::InvalidSetting { name: "network.mode", .. })
        ));
    }

    #[test]
    fn test_client_show_times_out_quietly() {
        let mut config = local_config();
        config.network.mode = NetworkMode::Client;
        config.network.bind_address = "127.0.0.1".parse().unwrap();
        config.network.sacn_port = 0;
        config.network.control_port = 0;
        config.network.receive_timeout_ms = 5;
        config.network.control_timeout_ms = 1;

        let output = RecordingOutput {
            channels: 4,
            ..Default::default()
        };
        let mut show = ClientShow::new(&config, Box::new(output.clone())).unwrap();

        assert!(show.tick().is_none());
        assert_eq!(show.frames(), 0);
        assert!(output.frames.lock().unwrap().is_empty());

        show.shutdown();
        assert!(show.tick().is_none());
    }
}
