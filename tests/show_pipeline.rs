use lightshow_sync::config::{AppConfig, NetworkMode};
use lightshow_sync::error::OutputError;
use lightshow_sync::output::LightOutput;
use lightshow_sync::overrides::{OverrideMode, OverrideSets};
use lightshow_sync::show::{ClientShow, ServerShow};
use std::f32::consts::PI;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const CHANNELS: usize = 4;
const CHUNK: usize = 2048;

#[derive(Clone, Default)]
struct SharedOutput {
    frames: Arc<Mutex<Vec<Vec<f32>>>>,
}

impl SharedOutput {
    fn last(&self) -> Option<Vec<f32>> {
        self.frames.lock().unwrap().last().cloned()
    }
}

impl LightOutput for SharedOutput {
    fn channel_count(&self) -> usize {
        CHANNELS
    }

    fn set_level(&mut self, _channel: usize, _level: f32) -> Result<(), OutputError> {
        Ok(())
    }

    fn write_frame(&mut self, frame: &[f32]) -> Result<(), OutputError> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}

fn base_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.audio.chunk_size = CHUNK;
    config.hardware.gpio_len = CHANNELS;
    config
}

/// A client show on loopback and a server show unicasting to it
fn show_pair(server_overrides: &[u32]) -> (ServerShow, ClientShow, SharedOutput) {
    let mut client_config = base_config();
    client_config.network.mode = NetworkMode::Client;
    client_config.network.bind_address = LOCALHOST;
    client_config.network.sacn_port = 0;
    client_config.network.control_port = 0;
    client_config.network.receive_timeout_ms = 1000;
    client_config.network.control_timeout_ms = 500;

    let output = SharedOutput::default();
    let client = ClientShow::new(&client_config, Box::new(output.clone())).unwrap();

    let mut server_config = base_config();
    server_config.network.mode = NetworkMode::Server;
    server_config.network.unicast_addresses = vec![LOCALHOST];
    server_config.network.sacn_port = client.transport().data_local_addr().unwrap().port();
    server_config.network.control_port = client.transport().control_local_addr().unwrap().port();
    server_config.overrides.always_on = server_overrides.to_vec();

    let server = ServerShow::new(&server_config).unwrap();
    (server, client, output)
}

fn sine(frequency: f32, sample_rate: u32) -> Vec<i16> {
    (0..CHUNK)
        .map(|i| ((2.0 * PI * frequency * i as f32 / sample_rate as f32).sin() * 30000.0) as i16)
        .collect()
}

#[test]
fn test_server_to_client_with_overrides() {
    let (mut server, mut client, output) = show_pair(&[2]);

    let sent = server.tick(&[0; CHUNK]);
    assert_eq!(sent, vec![0.0, 0.0, 1.0, 0.0]);

    let received = client.tick().expect("frame should arrive");
    assert_eq!(received, sent);
    assert_eq!(output.last(), Some(sent));
    assert_eq!(client.overrides().mode(2), OverrideMode::AlwaysOn);
}

#[test]
fn test_override_change_reaches_client() {
    let (mut server, mut client, output) = show_pair(&[]);

    server.tick(&[0; CHUNK]);
    client.tick().unwrap();

    server.set_overrides(&OverrideSets::new([], [0, 3], [1]));
    server.tick(&[0; CHUNK]);
    let frame = client.tick().unwrap();

    assert_eq!(frame, vec![1.0, 1.0, 0.0, 1.0]);
    assert_eq!(client.overrides().mode(1), OverrideMode::Inverted);
    assert_eq!(output.frames.lock().unwrap().len(), 2);
}

#[test]
fn test_tone_lights_one_channel() {
    let (mut server, mut client, _output) = show_pair(&[]);
    let sample_rate = server.engine().config().sample_rate;

    let band = &server.engine().frequency_bands()[2];
    let tone = (band.low_hz + band.high_hz) / 2.0;

    let sent = server.tick(&sine(tone, sample_rate));
    let received = client.tick().unwrap();

    assert!(sent[2] > 0.5, "levels {:?}", sent);
    for (s, r) in sent.iter().zip(&received) {
        assert!((s - r).abs() <= 1.0 / 255.0);
    }
}

#[test]
fn test_shutdown_stops_ticks() {
    let (mut server, mut client, _output) = show_pair(&[0, 1, 2, 3]);
    server.tick(&[0; CHUNK]);
    assert_eq!(client.tick().unwrap(), vec![1.0; CHANNELS]);

    client.shutdown();
    server.shutdown();

    assert!(client.tick().is_none());
    assert!(server.transport().map_or(true, |t| !t.is_ready()));
}
