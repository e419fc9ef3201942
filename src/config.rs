//! Application configuration
//!
//! All optional settings are resolved to concrete values when the file is
//! loaded. Components receive the section they need by reference and never
//! look anything up on their own.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::{AnalysisConfig, LevelScale};
use crate::constants::*;
use crate::error::ConfigError;
use crate::overrides::OverrideSets;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub hardware: HardwareConfig,
    pub network: NetworkConfig,
    pub overrides: OverrideConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;

        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from an explicit path, the per-user config file, or defaults,
    /// in that order
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(default_path) if default_path.exists() => Self::load(default_path),
            _ => {
                tracing::info!("No configuration file found, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Per-user configuration file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "lightshow", "lightshow-sync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Switch the network role to `mode`, warning when the file said
    /// otherwise. Returns whether the mode changed.
    pub fn require_mode(&mut self, mode: NetworkMode) -> bool {
        if self.network.mode == mode {
            return false;
        }
        tracing::warn!(
            "Network mode is {:?}, running as {:?} anyway",
            self.network.mode,
            mode
        );
        self.network.mode = mode;
        true
    }

    /// Check every section for values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hardware.gpio_len == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "hardware.gpio_len",
                reason: "at least one channel is required".into(),
            });
        }
        self.audio.analysis_config(self.hardware.gpio_len).validate()?;
        self.network.validate()?;
        Ok(())
    }
}

/// Audio analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per analysis block
    pub chunk_size: usize,
    /// Sample rate of the incoming PCM stream
    pub sample_rate: u32,
    /// Interleaved channels in the PCM stream (downmixed to mono)
    pub input_channels: u16,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// 1-based frequency band index per light channel
    pub custom_channel_mapping: Option<Vec<usize>>,
    /// Explicit band edges in Hz
    pub custom_channel_frequencies: Option<Vec<f32>>,
    /// Accepted for older config files; analysis always runs on the CPU
    pub use_gpu: bool,
    pub level_scale: LevelScale,
    /// Pace ticks to the audio clock when reading from a non-realtime source
    pub realtime_pacing: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            input_channels: DEFAULT_INPUT_CHANNELS,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            custom_channel_mapping: None,
            custom_channel_frequencies: None,
            use_gpu: false,
            level_scale: LevelScale::default(),
            realtime_pacing: true,
        }
    }
}

impl AudioConfig {
    /// Build the analysis settings for a given number of light channels
    pub fn analysis_config(&self, num_bins: usize) -> AnalysisConfig {
        AnalysisConfig {
            chunk_size: self.chunk_size,
            sample_rate: self.sample_rate,
            num_bins,
            min_frequency: self.min_frequency,
            max_frequency: self.max_frequency,
            custom_channel_mapping: self.custom_channel_mapping.clone(),
            custom_channel_frequencies: self.custom_channel_frequencies.clone(),
            use_gpu: self.use_gpu,
            level_scale: self.level_scale,
        }
    }

    /// Wall-clock duration of one analysis block
    pub fn block_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate as f64)
    }
}

/// Hardware settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Number of light channels
    pub gpio_len: usize,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            gpio_len: DEFAULT_GPIO_LEN,
        }
    }
}

/// Role this process plays on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    #[default]
    Disabled,
    Server,
    Client,
}

/// sACN data plane and JSON control plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mode: NetworkMode,
    /// Explicit client addresses. The first one receives the data plane,
    /// all of them receive control messages.
    pub unicast_addresses: Vec<IpAddr>,
    pub sacn_port: u16,
    pub control_port: u16,
    pub universe_start: u16,
    /// Channels per universe
    pub universe_boundary: usize,
    pub enable_multicast: bool,
    pub multicast_ttl: u32,
    pub priority: u8,
    pub source_name: String,
    /// Local address the client binds to
    pub bind_address: IpAddr,
    pub receive_timeout_ms: u64,
    pub control_timeout_ms: u64,
    /// Periodic override resend from the server; 0 disables it
    pub override_resend_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: NetworkMode::Disabled,
            unicast_addresses: Vec::new(),
            sacn_port: DEFAULT_SACN_PORT,
            control_port: DEFAULT_CONTROL_PORT,
            universe_start: 1,
            universe_boundary: DMX_UNIVERSE_SIZE,
            enable_multicast: false,
            multicast_ttl: 1,
            priority: DEFAULT_PRIORITY,
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            control_timeout_ms: DEFAULT_CONTROL_TIMEOUT_MS,
            override_resend_secs: 5,
        }
    }
}

impl NetworkConfig {
    /// Validate universe numbering and timeouts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.universe_start == 0 || self.universe_start > MAX_UNIVERSE {
            return Err(ConfigError::InvalidUniverse(self.universe_start as u32));
        }
        if self.universe_boundary == 0 || self.universe_boundary > DMX_UNIVERSE_SIZE {
            return Err(ConfigError::InvalidUniverseBoundary(self.universe_boundary));
        }
        if self.priority > MAX_PRIORITY {
            return Err(ConfigError::InvalidSetting {
                name: "network.priority",
                reason: format!("{} exceeds {}", self.priority, MAX_PRIORITY),
            });
        }
        if self.receive_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "network.receive_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.control_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "network.control_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Number of universes needed to carry `channels` channels
    pub fn universe_count(&self, channels: usize) -> usize {
        channels.div_ceil(self.universe_boundary.max(1)).max(1)
    }

    /// Last universe number needed for `channels` channels, if it fits the
    /// sACN universe range
    pub fn last_universe(&self, channels: usize) -> Option<u16> {
        let last = self.universe_start as usize + self.universe_count(channels) - 1;
        u16::try_from(last).ok().filter(|u| *u <= MAX_UNIVERSE)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

/// Initial channel overrides for the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideConfig {
    pub always_on: Vec<u32>,
    pub always_off: Vec<u32>,
    pub inverted: Vec<u32>,
}

impl OverrideConfig {
    pub fn to_sets(&self) -> OverrideSets {
        OverrideSets::new(
            self.always_off.iter().copied(),
            self.always_on.iter().copied(),
            self.inverted.iter().copied(),
        )
    }
}
