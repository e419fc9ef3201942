//! Error types for the light show pipeline

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
///
/// These are the only errors allowed to abort startup. Everything raised
/// after a component is set up is logged and absorbed instead.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid frequency range: min {min} Hz must be below max {max} Hz")]
    InvalidFrequencyRange { min: f32, max: f32 },

    #[error("Number of bins must be greater than zero")]
    InvalidBinCount,

    #[error("Chunk size must be at least 2 samples, got {0}")]
    InvalidChunkSize(usize),

    #[error("Sample rate must be greater than zero")]
    InvalidSampleRate,

    #[error("Invalid custom channel mapping: {0}")]
    InvalidChannelMapping(String),

    #[error("Invalid sACN universe: {0} (must be 1-63999)")]
    InvalidUniverse(u32),

    #[error("Invalid universe boundary: {0} (must be 1-512)")]
    InvalidUniverseBoundary(usize),

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Network setup failed: {0}")]
    Network(#[from] NetworkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket creation failed: {0}")]
    SocketFailed(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Multicast join failed for {group}: {reason}")]
    MulticastJoin { group: std::net::Ipv4Addr, reason: String },
}

/// Wire protocol errors, for both the data and the control plane
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Packet too short: {0} bytes")]
    PacketTooShort(usize),

    #[error("Invalid preamble: {0:#06x}")]
    InvalidPreamble(u16),

    #[error("Invalid ACN packet identifier")]
    InvalidIdentifier,

    #[error("Unsupported vector: {0:#010x}")]
    UnsupportedVector(u32),

    #[error("Invalid DMX start code: {0:#04x}")]
    InvalidStartCode(u8),

    #[error("Invalid channel payload length: {0} (must be 1-512)")]
    InvalidPayloadLength(usize),

    #[error("Invalid control message: {0}")]
    InvalidControlMessage(String),

    #[error("Control message is missing the 'type' field")]
    MissingMessageType,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Light output (GPIO driver) errors
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Channel out of range: {0}")]
    ChannelOutOfRange(usize),

    #[error("Driver error: {0}")]
    Driver(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
