//! # Lightshow Sync
//!
//! Audio-reactive light show core: frequency-band analysis, per-channel
//! overrides, and distribution of channel levels over sACN (E1.31).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               SERVER                                 │
//! │  ┌─────────────┐    ┌──────────────┐    ┌────────────────────────┐   │
//! │  │ PCM source  │───▶│ BlockQueue   │───▶│ BandEnergyEngine       │   │
//! │  │ (thread)    │    │ (lock-free)  │    │ (analysis::fft)        │   │
//! │  └─────────────┘    └──────────────┘    └───────────┬────────────┘   │
//! │                                                     │ levels         │
//! │                                                     ▼                │
//! │                                         ┌────────────────────────┐   │
//! │                                         │ ChannelOverrideTable   │   │
//! │                                         └───────────┬────────────┘   │
//! │                                                     ▼                │
//! │  ┌──────────────────────────────────────────────────────────────┐    │
//! │  │ LightingTransport (network) - server role                     │    │
//! │  │   data plane:    E1.31 packets, one per universe per tick     │    │
//! │  │   control plane: JSON override messages                       │    │
//! │  └──────────────────────────────┬───────────────────────────────┘    │
//! └─────────────────────────────────┼────────────────────────────────────┘
//!                                   │ UDP (unicast / multicast / broadcast)
//!                                   ▼
//! ┌─────────────────────────────────┼────────────────────────────────────┐
//! │                               CLIENT                                 │
//! │  ┌──────────────────────────────────────────────────────────────┐    │
//! │  │ LightingTransport (network) - client role                     │    │
//! │  │   merges universes into one channel frame                     │    │
//! │  └──────────────────────────────┬───────────────────────────────┘    │
//! │                                 ▼                                    │
//! │                     ┌────────────────────────┐   ┌───────────────┐   │
//! │                     │ ChannelOverrideTable   │──▶│ LightOutput   │   │
//! │                     └────────────────────────┘   │ (GPIO driver) │   │
//! │                                                  └───────────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod output;
pub mod overrides;
pub mod protocol;
pub mod show;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Samples per analysis block
    pub const DEFAULT_CHUNK_SIZE: usize = 4096;

    /// Default sample rate of the PCM input
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default interleaved channel count of the PCM input (stereo)
    pub const DEFAULT_INPUT_CHANNELS: u16 = 2;

    /// Lower edge of the analysed spectrum in Hz
    pub const DEFAULT_MIN_FREQUENCY: f32 = 20.0;

    /// Upper edge of the analysed spectrum in Hz
    pub const DEFAULT_MAX_FREQUENCY: f32 = 15000.0;

    /// Default number of light channels
    pub const DEFAULT_GPIO_LEN: usize = 8;

    /// Standard sACN port
    pub const DEFAULT_SACN_PORT: u16 = 5568;

    /// Default UDP port for override messages
    pub const DEFAULT_CONTROL_PORT: u16 = 8889;

    /// Channel slots in one DMX universe
    pub const DMX_UNIVERSE_SIZE: usize = 512;

    /// Highest universe number sACN allows
    pub const MAX_UNIVERSE: u16 = 63999;

    /// Default sACN priority
    pub const DEFAULT_PRIORITY: u8 = 100;

    /// Highest sACN priority
    pub const MAX_PRIORITY: u8 = 200;

    /// Source name carried in every data packet
    pub const DEFAULT_SOURCE_NAME: &str = "lightshow-sync";

    /// Data plane receive timeout
    pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 100;

    /// Control plane receive timeout, kept short so it never stalls a tick
    pub const DEFAULT_CONTROL_TIMEOUT_MS: u64 = 10;

    /// Largest control message accepted
    pub const MAX_CONTROL_MESSAGE_SIZE: usize = 4096;

    /// PCM block queue capacity (in blocks)
    pub const BLOCK_QUEUE_CAPACITY: usize = 16;
}
