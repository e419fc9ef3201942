//! Audio analysis
//!
//! Turns fixed-size blocks of PCM samples into one normalized energy value
//! per light channel.

pub mod bands;
pub mod fft;

pub use bands::{FrequencyBand, BandLayout};
pub use fft::{AnalysisConfig, BandEnergyEngine, LevelScale};
