//! Band energy engine
//!
//! Computes a Hann-windowed FFT over a block of signed 16-bit samples and
//! reduces the magnitude spectrum to one level per output channel.
//!
//! Levels are normalized against a fixed full-scale reference rather than a
//! running maximum: silence maps to 0.0 and a full-scale sine whose energy
//! falls inside one band maps to ~1.0 on the linear scale.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::analysis::bands::{BandLayout, FrequencyBand};
use crate::error::ConfigError;

/// Full-scale value of a signed 16-bit sample
const I16_FULL_SCALE: f32 = 32768.0;

/// Mapping from band amplitude to a channel level
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelScale {
    /// Amplitude relative to full scale
    #[default]
    Linear,
    /// Amplitude in dBFS mapped linearly from `floor_db` (0.0) to 0 dBFS (1.0)
    Decibel { floor_db: f32 },
}

impl LevelScale {
    /// Map a full-scale-relative amplitude to `[0.0, 1.0]`
    pub fn level(&self, amplitude: f32) -> f32 {
        if !(amplitude > 0.0) {
            return 0.0;
        }
        let level = match *self {
            LevelScale::Linear => amplitude,
            LevelScale::Decibel { floor_db } => {
                let db = 20.0 * amplitude.log10();
                (db - floor_db) / -floor_db
            }
        };
        level.clamp(0.0, 1.0)
    }
}

/// Analysis settings
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub chunk_size: usize,
    pub sample_rate: u32,
    pub num_bins: usize,
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub custom_channel_mapping: Option<Vec<usize>>,
    pub custom_channel_frequencies: Option<Vec<f32>>,
    pub use_gpu: bool,
    pub level_scale: LevelScale,
}

impl AnalysisConfig {
    /// Default settings for `num_bins` channels
    pub fn new(chunk_size: usize, sample_rate: u32, num_bins: usize) -> Self {
        Self {
            chunk_size,
            sample_rate,
            num_bins,
            min_frequency: crate::constants::DEFAULT_MIN_FREQUENCY,
            max_frequency: crate::constants::DEFAULT_MAX_FREQUENCY,
            custom_channel_mapping: None,
            custom_channel_frequencies: None,
            use_gpu: false,
            level_scale: LevelScale::Linear,
        }
    }

    /// Build the band layout these settings describe
    pub fn layout(&self) -> Result<BandLayout, ConfigError> {
        BandLayout::new(
            self.num_bins,
            self.min_frequency,
            self.max_frequency,
            self.custom_channel_mapping.as_deref(),
            self.custom_channel_frequencies.as_deref(),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size < 2 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate);
        }
        if let LevelScale::Decibel { floor_db } = self.level_scale {
            if !(floor_db < 0.0) {
                return Err(ConfigError::InvalidSetting {
                    name: "audio.level_scale.floor_db",
                    reason: format!("{} must be negative", floor_db),
                });
            }
        }
        self.layout().map(|_| ())
    }
}

/// FFT-based band energy engine
pub struct BandEnergyEngine {
    config: AnalysisConfig,
    layout: BandLayout,
    /// FFT bin range per band, computed once
    band_bins: Vec<std::ops::Range<usize>>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// `chunk_size * sum(w^2)`, the spectral energy of a unit-amplitude
    /// signal after windowing
    window_energy: f32,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    band_levels: Vec<f32>,
}

impl BandEnergyEngine {
    /// Create an engine, validating the configuration.
    ///
    /// A GPU request is accepted for older configurations but always
    /// resolves to the CPU path; `use_gpu()` reports `false` afterwards.
    pub fn new(mut config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        if config.use_gpu {
            tracing::warn!("GPU analysis requested but not available, using CPU FFT");
            config.use_gpu = false;
        }

        let layout = config.layout()?;
        let band_bins = layout
            .bands()
            .iter()
            .map(|band| band.bin_range(config.chunk_size, config.sample_rate))
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.chunk_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window = hann_window(config.chunk_size);
        let window_energy = config.chunk_size as f32 * window.iter().map(|w| w * w).sum::<f32>();

        tracing::info!(
            "Band energy engine initialized: {} samples @ {} Hz, {} channels over {} bands ({:.0}-{:.0} Hz)",
            config.chunk_size,
            config.sample_rate,
            config.num_bins,
            layout.bands().len(),
            config.min_frequency,
            config.max_frequency
        );

        Ok(Self {
            fft_buffer: vec![Complex::new(0.0, 0.0); config.chunk_size],
            band_levels: vec![0.0; layout.bands().len()],
            config,
            layout,
            band_bins,
            fft,
            window,
            window_energy,
            scratch,
        })
    }

    /// Compute one level in `[0.0, 1.0]` per channel.
    ///
    /// Input shorter than `chunk_size` is zero-padded; longer input is
    /// truncated to its first `chunk_size` samples. The output always has
    /// `num_bins` entries.
    pub fn calculate_levels(&mut self, samples: &[i16]) -> Vec<f32> {
        if samples.len() != self.config.chunk_size {
            tracing::trace!(
                "Block of {} samples adjusted to chunk size {}",
                samples.len(),
                self.config.chunk_size
            );
        }

        let padded = samples.iter().copied().chain(std::iter::repeat(0));
        for ((slot, sample), w) in self.fft_buffer.iter_mut().zip(padded).zip(&self.window) {
            *slot = Complex::new(sample as f32 / I16_FULL_SCALE * w, 0.0);
        }

        self.fft.process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        // One-sided spectrum: a sine splits its energy between the positive
        // and negative halves, hence the factor 4 for peak amplitude.
        for (level, bins) in self.band_levels.iter_mut().zip(&self.band_bins) {
            let energy: f32 = self.fft_buffer[bins.clone()].iter().map(|c| c.norm_sqr()).sum();
            let amplitude = (4.0 * energy / self.window_energy).sqrt();
            *level = self.config.level_scale.level(amplitude);
        }

        self.layout
            .channel_to_band()
            .iter()
            .map(|&band| self.band_levels[band])
            .collect()
    }

    /// Always `false`: analysis runs on the CPU
    pub fn use_gpu(&self) -> bool {
        self.config.use_gpu
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The frequency bands, in frequency order
    pub fn frequency_bands(&self) -> &[FrequencyBand] {
        self.layout.bands()
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    pub fn num_bins(&self) -> usize {
        self.config.num_bins
    }
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (PI * i as f32 / size as f32).sin().powi(2))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine(chunk_size: usize, sample_rate: u32, num_bins: usize) -> BandEnergyEngine {
        BandEnergyEngine::new(AnalysisConfig::new(chunk_size, sample_rate, num_bins)).unwrap()
    }

    fn sine(frequency: f32, chunk_size: usize, sample_rate: u32) -> Vec<i16> {
        (0..chunk_size)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((2.0 * PI * frequency * t).sin() * 32767.0) as i16
            })
            .collect()
    }

    /// Deterministic pseudo-random samples
    fn noise(len: usize) -> Vec<i16> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as i16
            })
            .collect()
    }

    #[test]
    fn test_gpu_request_falls_back_to_cpu() {
        let mut config = AnalysisConfig::new(2048, 44100, 8);
        config.use_gpu = true;
        let engine = BandEnergyEngine::new(config).unwrap();
        assert!(!engine.use_gpu());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AnalysisConfig::new(2048, 44100, 8);
        config.min_frequency = 15000.0;
        config.max_frequency = 20.0;
        assert!(BandEnergyEngine::new(config).is_err());

        assert!(matches!(
            BandEnergyEngine::new(AnalysisConfig::new(2048, 44100, 0)),
            Err(ConfigError::InvalidBinCount)
        ));
        assert!(BandEnergyEngine::new(AnalysisConfig::new(0, 44100, 8)).is_err());
        assert!(BandEnergyEngine::new(AnalysisConfig::new(2048, 0, 8)).is_err());
    }

    #[test]
    fn test_silence_is_zero() {
        for chunk_size in [1024, 2048, 4096, 8192] {
            let mut engine = engine(chunk_size, 44100, 8);
            let levels = engine.calculate_levels(&vec![0i16; chunk_size]);
            assert_eq!(levels, vec![0.0; 8]);
        }
    }

    #[test]
    fn test_sine_lands_in_its_band() {
        let mut engine = engine(2048, 44100, 8);
        let levels = engine.calculate_levels(&sine(440.0, 2048, 44100));

        let band = engine
            .frequency_bands()
            .iter()
            .position(|b| b.low_hz <= 440.0 && 440.0 < b.high_hz)
            .unwrap();

        assert!(levels[band] > 0.9, "level {} too low", levels[band]);
        assert!(levels[band] <= 1.0);
        for (i, level) in levels.iter().enumerate() {
            if i != band {
                assert!(*level < 0.1, "band {} leaked {}", i, level);
            }
        }
    }

    #[test]
    fn test_reproducible() {
        let mut engine = engine(2048, 44100, 8);
        let block = sine(440.0, 2048, 44100);
        let first = engine.calculate_levels(&block);
        let _ = engine.calculate_levels(&noise(2048));
        let second = engine.calculate_levels(&block);
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let mut engine = engine(2048, 44100, 8);
        let block = sine(440.0, 1024, 44100);

        let mut padded = block.clone();
        padded.resize(2048, 0);

        assert_eq!(engine.calculate_levels(&block), engine.calculate_levels(&padded));
    }

    #[test]
    fn test_long_input_is_truncated() {
        let mut engine = engine(2048, 44100, 8);
        let block = noise(4096);
        assert_eq!(
            engine.calculate_levels(&block),
            engine.calculate_levels(&block[..2048])
        );
    }

    #[test]
    fn test_various_sample_rates() {
        for sample_rate in [22050, 44100, 48000] {
            let mut engine = engine(2048, sample_rate, 8);
            let levels = engine.calculate_levels(&noise(2048));
            assert_eq!(levels.len(), 8);
        }
    }

    #[test]
    fn test_custom_mapping_output_length() {
        let mut config = AnalysisConfig::new(2048, 44100, 6);
        config.custom_channel_mapping = Some(vec![1, 1, 2, 2, 3, 3]);
        let mut engine = BandEnergyEngine::new(config).unwrap();

        let levels = engine.calculate_levels(&noise(2048));
        assert_eq!(levels.len(), 6);
        assert_eq!(levels[0], levels[1]);
        assert_eq!(levels[4], levels[5]);
    }

    #[test]
    fn test_decibel_scale() {
        let scale = LevelScale::Decibel { floor_db: -60.0 };
        assert_eq!(scale.level(0.0), 0.0);
        assert!((scale.level(1.0) - 1.0).abs() < 1e-6);
        assert!((scale.level(0.001) - 0.0).abs() < 1e-4);
        assert!((scale.level(0.031_622_8) - 0.5).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn prop_levels_bounded_for_full_scale_sine(frequency in 20.0f32..15000.0) {
            let mut engine = engine(2048, 44100, 8);
            let levels = engine.calculate_levels(&sine(frequency, 2048, 44100));
            prop_assert_eq!(levels.len(), 8);
            for level in levels {
                prop_assert!((0.0..=1.0).contains(&level));
            }
        }

        #[test]
        fn prop_band_count_invariant(
            samples in proptest::collection::vec(any::<i16>(), 0..3000),
            num_bins in 1usize..24,
        ) {
            let mut engine = engine(1024, 44100, num_bins);
            let levels = engine.calculate_levels(&samples);
            prop_assert_eq!(levels.len(), num_bins);
            for level in levels {
                prop_assert!((0.0..=1.0).contains(&level));
            }
        }
    }
}
