//! Frequency band layout
//!
//! Bands are contiguous and cover `[min_frequency, max_frequency)`. By
//! default they are spaced evenly in octaves; a custom edge list and a
//! channel-to-band mapping can replace that split.

use crate::error::ConfigError;

/// One frequency band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBand {
    pub index: usize,
    pub low_hz: f32,
    pub high_hz: f32,
}

impl FrequencyBand {
    /// Range of FFT bins `[start, end)` that fall into this band.
    ///
    /// Bands narrower than one bin still get the bin containing `low_hz`.
    /// Bins above Nyquist are cut off, which can leave the range empty.
    pub fn bin_range(&self, chunk_size: usize, sample_rate: u32) -> std::ops::Range<usize> {
        let bin_count = chunk_size / 2 + 1;
        let hz_per_bin = sample_rate as f32 / chunk_size as f32;

        let start = (self.low_hz / hz_per_bin).floor() as usize;
        let end = ((self.high_hz / hz_per_bin).floor() as usize).max(start + 1);

        start.min(bin_count)..end.min(bin_count)
    }
}

/// Bands plus the band each output channel reads from
#[derive(Debug, Clone)]
pub struct BandLayout {
    bands: Vec<FrequencyBand>,
    channel_to_band: Vec<usize>,
}

impl BandLayout {
    /// Build the layout for `num_bins` output channels.
    ///
    /// `custom_mapping` holds a 1-based band index per channel; when given,
    /// the number of bands is the largest index. `custom_frequencies` holds
    /// band edges and is used when it has at least `bands + 1` entries.
    pub fn new(
        num_bins: usize,
        min_frequency: f32,
        max_frequency: f32,
        custom_mapping: Option<&[usize]>,
        custom_frequencies: Option<&[f32]>,
    ) -> Result<Self, ConfigError> {
        if num_bins == 0 {
            return Err(ConfigError::InvalidBinCount);
        }
        let range_error = || ConfigError::InvalidFrequencyRange {
            min: min_frequency,
            max: max_frequency,
        };
        if !min_frequency.is_finite() || !max_frequency.is_finite() {
            return Err(range_error());
        }
        if min_frequency >= max_frequency || min_frequency < 0.0 {
            return Err(range_error());
        }

        let channel_to_band: Vec<usize> = match custom_mapping {
            Some(mapping) => {
                if mapping.len() != num_bins {
                    return Err(ConfigError::InvalidChannelMapping(format!(
                        "{} entries for {} channels",
                        mapping.len(),
                        num_bins
                    )));
                }
                if let Some(bad) = mapping.iter().find(|&&band| band == 0) {
                    return Err(ConfigError::InvalidChannelMapping(format!(
                        "band index {} is not 1-based",
                        bad
                    )));
                }
                mapping.iter().map(|band| band - 1).collect()
            }
            None => (0..num_bins).collect(),
        };

        let band_count = channel_to_band.iter().max().map_or(0, |max| max + 1);

        let edges = match custom_frequencies {
            Some(edges) if edges.len() > band_count => {
                let edges = &edges[..=band_count];
                if edges.iter().any(|edge| !edge.is_finite())
                    || edges.windows(2).any(|pair| pair[0] >= pair[1])
                    || edges[0] < 0.0
                {
                    return Err(ConfigError::InvalidChannelMapping(
                        "custom channel frequencies must be finite and increasing".into(),
                    ));
                }
                edges.to_vec()
            }
            Some(edges) => {
                tracing::warn!(
                    "Ignoring {} custom channel frequencies, {} band edges are needed",
                    edges.len(),
                    band_count + 1
                );
                octave_edges(band_count, min_frequency, max_frequency).ok_or_else(range_error)?
            }
            None => octave_edges(band_count, min_frequency, max_frequency).ok_or_else(range_error)?,
        };

        let bands = edges
            .windows(2)
            .enumerate()
            .map(|(index, pair)| FrequencyBand {
                index,
                low_hz: pair[0],
                high_hz: pair[1],
            })
            .collect();

        Ok(Self {
            bands,
            channel_to_band,
        })
    }

    /// All distinct bands, in frequency order
    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    /// Band feeding output channel `channel`
    pub fn band_for_channel(&self, channel: usize) -> Option<&FrequencyBand> {
        self.channel_to_band
            .get(channel)
            .and_then(|&band| self.bands.get(band))
    }

    /// Band index per output channel
    pub fn channel_to_band(&self) -> &[usize] {
        &self.channel_to_band
    }

    pub fn num_channels(&self) -> usize {
        self.channel_to_band.len()
    }
}

/// Edges of `count` bands spaced evenly in octaves.
///
/// `None` unless `0 < min_frequency < max_frequency`, both finite: octave
/// spacing has no lower edge at 0 Hz.
fn octave_edges(count: usize, min_frequency: f32, max_frequency: f32) -> Option<Vec<f32>> {
    if !min_frequency.is_finite() || !max_frequency.is_finite() {
        return None;
    }
    if min_frequency <= 0.0 || min_frequency >= max_frequency {
        return None;
    }
    let octaves = (max_frequency / min_frequency).log2();
    let per_band = octaves / count as f32;

    let mut edges: Vec<f32> = (0..=count)
        .map(|i| min_frequency * 2f32.powf(i as f32 * per_band))
        .collect();
    // Keep the top edge exact despite rounding in powf
    if let Some(last) = edges.last_mut() {
        *last = max_frequency;
    }
    Some(edges)
}
