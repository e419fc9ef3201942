//! Light output
//!
//! `LightOutput` is the seam to the GPIO driver: one level per channel,
//! written once per tick. Pin handling itself lives outside this crate.

use crate::error::OutputError;

/// A sink for channel levels
pub trait LightOutput: Send {
    /// Number of channels the output drives
    fn channel_count(&self) -> usize;

    /// Drive one channel to a level in `[0.0, 1.0]`
    fn set_level(&mut self, channel: usize, level: f32) -> Result<(), OutputError>;

    /// Drive every channel from a frame; extra levels are ignored and
    /// missing ones leave their channel untouched
    fn write_frame(&mut self, frame: &[f32]) -> Result<(), OutputError> {
        let count = self.channel_count().min(frame.len());
        for (channel, &level) in frame[..count].iter().enumerate() {
            self.set_level(channel, level)?;
        }
        Ok(())
    }

    /// Switch every channel off
    fn all_off(&mut self) -> Result<(), OutputError> {
        for channel in 0..self.channel_count() {
            self.set_level(channel, 0.0)?;
        }
        Ok(())
    }
}

/// Output that renders frames into the log, for running without hardware
pub struct TracingOutput {
    levels: Vec<f32>,
    frames_written: u64,
    /// Log every n-th frame at debug level
    log_every: u64,
}

impl TracingOutput {
    pub fn new(channels: usize, log_every: u64) -> Self {
        Self {
            levels: vec![0.0; channels],
            frames_written: 0,
            log_every: log_every.max(1),
        }
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// One character per channel, from ' ' (off) to '#' (full)
    pub fn render(&self) -> String {
        const RAMP: &[u8] = b" .:-=+*#";
        self.levels
            .iter()
            .map(|level| {
                let index = (level.clamp(0.0, 1.0) * (RAMP.len() - 1) as f32).round() as usize;
                RAMP[index] as char
            })
            .collect()
    }
}

impl LightOutput for TracingOutput {
    fn channel_count(&self) -> usize {
        self.levels.len()
    }

    fn set_level(&mut self, channel: usize, level: f32) -> Result<(), OutputError> {
        let slot = self
            .levels
            .get_mut(channel)
            .ok_or(OutputError::ChannelOutOfRange(channel))?;
        *slot = level.clamp(0.0, 1.0);
        Ok(())
    }

    fn write_frame(&mut self, frame: &[f32]) -> Result<(), OutputError> {
        for (slot, &level) in self.levels.iter_mut().zip(frame) {
            *slot = level.clamp(0.0, 1.0);
        }
        self.frames_written += 1;
        if self.frames_written % self.log_every == 0 {
            tracing::debug!("[{}]", self.render());
        }
        Ok(())
    }
}
