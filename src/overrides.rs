//! Operator channel overrides
//!
//! Overrides force a channel on, off, or invert it before the frame reaches
//! hardware or the network. When a channel is listed in more than one set,
//! off wins over on, and on wins over inverted.

use std::collections::{BTreeMap, BTreeSet};

use crate::protocol::control::ControlMessage;

/// Override state of a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrideMode {
    #[default]
    Normal,
    AlwaysOn,
    AlwaysOff,
    Inverted,
}

impl OverrideMode {
    /// Apply this mode to one level
    pub fn apply(self, level: f32) -> f32 {
        match self {
            OverrideMode::Normal => level,
            OverrideMode::AlwaysOn => 1.0,
            OverrideMode::AlwaysOff => 0.0,
            OverrideMode::Inverted => 1.0 - level,
        }
    }
}

/// A channel and its override mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOverride {
    pub channel: u32,
    pub mode: OverrideMode,
}

/// Override sets as they appear in configuration and control messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSets {
    pub always_off: BTreeSet<u32>,
    pub always_on: BTreeSet<u32>,
    pub inverted: BTreeSet<u32>,
}

impl OverrideSets {
    pub fn new(
        always_off: impl IntoIterator<Item = u32>,
        always_on: impl IntoIterator<Item = u32>,
        inverted: impl IntoIterator<Item = u32>,
    ) -> Self {
        Self {
            always_off: always_off.into_iter().collect(),
            always_on: always_on.into_iter().collect(),
            inverted: inverted.into_iter().collect(),
        }
    }

    /// Effective mode of `channel`, honoring off > on > inverted
    pub fn mode(&self, channel: u32) -> OverrideMode {
        if self.always_off.contains(&channel) {
            OverrideMode::AlwaysOff
        } else if self.always_on.contains(&channel) {
            OverrideMode::AlwaysOn
        } else if self.inverted.contains(&channel) {
            OverrideMode::Inverted
        } else {
            OverrideMode::Normal
        }
    }

    pub fn is_empty(&self) -> bool {
        self.always_off.is_empty() && self.always_on.is_empty() && self.inverted.is_empty()
    }
}

/// Apply override sets to a frame, returning the adjusted frame
pub fn apply_overrides(frame: &[f32], overrides: &OverrideSets) -> Vec<f32> {
    frame
        .iter()
        .enumerate()
        .map(|(channel, &level)| overrides.mode(channel as u32).apply(level))
        .collect()
}

/// Current override per channel.
///
/// Each channel holds at most one mode; setting a channel replaces
/// whatever it had before.
#[derive(Debug, Clone, Default)]
pub struct ChannelOverrideTable {
    modes: BTreeMap<u32, OverrideMode>,
}

impl ChannelOverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from possibly overlapping sets
    pub fn from_sets(sets: &OverrideSets) -> Self {
        let mut table = Self::new();
        table.replace(sets);
        table
    }

    /// Set the mode of one channel
    pub fn set(&mut self, channel: u32, mode: OverrideMode) {
        if mode == OverrideMode::Normal {
            self.modes.remove(&channel);
        } else {
            self.modes.insert(channel, mode);
        }
    }

    pub fn mode(&self, channel: u32) -> OverrideMode {
        self.modes.get(&channel).copied().unwrap_or_default()
    }

    /// Replace the whole table with `sets`
    pub fn replace(&mut self, sets: &OverrideSets) {
        self.modes.clear();
        let channels = sets
            .always_off
            .iter()
            .chain(&sets.always_on)
            .chain(&sets.inverted);
        for &channel in channels {
            self.set(channel, sets.mode(channel));
        }
    }

    /// Replace the table from an `overrides` control message
    pub fn update_from_message(&mut self, message: &ControlMessage) {
        self.replace(&message.override_sets());
        tracing::info!(
            "Overrides updated: {} off, {} on, {} inverted",
            message.always_off.len(),
            message.always_on.len(),
            message.inverted.len()
        );
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// All non-normal entries, in channel order
    pub fn entries(&self) -> impl Iterator<Item = ChannelOverride> + '_ {
        self.modes
            .iter()
            .map(|(&channel, &mode)| ChannelOverride { channel, mode })
    }

    /// Table contents as disjoint sets
    pub fn to_sets(&self) -> OverrideSets {
        let mut sets = OverrideSets::default();
        for entry in self.entries() {
            match entry.mode {
                OverrideMode::AlwaysOff => sets.always_off.insert(entry.channel),
                OverrideMode::AlwaysOn => sets.always_on.insert(entry.channel),
                OverrideMode::Inverted => sets.inverted.insert(entry.channel),
                OverrideMode::Normal => false,
            };
        }
        sets
    }

    /// Apply the table to a frame, returning the adjusted frame
    pub fn apply(&self, frame: &[f32]) -> Vec<f32> {
        if self.modes.is_empty() {
            return frame.to_vec();
        }
        frame
            .iter()
            .enumerate()
            .map(|(channel, &level)| self.mode(channel as u32).apply(level))
            .collect()
    }
}
