//! JSON control plane messages
//!
//! ```json
//! {"type": "overrides", "always_off": [1], "always_on": [], "inverted": [4],
//!  "timestamp": 1700000000.25}
//! ```
//!
//! The schema carries no version field. Receivers accept unknown message
//! types and leave dispatching to the caller.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::overrides::OverrideSets;

/// Message type carrying override sets
pub const OVERRIDES_MESSAGE: &str = "overrides";

/// A control plane message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub always_off: Vec<u32>,
    #[serde(default)]
    pub always_on: Vec<u32>,
    #[serde(default)]
    pub inverted: Vec<u32>,
    /// Seconds since the Unix epoch at send time
    #[serde(default)]
    pub timestamp: f64,
}

impl ControlMessage {
    /// Build an `overrides` message stamped with the current time
    pub fn overrides(sets: &OverrideSets) -> Self {
        Self {
            kind: OVERRIDES_MESSAGE.to_string(),
            always_off: sets.always_off.iter().copied().collect(),
            always_on: sets.always_on.iter().copied().collect(),
            inverted: sets.inverted.iter().copied().collect(),
            timestamp: unix_timestamp(),
        }
    }

    pub fn is_overrides(&self) -> bool {
        self.kind == OVERRIDES_MESSAGE
    }

    pub fn override_sets(&self) -> OverrideSets {
        OverrideSets::new(
            self.always_off.iter().copied(),
            self.always_on.iter().copied(),
            self.inverted.iter().copied(),
        )
    }

    /// Serialize to UTF-8 JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a datagram.
    ///
    /// A message without a `type` field is rejected separately from
    /// malformed JSON so the two can be reported distinctly.
    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::InvalidControlMessage("not a JSON object".into()))?;

        if !object.contains_key("type") {
            return Err(ProtocolError::MissingMessageType);
        }

        serde_json::from_value(value)
            .map_err(|e| ProtocolError::InvalidControlMessage(e.to_string()))
    }
}

fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
