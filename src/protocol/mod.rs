//! Wire protocols
//!
//! - `e131`: binary sACN (E1.31) data packets carrying channel levels
//! - `control`: JSON control messages carrying override sets

pub mod control;
pub mod e131;

pub use control::{ControlMessage, OVERRIDES_MESSAGE};
pub use e131::{decode, encode, LightingPacket, PacketEncoder};

/// Convert a level in `[0.0, 1.0]` to a DMX slot value
pub fn level_to_dmx(level: f32) -> u8 {
    if level.is_nan() {
        return 0;
    }
    (level.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Convert a DMX slot value to a level in `[0.0, 1.0]`
pub fn dmx_to_level(value: u8) -> f32 {
    value as f32 / 255.0
}
