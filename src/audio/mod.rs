//! Audio input subsystem

pub mod buffer;
pub mod source;

pub use buffer::{BlockAssembler, BlockQueue, PcmBlock, SharedBlockQueue, create_shared_queue};
pub use source::{PcmReader, PcmSource};
