//! Audio format description shared by every chunk in a session.

use serde::{Deserialize, Serialize};

/// Immutable description of the audio a session's chunks are encoded as.
///
/// Attached to a [`crate::chunk::CachedChunk`] at synthesis time; every chunk
/// in a session carries the same spec, fixed when the session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub audio_format: String,
    pub sample_rate: u32,
    pub channels: u8,
}

impl AudioSpec {
    pub fn new(audio_format: impl Into<String>, sample_rate: u32, channels: u8) -> Self {
        Self {
            audio_format: audio_format.into(),
            sample_rate,
            channels,
        }
    }
}
