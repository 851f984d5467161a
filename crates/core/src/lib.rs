//! Core types for the streaming TTS gateway
//!
//! Shared, I/O-free vocabulary used by every other crate in the workspace:
//! the audio format descriptor, the cached-chunk/segment primitives the
//! session state machine is built on, and the gateway's error taxonomy.

pub mod audio;
pub mod chunk;
pub mod error;

pub use audio::AudioSpec;
pub use chunk::{is_punctuation, CachedChunk, Segment};
pub use error::{ErrorCode, GatewayError, Result};
