//! Synthesis engine interface (spec §4.2).
//!
//! A single capability — turn bounded text into PCM16 bytes — expressed as a
//! trait so the gateway never depends on a concrete vendor SDK. Treated as a
//! stateless, opaque async collaborator: the gateway re-presents segment
//! text on every call and attributes nothing to engine-side memory.

mod dummy;

pub use dummy::DummySineEngine;

use async_trait::async_trait;
use thiserror::Error;
use tts_gateway_core::AudioSpec;

/// Failure synthesizing a segment. Carries a human-readable detail only;
/// the gateway is responsible for mapping this to the wire `engine_failure`
/// error code (spec §7) — the engine itself has no concept of sessions.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct EngineError(pub String);

/// A pluggable text-to-speech backend.
///
/// Implementations suspend until synthesis completes and return raw PCM16
/// little-endian signed bytes, stereo interleaved when `spec.channels == 2`.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    async fn synthesize_pcm16(&self, text: &str, spec: &AudioSpec) -> Result<Vec<u8>, EngineError>;
}
