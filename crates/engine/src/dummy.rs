//! Sine-wave stand-in engine for tests and local development.
//!
//! Produces audible, deterministic PCM16 so the WS protocol, cancellation,
//! resume, and load-test flows can be validated without a real TTS model.
//! Mirrors the original gateway's `DummyTtsEngine`: a fixed duration per
//! character keeps unit/audio alignment trivially checkable.

use async_trait::async_trait;
use tts_gateway_core::AudioSpec;

use crate::{EngineError, SynthesisEngine};

const AMPLITUDE: f64 = 8000.0;
const FREQ_HZ: f64 = 440.0;
const MS_PER_UNIT: u32 = 40;

pub struct DummySineEngine;

impl DummySineEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummySineEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisEngine for DummySineEngine {
    async fn synthesize_pcm16(&self, text: &str, spec: &AudioSpec) -> Result<Vec<u8>, EngineError> {
        let unit_count = text.chars().count().max(1) as u32;
        let total_ms = (unit_count * MS_PER_UNIT).max(MS_PER_UNIT);
        let total_samples = (spec.sample_rate as u64 * total_ms as u64 / 1000) as usize;

        let mut pcm = Vec::with_capacity(total_samples * 2 * spec.channels as usize);
        for i in 0..total_samples {
            let t = i as f64 / spec.sample_rate as f64;
            let sample = (AMPLITUDE * (2.0 * std::f64::consts::PI * FREQ_HZ * t).sin()) as i16;
            let bytes = sample.to_le_bytes();
            for _ in 0..spec.channels.max(1) {
                pcm.extend_from_slice(&bytes);
            }
        }
        Ok(pcm)
    }
}
