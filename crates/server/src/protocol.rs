//! Wire message shapes (spec §6).
//!
//! Every direction is a discriminated union tagged on `type`. Field names
//! match the spec exactly so the JSON on the wire needs no translation
//! layer for clients written against the documented protocol.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tts_gateway_core::{AudioSpec, CachedChunk, ErrorCode};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Start {
        session_id: String,
        audio_format: String,
        sample_rate: u32,
        channels: u8,
    },
    TextDelta {
        session_id: String,
        #[allow(dead_code)]
        seq: u64,
        text: String,
    },
    TextEnd {
        session_id: String,
        #[allow(dead_code)]
        seq: u64,
    },
    Cancel {
        session_id: String,
        #[allow(dead_code)]
        seq: u64,
    },
    Resume {
        session_id: String,
        last_unit_index_received: u64,
    },
}

impl ClientMessage {
    pub fn session_id(&self) -> &str {
        match self {
            ClientMessage::Start { session_id, .. }
            | ClientMessage::TextDelta { session_id, .. }
            | ClientMessage::TextEnd { session_id, .. }
            | ClientMessage::Cancel { session_id, .. }
            | ClientMessage::Resume { session_id, .. } => session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AudioChunk {
        session_id: String,
        seq: u64,
        chunk_seq: u64,
        unit_index_start: u64,
        unit_index_end: u64,
        units_text: String,
        audio_format: String,
        sample_rate: u32,
        channels: u8,
        audio_base64: String,
    },
    TtsEnd {
        session_id: String,
        seq: u64,
        cancelled: bool,
    },
    Error {
        session_id: String,
        seq: u64,
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    /// Build the `audio_chunk` message for a cached chunk; `seq` is the
    /// session's next outbound sequence number.
    pub fn from_chunk(session_id: &str, seq: u64, chunk: &CachedChunk) -> Self {
        ServerMessage::AudioChunk {
            session_id: session_id.to_string(),
            seq,
            chunk_seq: chunk.chunk_seq,
            unit_index_start: chunk.unit_index_start,
            unit_index_end: chunk.unit_index_end,
            units_text: chunk.units_text.clone(),
            audio_format: chunk.audio_spec.audio_format.clone(),
            sample_rate: chunk.audio_spec.sample_rate,
            channels: chunk.audio_spec.channels,
            audio_base64: BASE64.encode(&chunk.audio_bytes),
        }
    }

    pub fn tts_end(session_id: &str, seq: u64, cancelled: bool) -> Self {
        ServerMessage::TtsEnd {
            session_id: session_id.to_string(),
            seq,
            cancelled,
        }
    }

    pub fn error(session_id: &str, seq: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            session_id: session_id.to_string(),
            seq,
            code,
            message: message.into(),
        }
    }
}

/// Fields a `start` message declares for the session's [`AudioSpec`].
pub fn audio_spec_from_start(audio_format: String, sample_rate: u32, channels: u8) -> AudioSpec {
    AudioSpec::new(audio_format, sample_rate, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_delta() {
        let json = r#"{"type":"text_delta","session_id":"s1","seq":1,"text":"hi"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::TextDelta { session_id, text, .. } => {
                assert_eq!(session_id, "s1");
                assert_eq!(text, "hi");
            },
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_missing_required_field() {
        let json = r#"{"type":"text_delta","session_id":"s1"}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn serializes_audio_chunk_with_base64() {
        let chunk = CachedChunk {
            created_at: std::time::Instant::now(),
            chunk_seq: 1,
            unit_index_start: 0,
            unit_index_end: 2,
            units_text: "abc".to_string(),
            audio_spec: AudioSpec::new("pcm16_wav", 16000, 1),
            audio_bytes: vec![1, 2, 3, 4],
        };
        let msg = ServerMessage::from_chunk("s1", 2, &chunk);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"audio_chunk\""));
        assert!(json.contains("\"audio_base64\""));
    }
}
