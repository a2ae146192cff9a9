/// JSON messages exchanged with the streaming recognition service.
///
/// The client opens every session with a `Handshake` text frame, then streams
/// raw PCM as binary frames. The service answers with `RecognitionResponse`
/// text frames: one per chunk in the paced protocol, or one consolidated
/// reply after the `eof` sentinel in the unpaced protocol.

use serde::{Deserialize, Serialize};

/// Per-session recognizer settings, sent once at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// PCM sample rate in samples per second
    pub sample_rate: u32,
    /// Ask the service to run a second rescoring pass
    #[serde(rename = "use_rescoring")]
    pub rescoring: bool,
}

/// First frame of every session: `{"config": {...}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub config: SessionConfig,
}

impl Handshake {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn to_json(&self) -> String {
        // Two plain fields, serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Status discriminator carried by incremental responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// More audio is expected before a final hypothesis
    Partial,
    /// Final hypothesis for the streamed utterance
    Result,
    /// Missing or unrecognized status (consolidated replies carry none)
    #[default]
    #[serde(other)]
    Unknown,
}

impl ResponseStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Result)
    }
}

/// Reply from the recognition service. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecognitionResponse {
    /// First-pass recognized text
    #[serde(default)]
    pub asr_result: String,
    /// Text after rescoring (empty when rescoring is off)
    #[serde(default)]
    pub rescoring_result: String,
    /// Voice command detected in the utterance, if any
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub status: ResponseStatus,
    /// Service-side processing time in seconds
    #[serde(default)]
    pub time: f32,
}

impl RecognitionResponse {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_wire_format() {
        let hs = Handshake::new(SessionConfig {
            sample_rate: 16000,
            rescoring: true,
        });
        assert_eq!(
            hs.to_json(),
            r#"{"config":{"sample_rate":16000,"use_rescoring":true}}"#
        );
    }

    #[test]
    fn partial_response_decodes() {
        let resp = RecognitionResponse::from_json(
            r#"{"asr_result":"привет","rescoring_result":"","command":"","status":"partial","time":0.12}"#,
        )
        .unwrap();
        assert_eq!(resp.status, ResponseStatus::Partial);
        assert!(!resp.status.is_final());
        assert_eq!(resp.asr_result, "привет");
    }

    #[test]
    fn consolidated_response_without_status() {
        let resp = RecognitionResponse::from_json(
            r#"{"asr_result":"turn on the light","rescoring_result":"turn on the light","command":"light_on","time":1.5}"#,
        )
        .unwrap();
        assert_eq!(resp.status, ResponseStatus::Unknown);
        assert_eq!(resp.command, "light_on");
        assert!((resp.time - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_status_is_not_final() {
        let resp = RecognitionResponse::from_json(r#"{"status":"error"}"#).unwrap();
        assert_eq!(resp.status, ResponseStatus::Unknown);
        assert!(!resp.status.is_final());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(RecognitionResponse::from_json("not json").is_err());
        assert!(RecognitionResponse::from_slice(b"[1,2,3]").is_err());
    }
}
