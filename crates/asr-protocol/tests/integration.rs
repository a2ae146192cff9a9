//! Integration tests for the asr-protocol crate.
//!
//! These exercise the public API the way the load generator uses it: a loaded
//! payload is validated against the chunk layout, the handshake is encoded,
//! and a realistic stream of service replies is decoded.

use asr_protocol::audio::{chunk_size, unpaced_block_size, AudioPayload, ChunkLayout, LayoutError};
use asr_protocol::messages::{Handshake, RecognitionResponse, ResponseStatus, SessionConfig};
use asr_protocol::{DEFAULT_SAMPLE_RATE, EOF_SENTINEL, RESULT_ACK};

// ---------------------------------------------------------------------------
// 1. Payload layout
// ---------------------------------------------------------------------------

#[test]
fn three_second_payload_at_default_rate() {
    // 3 s of 16-bit mono PCM at 48 kHz
    let payload = AudioPayload::new("three_seconds.pcm", vec![0u8; 48000 * 2 * 3]);
    let layout = ChunkLayout::for_payload(&payload, DEFAULT_SAMPLE_RATE).unwrap();

    assert_eq!(layout.chunk_size(), 24000);
    assert_eq!(layout.chunk_count(), 12);
    assert_eq!(layout.chunks(&payload.bytes).count(), 12);
    assert!(layout.chunks(&payload.bytes).all(|c| c.len() == 24000));
}

#[test]
fn payload_misaligned_for_one_rate_may_fit_another() {
    // 12000 bytes: 1.5 chunks at 16 kHz, exactly 3 chunks at 8 kHz
    let payload = AudioPayload::new("odd.pcm", vec![1u8; 12000]);

    assert!(matches!(
        ChunkLayout::for_payload(&payload, 16000),
        Err(LayoutError::NotChunkAligned { len: 12000, chunk_size: 8000 })
    ));
    assert_eq!(ChunkLayout::for_payload(&payload, 8000).unwrap().chunk_count(), 3);
}

#[test]
fn payload_clones_share_bytes() {
    let payload = AudioPayload::new("shared.pcm", vec![7u8; 16]);
    let clone = payload.clone();
    assert!(std::sync::Arc::ptr_eq(&payload.bytes, &clone.bytes));
}

#[test]
fn unpaced_blocks_are_twice_the_paced_chunk() {
    for rate in [8000, 16000, 22050, 44100, 48000] {
        let paced = chunk_size(rate);
        let unpaced = unpaced_block_size(rate);
        assert!(unpaced.abs_diff(paced * 2) <= 1, "rate {rate}");
    }
}

// ---------------------------------------------------------------------------
// 2. Message flow
// ---------------------------------------------------------------------------

#[test]
fn handshake_decodes_back_into_config() {
    let config = SessionConfig {
        sample_rate: 8000,
        rescoring: false,
    };
    let json = Handshake::new(config).to_json();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["config"]["sample_rate"], 8000);
    assert_eq!(value["config"]["use_rescoring"], false);
}

#[test]
fn incremental_stream_ends_with_result() {
    let frames = [
        r#"{"asr_result":"","status":"partial","time":0.01}"#,
        r#"{"asr_result":"open","status":"partial","time":0.02}"#,
        r#"{"asr_result":"open the door","rescoring_result":"open the door","command":"door_open","status":"result","time":0.31}"#,
    ];

    let decoded: Vec<RecognitionResponse> = frames
        .iter()
        .map(|f| RecognitionResponse::from_json(f).unwrap())
        .collect();

    let finals: Vec<usize> = decoded
        .iter()
        .enumerate()
        .filter(|(_, r)| r.status.is_final())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(finals, vec![2]);
    assert_eq!(decoded[2].command, "door_open");
    assert_eq!(decoded[0].status, ResponseStatus::Partial);
}

#[test]
fn response_serializes_with_lowercase_status() {
    let resp = RecognitionResponse {
        asr_result: "yes".into(),
        status: ResponseStatus::Result,
        time: 0.5,
        ..Default::default()
    };
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["status"], "result");
    assert_eq!(json["asr_result"], "yes");
}

#[test]
fn sentinels_are_plain_ascii() {
    assert_eq!(EOF_SENTINEL, "eof");
    assert_eq!(RESULT_ACK, "OK");
}
