pub mod audio;
pub mod messages;

/// Duration of audio carried by one streamed chunk
pub const CHUNK_DURATION_MS: usize = 250;

/// Raw PCM is 16-bit mono
pub const BYTES_PER_SAMPLE: usize = 2;

/// Default pacing step between chunk permissions
pub const DEFAULT_STEP_MS: u64 = 250;

/// Sample rate the recognition service is usually configured for
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Text frame sent after the last block in the unpaced protocol
pub const EOF_SENTINEL: &str = "eof";

/// Text frame acknowledging the consolidated result in the unpaced protocol
pub const RESULT_ACK: &str = "OK";

/// Default listen address for the Prometheus scrape endpoint
pub const DEFAULT_METRICS_LISTEN: &str = "0.0.0.0:8081";
