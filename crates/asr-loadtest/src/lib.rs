pub mod aggregate;
pub mod audio;
pub mod config;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod pacer;
pub mod report;
pub mod runner;
pub mod session;
pub mod worker;

/// Git short hash baked in at build time.
pub const GIT_HASH: &str = env!("ASR_LOADTEST_GIT_HASH");
