use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

use asr_protocol::messages::SessionConfig;
use asr_protocol::{DEFAULT_METRICS_LISTEN, DEFAULT_SAMPLE_RATE, DEFAULT_STEP_MS};

use crate::session::{ExchangeSettings, SessionMode};
use crate::worker::{FailurePolicy, PayloadSelection, WorkerPlan};

/// A complete run description, from a TOML profile or the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadTestConfig {
    pub target: TargetSection,
    #[serde(default)]
    pub load: LoadSection,
    #[serde(default)]
    pub session: SessionSection,
    pub audio: AudioSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSection {
    /// `host:port` or a full `ws://` / `wss://` URL
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_pause_min_ms")]
    pub pause_min_ms: u64,
    #[serde(default = "default_pause_max_ms")]
    pub pause_max_ms: u64,
    #[serde(default)]
    pub on_error: FailurePolicy,
    #[serde(default)]
    pub selection: PayloadSelection,
}

impl Default for LoadSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            duration_secs: default_duration_secs(),
            pause_min_ms: default_pause_min_ms(),
            pause_max_ms: default_pause_max_ms(),
            on_error: FailurePolicy::default(),
            selection: PayloadSelection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub rescoring: bool,
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    /// 0 disables the per-operation deadline
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            sample_rate: default_sample_rate(),
            rescoring: false,
            step_ms: default_step_ms(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSection {
    /// A single PCM file or a directory of them
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    /// Empty: the audio path is used
    #[serde(default)]
    pub run_name: String,
    #[serde(default)]
    pub csv: Option<PathBuf>,
    #[serde(default)]
    pub results_json: Option<PathBuf>,
    /// Empty: stdout
    #[serde(default)]
    pub histogram: Option<PathBuf>,
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
    #[serde(default = "default_histogram_width")]
    pub histogram_width: usize,
    #[serde(default = "default_true")]
    pub print_histogram: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            run_name: String::new(),
            csv: None,
            results_json: None,
            histogram: None,
            histogram_bins: default_histogram_bins(),
            histogram_width: default_histogram_width(),
            print_histogram: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

// Default value functions
fn default_workers() -> usize { 1 }
fn default_duration_secs() -> u64 { 30 * 60 }
fn default_pause_min_ms() -> u64 { 1 }
fn default_pause_max_ms() -> u64 { 50 }
fn default_sample_rate() -> u32 { DEFAULT_SAMPLE_RATE }
fn default_step_ms() -> u64 { DEFAULT_STEP_MS }
fn default_io_timeout_ms() -> u64 { 30_000 }
fn default_histogram_bins() -> usize { 9 }
fn default_histogram_width() -> usize { 5 }
fn default_true() -> bool { true }
fn default_metrics_listen() -> String { DEFAULT_METRICS_LISTEN.to_string() }

impl LoadTestConfig {
    /// Minimal config: everything but host and audio at defaults.
    pub fn new(host: impl Into<String>, audio: impl Into<PathBuf>) -> Self {
        Self {
            target: TargetSection { host: host.into() },
            load: LoadSection::default(),
            session: SessionSection::default(),
            audio: AudioSection { path: audio.into() },
            output: OutputSection::default(),
            metrics: MetricsSection::default(),
        }
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(text).context("invalid profile")?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read profile {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in profile {}", path.display()))
    }

    /// Empty path strings in TOML mean "not set".
    fn normalize(&mut self) {
        let output = &mut self.output;
        for slot in [&mut output.csv, &mut output.results_json, &mut output.histogram] {
            if slot.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                *slot = None;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target.host.trim().is_empty() {
            bail!("target host is empty");
        }
        if self.load.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.load.pause_min_ms > self.load.pause_max_ms {
            bail!(
                "pause_min_ms ({}) is greater than pause_max_ms ({})",
                self.load.pause_min_ms,
                self.load.pause_max_ms
            );
        }
        if self.session.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.session.step_ms == 0 {
            bail!("step_ms must be positive");
        }
        if self.output.histogram_bins == 0 {
            bail!("histogram_bins must be positive");
        }
        Ok(())
    }

    /// WebSocket URL of the service, `ws://` added when no scheme is given.
    pub fn target_url(&self) -> String {
        let host = self.target.host.trim();
        if host.starts_with("ws://") || host.starts_with("wss://") {
            host.to_string()
        } else {
            format!("ws://{host}")
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.load.duration_secs)
    }

    pub fn run_name(&self) -> String {
        if self.output.run_name.is_empty() {
            self.audio.path.display().to_string()
        } else {
            self.output.run_name.clone()
        }
    }

    pub fn exchange_settings(&self) -> ExchangeSettings {
        ExchangeSettings {
            url: self.target_url(),
            config: SessionConfig {
                sample_rate: self.session.sample_rate,
                rescoring: self.session.rescoring,
            },
            step: Duration::from_millis(self.session.step_ms),
            io_timeout: (self.session.io_timeout_ms > 0).then(|| Duration::from_millis(self.session.io_timeout_ms)),
        }
    }

    pub fn worker_plan(&self) -> WorkerPlan {
        WorkerPlan {
            pause_min: Duration::from_millis(self.load.pause_min_ms),
            pause_max: Duration::from_millis(self.load.pause_max_ms),
            on_error: self.load.on_error,
            selection: self.load.selection,
        }
    }
}
