/// Load generator for streaming speech-recognition services.
///
/// Usage:
///   asr-loadtest online  --host H --pcm-path DIR    Paced streaming of a pool of payloads
///   asr-loadtest batch   --host H --filename FILE   Unpaced upload of one payload with retries
///   asr-loadtest profile --config run.toml          Run described by a TOML profile

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use asr_loadtest::config::LoadTestConfig;
use asr_loadtest::runner;
use asr_loadtest::session::SessionMode;
use asr_loadtest::worker::{FailurePolicy, PayloadSelection};
use asr_loadtest::GIT_HASH;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ASR_LOADTEST_GIT_HASH"), ")");

// ── CLI ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "asr-loadtest", version = VERSION, about = "Load test for streaming speech recognition over WebSocket")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream 250 ms chunks in real time from a directory of PCM files
    Online(OnlineArgs),
    /// Upload one PCM file as fast as possible, retrying failed requests
    Batch(BatchArgs),
    /// Run a load test described by a TOML profile
    Profile {
        /// Path to the profile
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Service address with port (e.g. localhost:2700) or a ws:// URL
    #[arg(long, env = "ASR_HOST")]
    host: String,

    /// Concurrent workers
    #[arg(short, long, default_value = "1")]
    workers: usize,

    /// Test duration in minutes
    #[arg(short, long, default_value = "30")]
    duration: u64,

    /// Sample rate of the PCM payloads
    #[arg(long, default_value = "48000")]
    sr: u32,

    /// Ask the service for a rescoring pass
    #[arg(long)]
    rescore: bool,

    /// Lower bound of the random pause between requests, ms
    #[arg(long, default_value = "1")]
    pause_min: u64,

    /// Upper bound of the random pause between requests, ms
    #[arg(long, default_value = "50")]
    pause_max: u64,

    /// Append a summary row to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Deadline for each connect, read and write in ms (0 disables)
    #[arg(long, default_value = "30000")]
    io_timeout_ms: u64,
}

#[derive(clap::Args)]
struct OnlineArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Directory with PCM files
    #[arg(long)]
    pcm_path: PathBuf,

    /// Name of the run (defaults to the PCM path)
    #[arg(long, default_value = "")]
    run_name: String,

    /// Histogram bins
    #[arg(long, default_value = "9")]
    bins: usize,

    /// Histogram bar width
    #[arg(long, default_value = "5")]
    width: usize,

    /// Write the histogram to this file instead of stdout
    #[arg(long)]
    plt: Option<PathBuf>,

    /// JSON file with every recognition result
    #[arg(long, default_value = "res.json")]
    res_file: PathBuf,

    /// Prometheus endpoint listen address
    #[arg(long, default_value = asr_protocol::DEFAULT_METRICS_LISTEN)]
    metrics_listen: String,

    /// Do not serve /metrics
    #[arg(long)]
    no_metrics: bool,
}

#[derive(clap::Args)]
struct BatchArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// PCM file to upload
    #[arg(long)]
    filename: PathBuf,
}

fn base_config(common: &CommonArgs, audio: PathBuf) -> LoadTestConfig {
    let mut config = LoadTestConfig::new(common.host.clone(), audio);
    config.load.workers = common.workers;
    config.load.duration_secs = common.duration * 60;
    config.load.pause_min_ms = common.pause_min;
    config.load.pause_max_ms = common.pause_max;
    config.session.sample_rate = common.sr;
    config.session.rescoring = common.rescore;
    config.session.io_timeout_ms = common.io_timeout_ms;
    config.output.csv = common.csv.clone();
    config
}

async fn build_config(command: Command) -> anyhow::Result<LoadTestConfig> {
    let config = match command {
        Command::Online(args) => {
            let mut config = base_config(&args.common, args.pcm_path);
            config.session.mode = SessionMode::Paced;
            config.load.on_error = FailurePolicy::Skip;
            config.load.selection = PayloadSelection::Random;
            config.output.run_name = args.run_name;
            config.output.histogram_bins = args.bins;
            config.output.histogram_width = args.width;
            config.output.histogram = args.plt;
            config.output.results_json = Some(args.res_file);
            config.metrics.enabled = !args.no_metrics;
            config.metrics.listen = args.metrics_listen;
            config
        }
        Command::Batch(args) => {
            let mut config = base_config(&args.common, args.filename);
            config.session.mode = SessionMode::Unpaced;
            config.load.on_error = FailurePolicy::Retry;
            config.output.print_histogram = false;
            config
        }
        Command::Profile { config } => return LoadTestConfig::load(&config).await,
    };
    config.validate()?;
    Ok(config)
}

// ── Main ─────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = build_config(args.command).await?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = GIT_HASH,
        run = %config.run_name(),
        workers = config.load.workers,
        "asr-loadtest starting"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping workers after their current exchange");
            ctrl_c.cancel();
        }
    });

    let summary = runner::execute(&config, cancel).await?;
    runner::write_reports(&config, &summary)?;

    Ok(())
}
