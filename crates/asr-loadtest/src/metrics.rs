/// Live metrics for external scraping.
///
/// Workers push one latency observation per completed exchange into a
/// `MetricsSink`. The Prometheus sink keeps a fixed-bucket histogram on
/// atomics; `serve()` exposes it together with the run counters at
/// `GET /metrics` in text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::worker::RunCounters;

/// Fire-and-forget latency recording.
pub trait MetricsSink: Send + Sync {
    fn observe(&self, elapsed: Duration);
}

/// Sink used when no endpoint is configured.
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn observe(&self, _elapsed: Duration) {}
}

/// Upper bounds in milliseconds. Exchange tails range from tens of ms to
/// several seconds under overload.
const BUCKET_BOUNDS_MS: [u64; 10] = [50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 60_000];

const BUCKET_LABELS: [&str; 10] = ["0.05", "0.1", "0.25", "0.5", "1", "2.5", "5", "10", "30", "60"];

/// Prometheus-compatible cumulative histogram of exchange latencies.
pub struct LatencyHistogram {
    /// bucket[i] counts observations <= BUCKET_BOUNDS_MS[i]
    buckets: [AtomicU64; 10],
    count: AtomicU64,
    sum_us: AtomicU64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Relaxed)
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (bucket, label) in self.buckets.iter().zip(BUCKET_LABELS) {
            let _ = writeln!(out, "{name}_bucket{{le=\"{label}\"}} {}", bucket.load(Relaxed));
        }
        let count = self.count.load(Relaxed);
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {count}");
        let sum_us = self.sum_us.load(Relaxed);
        let _ = writeln!(out, "{name}_sum {}.{:06}", sum_us / 1_000_000, sum_us % 1_000_000);
        let _ = writeln!(out, "{name}_count {count}");
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for LatencyHistogram {
    fn observe(&self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        let ms = us / 1000;
        self.sum_us.fetch_add(us, Relaxed);
        self.count.fetch_add(1, Relaxed);
        for (bucket, &bound) in self.buckets.iter().zip(BUCKET_BOUNDS_MS.iter()) {
            if ms <= bound {
                bucket.fetch_add(1, Relaxed);
            }
        }
    }
}

fn render_counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

/// Render histogram and counters in Prometheus text exposition format.
pub fn render_prometheus(histogram: &LatencyHistogram, counters: &RunCounters) -> String {
    let mut out = String::with_capacity(2048);
    render_counter(
        &mut out,
        "asr_loadtest_requests_total",
        "Exchanges attempted",
        counters.attempts(),
    );
    render_counter(
        &mut out,
        "asr_loadtest_errors_total",
        "Exchanges that failed",
        counters.errors(),
    );
    histogram.render(
        "asr_loadtest_request_duration_seconds",
        "Latency of successful exchanges",
        &mut out,
    );
    out
}

#[derive(Clone)]
struct MetricsState {
    histogram: Arc<LatencyHistogram>,
    counters: Arc<RunCounters>,
}

/// Serve `GET /metrics` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    histogram: Arc<LatencyHistogram>,
    counters: Arc<RunCounters>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let app = axum::Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(MetricsState { histogram, counters });

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Metrics endpoint listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_prometheus(&state.histogram, &state.counters),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observations_fill_cumulative_buckets() {
        let hist = LatencyHistogram::new();
        hist.observe(Duration::from_millis(40));
        hist.observe(Duration::from_millis(300));
        hist.observe(Duration::from_secs(90));

        let loads: Vec<u64> = hist.buckets.iter().map(|b| b.load(Relaxed)).collect();
        assert_eq!(loads, vec![1, 1, 1, 2, 2, 2, 2, 2, 2, 2]);
        assert_eq!(hist.count(), 3);
    }

    #[test]
    fn render_includes_counters_and_sum() {
        let hist = LatencyHistogram::new();
        hist.observe(Duration::from_millis(1500));
        let counters = RunCounters::default();
        counters.record_attempt();
        counters.record_attempt();
        counters.record_error();

        let text = render_prometheus(&hist, &counters);
        assert!(text.contains("asr_loadtest_requests_total 2\n"));
        assert!(text.contains("asr_loadtest_errors_total 1\n"));
        assert!(text.contains("asr_loadtest_request_duration_seconds_bucket{le=\"1\"} 0\n"));
        assert!(text.contains("asr_loadtest_request_duration_seconds_bucket{le=\"2.5\"} 1\n"));
        assert!(text.contains("asr_loadtest_request_duration_seconds_bucket{le=\"+Inf\"} 1\n"));
        assert!(text.contains("asr_loadtest_request_duration_seconds_sum 1.500000\n"));
        assert!(text.contains("asr_loadtest_request_duration_seconds_count 1\n"));
    }

    #[test]
    fn noop_sink_accepts_anything() {
        NoopSink.observe(Duration::MAX);
    }
}
