use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::aggregate::RunSummary;
use crate::config::LoadTestConfig;
use crate::generator::LoadGenerator;
use crate::metrics::{self, LatencyHistogram, MetricsSink, NoopSink};
use crate::report::{self, RunLabel};
use crate::session;
use crate::worker::{RunCounters, WorkerContext};

/// Run one load test end to end and return its summary. Reports are left
/// to `write_reports`.
pub async fn execute(config: &LoadTestConfig, cancel: CancellationToken) -> anyhow::Result<RunSummary> {
    let payloads = crate::audio::load_payloads(&config.audio.path, config.session.sample_rate).await?;
    let counters = Arc::new(RunCounters::default());

    let histogram = Arc::new(LatencyHistogram::new());
    let metrics_cancel = cancel.child_token();
    let metrics_task = if config.metrics.enabled {
        let listener = TcpListener::bind(&config.metrics.listen)
            .await
            .with_context(|| format!("cannot bind metrics endpoint {}", config.metrics.listen))?;
        let histogram = Arc::clone(&histogram);
        let counters = Arc::clone(&counters);
        let token = metrics_cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = metrics::serve(listener, histogram, counters, token).await {
                error!("Metrics endpoint failed: {}", e);
            }
        }))
    } else {
        None
    };
    let sink: Arc<dyn MetricsSink> = if config.metrics.enabled {
        histogram as Arc<dyn MetricsSink>
    } else {
        Arc::new(NoopSink)
    };

    let settings = config.exchange_settings();
    info!(url = %settings.url, mode = config.session.mode.as_str(), sample_rate = settings.config.sample_rate, "Target");

    let ctx = Arc::new(WorkerContext {
        session: session::build(config.session.mode, settings),
        payloads,
        sink,
        counters: Arc::clone(&counters),
        cancel,
        plan: config.worker_plan(),
    });

    let workers = LoadGenerator::new(config.load.workers, config.duration(), ctx).run().await;

    metrics_cancel.cancel();
    if let Some(task) = metrics_task {
        if let Err(e) = task.await {
            error!("Metrics task failed: {}", e);
        }
    }

    Ok(RunSummary::collect(workers, &counters))
}

/// Console summary plus every configured output file.
pub fn write_reports(config: &LoadTestConfig, summary: &RunSummary) -> anyhow::Result<()> {
    let name = config.run_name();
    let label = RunLabel {
        name: &name,
        host: &config.target.host,
        workers: config.load.workers,
        duration: config.duration(),
    };

    report::print_summary(&label, summary);

    if let Some(path) = &config.output.csv {
        report::append_csv(path, &label, summary)?;
    }
    if let Some(path) = &config.output.results_json {
        report::write_results_json(path, &summary.results)?;
    }
    if config.output.print_histogram && !summary.latencies_ms.is_empty() {
        report::write_histogram(
            config.output.histogram.as_deref(),
            &summary.latencies_ms,
            config.output.histogram_bins,
            config.output.histogram_width,
        )?;
    }
    Ok(())
}
