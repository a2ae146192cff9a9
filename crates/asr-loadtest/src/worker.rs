/// Worker loop: one simulated client.
///
/// Each worker repeatedly pauses, picks a payload and runs one exchange
/// until the run deadline passes or the run is cancelled. Successful
/// exchanges are kept locally and handed back once through the task's
/// join handle; failures only bump the shared error counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use asr_protocol::audio::AudioPayload;
use asr_protocol::messages::RecognitionResponse;

use crate::metrics::MetricsSink;
use crate::session::ExchangeSession;

/// Attempts and failures across every worker of a run.
#[derive(Debug, Default)]
pub struct RunCounters {
    attempts: AtomicU64,
    errors: AtomicU64,
}

impl RunCounters {
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// What a worker does after a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Move on to the next scheduled attempt
    #[default]
    Skip,
    /// Re-run the same payload immediately, without pausing
    Retry,
}

/// How a worker picks from a pool of payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSelection {
    #[default]
    Random,
    /// Round-robin, starting at the worker's id
    Sequential,
}

/// One recognized payload, as dumped to the results file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioResult {
    pub filename: String,
    #[serde(flatten)]
    pub response: RecognitionResponse,
}

/// Everything a worker produced, successes only.
#[derive(Debug, Default)]
pub struct WorkerResult {
    pub worker_id: usize,
    pub latencies_ms: Vec<u64>,
    pub results: Vec<AudioResult>,
}

/// Per-run pacing and policy knobs shared by all workers.
#[derive(Debug, Clone)]
pub struct WorkerPlan {
    pub pause_min: Duration,
    pub pause_max: Duration,
    pub on_error: FailurePolicy,
    pub selection: PayloadSelection,
}

/// Read-only state shared by every worker of a run.
pub struct WorkerContext {
    pub session: Arc<dyn ExchangeSession>,
    pub payloads: Arc<[AudioPayload]>,
    pub sink: Arc<dyn MetricsSink>,
    pub counters: Arc<RunCounters>,
    pub cancel: CancellationToken,
    pub plan: WorkerPlan,
}

pub struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
    deadline: Instant,
    cursor: usize,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>, deadline: Instant) -> Self {
        Self {
            id,
            ctx,
            deadline,
            cursor: id,
        }
    }

    fn should_stop(&self) -> bool {
        Instant::now() >= self.deadline || self.ctx.cancel.is_cancelled()
    }

    fn next_pause(&self) -> Duration {
        let plan = &self.ctx.plan;
        if plan.pause_max <= plan.pause_min {
            return plan.pause_min;
        }
        let min = plan.pause_min.as_millis() as u64;
        let max = plan.pause_max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    fn next_payload(&mut self) -> Option<usize> {
        let count = self.ctx.payloads.len();
        match count {
            0 => None,
            1 => Some(0),
            _ => match self.ctx.plan.selection {
                PayloadSelection::Random => Some(rand::rng().random_range(0..count)),
                PayloadSelection::Sequential => {
                    let index = self.cursor % count;
                    self.cursor = self.cursor.wrapping_add(1);
                    Some(index)
                }
            },
        }
    }

    /// Run until the deadline or cancellation.
    pub async fn run(mut self) -> WorkerResult {
        let mut out = WorkerResult {
            worker_id: self.id,
            ..Default::default()
        };
        let ctx = Arc::clone(&self.ctx);

        debug!(worker = self.id, "Worker started");

        while !self.should_stop() {
            let pause = self.next_pause();
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = ctx.cancel.cancelled() => break,
            }

            let Some(index) = self.next_payload() else {
                warn!(worker = self.id, "No payloads to send");
                break;
            };
            let payload = &ctx.payloads[index];

            loop {
                ctx.counters.record_attempt();
                match ctx.session.run(payload).await {
                    Ok(exchange) => {
                        let elapsed_ms = exchange.elapsed.as_millis() as u64;
                        debug!(worker = self.id, payload = %payload.name, elapsed_ms, chunks = exchange.chunks_sent, "Exchange complete");
                        ctx.sink.observe(exchange.elapsed);
                        out.latencies_ms.push(elapsed_ms);
                        out.results.push(AudioResult {
                            filename: payload.name.clone(),
                            response: exchange.response,
                        });
                        break;
                    }
                    Err(e) => {
                        warn!(worker = self.id, payload = %payload.name, kind = e.kind(), "Exchange failed: {}", e);
                        ctx.counters.record_error();
                        let retry = ctx.plan.on_error == FailurePolicy::Retry && e.is_retryable();
                        if retry && !self.should_stop() {
                            // A failure may return without ever awaiting
                            tokio::task::yield_now().await;
                            continue;
                        }
                        break;
                    }
                }
            }
        }

        debug!(worker = self.id, completed = out.latencies_ms.len(), "Worker finished");
        out
    }
}
