use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info};

use crate::worker::{Worker, WorkerContext, WorkerResult};

/// Spawns the workers of one run and waits for all of them.
pub struct LoadGenerator {
    workers: usize,
    duration: Duration,
    ctx: Arc<WorkerContext>,
}

impl LoadGenerator {
    pub fn new(workers: usize, duration: Duration, ctx: Arc<WorkerContext>) -> Self {
        Self {
            workers,
            duration,
            ctx,
        }
    }

    /// Run every worker to completion. A worker that panics is logged and
    /// contributes nothing; the rest are still collected.
    pub async fn run(self) -> Vec<WorkerResult> {
        let deadline = Instant::now() + self.duration;

        info!(
            workers = self.workers,
            duration_secs = self.duration.as_secs(),
            session = self.ctx.session.name(),
            payloads = self.ctx.payloads.len(),
            "Starting load"
        );

        let handles: Vec<_> = (0..self.workers)
            .map(|id| {
                let worker = Worker::new(id, Arc::clone(&self.ctx), deadline);
                (id, tokio::spawn(worker.run()))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => error!(worker = id, "Worker task failed: {}", e),
            }
        }

        info!(
            attempts = self.ctx.counters.attempts(),
            errors = self.ctx.counters.errors(),
            "All workers finished"
        );

        results
    }
}
