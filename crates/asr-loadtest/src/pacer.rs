/// Real-time pacing for paced exchanges.
///
/// The pacer runs as its own task and grants one permit per chunk, one step
/// apart, so a session never streams faster than live audio regardless of
/// how quickly the service answers. Once the last permit is granted it starts
/// the exchange timer and waits for the session to call `finish()`; the
/// reported duration is therefore the tail latency after the final chunk's
/// real-time arrival, not the whole call.
///
/// Closing rules: `finish()` and `stop()` both consume the handle, so a
/// session closes its pacer exactly once. Dropping the handle is equivalent
/// to `stop()`; the task notices the closed permit channel or the dropped
/// finish signal and exits without reporting.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::trace;

pub struct ChunkPacer {
    permits: mpsc::Receiver<u32>,
    done: oneshot::Sender<()>,
    elapsed: oneshot::Receiver<Duration>,
    task: JoinHandle<()>,
}

impl ChunkPacer {
    /// Spawn a pacer for `chunks` chunks at one permit per `step`.
    pub fn start(chunks: u32, step: Duration) -> Self {
        // Room for every permit: the ticker never waits on a slow session
        let (permit_tx, permits) = mpsc::channel(chunks.max(1) as usize);
        let (done, done_rx) = oneshot::channel();
        let (elapsed_tx, elapsed) = oneshot::channel();

        let task = tokio::spawn(run(chunks, step, permit_tx, done_rx, elapsed_tx));

        Self {
            permits,
            done,
            elapsed,
            task,
        }
    }

    /// Wait for permission to send the next chunk. Yields the 1-based chunk
    /// index, or `None` once the schedule is exhausted.
    pub async fn next_permit(&mut self) -> Option<u32> {
        self.permits.recv().await
    }

    /// Signal that the exchange completed and collect the time elapsed since
    /// the last permit was granted.
    pub async fn finish(self) -> Option<Duration> {
        self.done.send(()).ok()?;
        self.elapsed.await.ok()
    }

    /// Abandon the schedule early (session failed).
    pub fn stop(self) {
        trace!("Pacer stopped early");
        drop(self);
    }
}

async fn run(
    chunks: u32,
    step: Duration,
    permits: mpsc::Sender<u32>,
    done: oneshot::Receiver<()>,
    elapsed: oneshot::Sender<Duration>,
) {
    let mut ticker = interval_at(Instant::now() + step, step);

    for index in 1..=chunks {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = permits.closed() => return,
        }
        if permits.send(index).await.is_err() {
            return;
        }
    }
    drop(permits);

    let start = Instant::now();

    // Err: the session dropped us without finishing
    if done.await.is_err() {
        return;
    }

    let _ = elapsed.send(start.elapsed());
}
