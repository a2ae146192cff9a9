use serde::Serialize;

use crate::worker::{AudioResult, RunCounters, WorkerResult};

/// Latency statistics over successful exchanges, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub count: usize,
    pub sum: u64,
    pub mean: f64,
    pub median: f64,
    pub min: u64,
    pub max: u64,
}

impl AggregateStats {
    /// All zero for an empty slice.
    pub fn from_latencies(latencies_ms: &[u64]) -> Self {
        if latencies_ms.is_empty() {
            return Self::default();
        }

        let mut sorted = latencies_ms.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        let sum: u64 = sorted.iter().sum();

        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
        } else {
            sorted[n / 2] as f64
        };

        Self {
            count: n,
            sum,
            mean: sum as f64 / n as f64,
            median,
            min: sorted[0],
            max: sorted[n - 1],
        }
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stats: AggregateStats,
    pub latencies_ms: Vec<u64>,
    pub attempts: u64,
    pub errors: u64,
    /// Errors per successful exchange, absent when nothing succeeded
    pub avg_errors_per_request: Option<f64>,
    pub results: Vec<AudioResult>,
}

impl RunSummary {
    /// Merge worker outputs with the shared counters.
    pub fn collect(workers: Vec<WorkerResult>, counters: &RunCounters) -> Self {
        let mut latencies_ms = Vec::new();
        let mut results = Vec::new();
        for worker in workers {
            latencies_ms.extend(worker.latencies_ms);
            results.extend(worker.results);
        }

        let stats = AggregateStats::from_latencies(&latencies_ms);
        let errors = counters.errors();
        let avg_errors_per_request = (stats.count > 0).then(|| errors as f64 / stats.count as f64);

        Self {
            stats,
            latencies_ms,
            attempts: counters.attempts(),
            errors,
            avg_errors_per_request,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_samples() {
        let stats = AggregateStats::from_latencies(&[30, 10, 40, 20]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.sum, 100);
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 40);
        assert_eq!(stats.mean, 25.0);
        assert_eq!(stats.median, 25.0);
    }

    #[test]
    fn odd_count_median_is_middle() {
        let stats = AggregateStats::from_latencies(&[5, 100, 7]);
        assert_eq!(stats.median, 7.0);
        assert_eq!(stats.max, 100);
    }

    #[test]
    fn empty_is_all_zero() {
        let stats = AggregateStats::from_latencies(&[]);
        assert_eq!(stats, AggregateStats::default());
        assert!(!stats.mean.is_nan());
    }

    #[test]
    fn summary_without_successes_has_no_error_ratio() {
        let counters = RunCounters::default();
        counters.record_attempt();
        counters.record_error();

        let summary = RunSummary::collect(vec![WorkerResult::default()], &counters);
        assert_eq!(summary.stats.count, 0);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.avg_errors_per_request, None);
    }

    #[test]
    fn summary_merges_workers() {
        let counters = RunCounters::default();
        for _ in 0..5 {
            counters.record_attempt();
        }
        counters.record_error();

        let workers = vec![
            WorkerResult {
                worker_id: 0,
                latencies_ms: vec![10, 20],
                ..Default::default()
            },
            WorkerResult {
                worker_id: 1,
                latencies_ms: vec![30, 40],
                ..Default::default()
            },
        ];

        let summary = RunSummary::collect(workers, &counters);
        assert_eq!(summary.stats.count, 4);
        assert_eq!(summary.latencies_ms, vec![10, 20, 30, 40]);
        assert_eq!(summary.attempts, 5);
        assert_eq!(summary.avg_errors_per_request, Some(0.25));
    }
}
