/// Run reports: console summary, CSV summary row, latency histogram and the
/// per-exchange JSON dump.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::aggregate::RunSummary;
use crate::worker::AudioResult;

pub const CSV_HEADER: &str = "name;host;workers;avg;median;max;min;reqs;duration;avgwserrors";

/// Identifies a run in the CSV file.
#[derive(Debug, Clone)]
pub struct RunLabel<'a> {
    pub name: &'a str,
    pub host: &'a str,
    pub workers: usize,
    pub duration: Duration,
}

/// Print the boxed summary to stdout.
pub fn print_summary(label: &RunLabel<'_>, summary: &RunSummary) {
    let stats = &summary.stats;
    println!();
    println!("╔═══════════════════════════════════════════════════╗");
    println!("║ {:<49} ║", format!("Run: {}", label.name));
    println!("╠═══════════════════════════════════════════════════╣");
    println!("║ {:<49} ║", format!("Completed: {}/{}", stats.count, summary.attempts));
    if stats.count > 0 {
        println!("║ {:<49} ║", format!("Total request time:  {}ms", stats.sum));
        println!("║ {:<49} ║", format!("Average:             {:.0}ms", stats.mean));
        println!("║ {:<49} ║", format!("Median:              {:.0}ms", stats.median));
        println!("║ {:<49} ║", format!("Max:                 {}ms", stats.max));
        println!("║ {:<49} ║", format!("Min:                 {}ms", stats.min));
    } else {
        println!("║ {:<49} ║", "No successful requests");
    }
    if summary.errors > 0 {
        let ratio = summary
            .avg_errors_per_request
            .map(|r| format!("{r:.2}"))
            .unwrap_or_else(|| "n/a".into());
        println!("║ {:<49} ║", format!("Errors: {}, per request: {}", summary.errors, ratio));
    }
    println!("╚═══════════════════════════════════════════════════╝");
}

/// One `;`-separated summary line, without the trailing newline.
pub fn csv_row(label: &RunLabel<'_>, summary: &RunSummary) -> String {
    let stats = &summary.stats;
    format!(
        "{};{};{};{:.0}ms;{:.0}ms;{}ms;{}ms;{};{}s;{:.2}",
        label.name,
        label.host,
        label.workers,
        stats.mean,
        stats.median,
        stats.max,
        stats.min,
        stats.count,
        label.duration.as_secs(),
        summary.avg_errors_per_request.unwrap_or(0.0),
    )
}

/// Append the summary row to `path`, writing the header first when the
/// file is new.
pub fn append_csv(path: &Path, label: &RunLabel<'_>, summary: &RunSummary) -> anyhow::Result<()> {
    let is_new = !path.exists();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open csv file {}", path.display()))?;

    let mut out = String::new();
    if is_new {
        out.push_str(CSV_HEADER);
        out.push('\n');
    }
    out.push_str(&csv_row(label, summary));
    out.push('\n');

    file.write_all(out.as_bytes())
        .with_context(|| format!("cannot write csv file {}", path.display()))?;
    info!(path = %path.display(), "Summary row written");
    Ok(())
}

/// Text histogram of latencies: `bins` equal-width buckets between min and
/// max, bars scaled so the fullest bucket is `width` characters.
pub fn render_histogram(latencies_ms: &[u64], bins: usize, width: usize) -> String {
    let mut out = String::new();
    let (Some(&min), Some(&max)) = (latencies_ms.iter().min(), latencies_ms.iter().max()) else {
        return out;
    };
    let bins = bins.max(1);

    let span = (max - min) as f64;
    let bin_width = span / bins as f64;
    let mut counts = vec![0usize; bins];
    for &ms in latencies_ms {
        let index = if span == 0.0 {
            0
        } else {
            (((ms - min) as f64 / bin_width) as usize).min(bins - 1)
        };
        counts[index] += 1;
    }

    let total = latencies_ms.len() as f64;
    let peak = counts.iter().copied().max().unwrap_or(0).max(1);
    for (i, &count) in counts.iter().enumerate() {
        let lo = min as f64 + bin_width * i as f64;
        let bar = "▇".repeat(count * width / peak);
        let _ = writeln!(
            out,
            "{:>8}  {:6.2}%  {:<width$}  {}",
            format!("{}ms", lo as u64),
            count as f64 * 100.0 / total,
            bar,
            count,
        );
    }
    out
}

/// Write the histogram to `path`, or stdout when `path` is `None`.
pub fn write_histogram(path: Option<&Path>, latencies_ms: &[u64], bins: usize, width: usize) -> anyhow::Result<()> {
    let text = render_histogram(latencies_ms, bins, width);
    match path {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("cannot write histogram {}", path.display()))?;
            info!(path = %path.display(), "Histogram written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Pretty-printed JSON array of per-exchange results.
pub fn write_results_json(path: &Path, results: &[AudioResult]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json).with_context(|| format!("cannot write results {}", path.display()))?;
    info!(path = %path.display(), count = results.len(), "Results written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::aggregate::AggregateStats;
    use asr_protocol::messages::{RecognitionResponse, ResponseStatus};

    fn summary(latencies: Vec<u64>, attempts: u64, errors: u64) -> RunSummary {
        let stats = AggregateStats::from_latencies(&latencies);
        RunSummary {
            stats,
            avg_errors_per_request: (stats.count > 0).then(|| errors as f64 / stats.count as f64),
            latencies_ms: latencies,
            attempts,
            errors,
            results: Vec::new(),
        }
    }

    fn label() -> RunLabel<'static> {
        RunLabel {
            name: "pcm/",
            host: "localhost:2700",
            workers: 4,
            duration: Duration::from_secs(60),
        }
    }

    fn scratch(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("asr-loadtest-{}-{name}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn csv_row_format() {
        let row = csv_row(&label(), &summary(vec![10, 20, 30, 40], 5, 1));
        assert_eq!(row, "pcm/;localhost:2700;4;25ms;25ms;40ms;10ms;4;60s;0.25");
    }

    #[test]
    fn csv_header_written_once() {
        let path = scratch("summary.csv");
        let s = summary(vec![100], 1, 0);
        append_csv(&path, &label(), &s).unwrap();
        append_csv(&path, &label(), &s).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], lines[2]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn histogram_counts_every_sample() {
        let latencies = [100, 110, 120, 200, 200, 200, 300, 900, 1000];
        let text = render_histogram(&latencies, 9, 5);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 9);

        let total: usize = lines
            .iter()
            .map(|l| l.split_whitespace().last().unwrap().parse::<usize>().unwrap())
            .sum();
        assert_eq!(total, latencies.len());
        assert!(lines[0].starts_with("   100ms"));
        // Fullest bucket gets the full bar
        assert!(lines.iter().any(|l| l.contains(&"▇".repeat(5))));
    }

    #[test]
    fn histogram_of_identical_samples() {
        let text = render_histogram(&[50, 50, 50], 9, 5);
        assert!(text.lines().next().unwrap().ends_with(" 3"));
        assert!(render_histogram(&[], 9, 5).is_empty());
    }

    #[test]
    fn results_dump_is_array() {
        let path = scratch("res.json");
        let results = vec![AudioResult {
            filename: "a.pcm".into(),
            response: RecognitionResponse {
                asr_result: "hi".into(),
                status: ResponseStatus::Result,
                ..Default::default()
            },
        }];
        write_results_json(&path, &results).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["filename"], "a.pcm");
        assert_eq!(value[0]["asr_result"], "hi");
        std::fs::remove_file(path).unwrap();
    }
}
