//! Run-wide timing and counters.
//!
//! Spans and counters are aggregated in lock-free atomics and printed once at
//! the end of a run (`--verbose`). Not a profiler: only totals, counts and
//! averages are kept.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Named metrics tracked by the perf collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Metric {
    DatasetLoad,
    TrainStep,
    EvalStep,
    QuantizerSearch,
    CheckpointSave,
    EpochLog,
    TrainImages,
    EvalImages,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::DatasetLoad,
        Metric::TrainStep,
        Metric::EvalStep,
        Metric::QuantizerSearch,
        Metric::CheckpointSave,
        Metric::EpochLog,
        Metric::TrainImages,
        Metric::EvalImages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::DatasetLoad => "dataset.load",
            Metric::TrainStep => "train.step",
            Metric::EvalStep => "eval.step",
            Metric::QuantizerSearch => "quantizer.search",
            Metric::CheckpointSave => "checkpoint.save",
            Metric::EpochLog => "epoch.log",
            Metric::TrainImages => "train.images",
            Metric::EvalImages => "eval.images",
        }
    }

    /// Counters accumulate deltas; everything else is a timed span.
    pub fn is_counter(self) -> bool {
        matches!(self, Metric::TrainImages | Metric::EvalImages)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

const SLOTS: usize = Metric::ALL.len();

struct Collector {
    start: Instant,
    micros: [AtomicU64; SLOTS],
    counts: [AtomicU64; SLOTS],
}

static COLLECTOR: OnceLock<Collector> = OnceLock::new();

fn collector() -> &'static Collector {
    COLLECTOR.get_or_init(|| Collector {
        start: Instant::now(),
        micros: std::array::from_fn(|_| AtomicU64::new(0)),
        counts: std::array::from_fn(|_| AtomicU64::new(0)),
    })
}

/// Timer that adds its elapsed time to a metric when dropped.
pub struct PerfSpan {
    metric: Metric,
    start: Instant,
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        record_duration(self.metric, self.start.elapsed());
    }
}

/// Start timing `metric`.
pub fn span(metric: Metric) -> PerfSpan {
    PerfSpan {
        metric,
        start: Instant::now(),
    }
}

fn record_duration(metric: Metric, elapsed: Duration) {
    let collector = collector();
    let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    collector.micros[metric.slot()].fetch_add(micros, Ordering::Relaxed);
    collector.counts[metric.slot()].fetch_add(1, Ordering::Relaxed);
}

/// Add `delta` to a counter metric.
pub fn add_count(metric: Metric, delta: u64) {
    collector().counts[metric.slot()].fetch_add(delta, Ordering::Relaxed);
}

/// Render every metric recorded so far, slowest spans and largest counters first.
pub fn report() -> String {
    let collector = collector();
    let mut spans = Vec::new();
    let mut counters = Vec::new();
    for metric in Metric::ALL {
        let count = collector.counts[metric.slot()].load(Ordering::Relaxed);
        let micros = collector.micros[metric.slot()].load(Ordering::Relaxed);
        if count == 0 {
            continue;
        }
        if metric.is_counter() {
            counters.push((metric, count));
        } else {
            spans.push((metric, micros, count));
        }
    }
    spans.sort_by(|a, b| b.1.cmp(&a.1));
    counters.sort_by(|a, b| b.1.cmp(&a.1));

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Performance summary (uptime: {:.3}s)",
        collector.start.elapsed().as_secs_f64()
    );
    if spans.is_empty() && counters.is_empty() {
        let _ = writeln!(out, "No performance data recorded.");
        return out;
    }
    if !spans.is_empty() {
        let _ = writeln!(out, "Durations:");
        let _ = writeln!(
            out,
            "  {:<24} {:>10} {:>8} {:>10}",
            "name", "total", "count", "avg"
        );
        for (metric, micros, count) in spans {
            let _ = writeln!(
                out,
                "  {:<24} {:>10.3}s {:>8} {:>10.3}ms",
                metric.name(),
                micros as f64 / 1e6,
                count,
                micros as f64 / count as f64 / 1e3
            );
        }
    }
    if !counters.is_empty() {
        let _ = writeln!(out, "Counters:");
        for (metric, count) in counters {
            let _ = writeln!(out, "  {:<24} {count}", metric.name());
        }
    }
    out
}
