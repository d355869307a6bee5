//! Per-window observations and the stability summaries derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One fixed-duration window of load, snapshotted from the metrics aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// errors / total, 0 for an empty window
    pub error_rate: f64,

    pub p99_latency_ms: f64,

    pub mean_latency_ms: f64,

    /// Completed calls per second of wall-clock window time
    pub current_throughput: f64,

    /// When the window was closed
    pub measured_at: DateTime<Utc>,

    pub window_secs: f64,

    /// Calls observed in the window
    pub samples: u64,
}

impl Measurement {
    /// Build a measurement closed now from already-derived rates.
    pub fn new(current_throughput: f64, error_rate: f64, p99_latency_ms: f64) -> Self {
        Self {
            error_rate,
            p99_latency_ms,
            mean_latency_ms: 0.0,
            current_throughput,
            measured_at: Utc::now(),
            window_secs: 0.0,
            samples: 0,
        }
    }
}

/// Throughput statistics of consecutive measurements taken at one fixed target rate.
///
/// Only ever constructed for a stable sequence; an unstable one yields no window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityWindow {
    pub min_throughput: f64,
    pub max_throughput: f64,
    pub avg_throughput: f64,
    pub sample_count: usize,
}

impl StabilityWindow {
    /// Relative spread (max - min) / avg.
    pub fn spread(&self) -> f64 {
        (self.max_throughput - self.min_throughput) / self.avg_throughput
    }
}

/// Mean and tail latencies of a window, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}
