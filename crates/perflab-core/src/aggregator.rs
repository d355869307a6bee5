//! Windowed aggregation of RPC outcomes.
//!
//! All workers of a run record into one `MetricsAggregator` shared by `Arc`. Counters are
//! atomics; the latency distribution is an HDR histogram behind a mutex. Windows are cut by
//! the caller with [`MetricsAggregator::snapshot_and_reset`].

use chrono::Utc;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::Code;

use crate::error::PerfLabResult;
use crate::measurement::{LatencySummary, Measurement};
use crate::metrics::LoadMetrics;

/// Highest trackable latency, one minute in microseconds.
const MAX_TRACKABLE_LATENCY_US: u64 = 60_000_000;

pub struct MetricsAggregator {
    total: AtomicU64,
    errors: AtomicU64,

    /// Latencies in microseconds
    latency: Mutex<Histogram<u64>>,

    exporter: Option<Arc<LoadMetrics>>,
}

impl MetricsAggregator {
    pub fn new() -> PerfLabResult<Self> {
        Ok(Self {
            total: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency: Mutex::new(Histogram::new_with_bounds(1, MAX_TRACKABLE_LATENCY_US, 3)?),
            exporter: None,
        })
    }

    /// Also forward every outcome to cumulative Prometheus metrics.
    pub fn with_exporter(mut self, exporter: Arc<LoadMetrics>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn exporter(&self) -> Option<&Arc<LoadMetrics>> {
        self.exporter.as_ref()
    }

    /// Record one call outcome.
    pub fn record_outcome(&self, succeeded: bool, latency: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }

        // HDR lower bound is 1us; sub-microsecond calls clamp up
        let micros = (latency.as_micros() as u64).max(1);
        self.latency.lock().saturating_record(micros);
    }

    /// Record a call by its gRPC status; only `Ok` counts as success.
    pub fn record_status(&self, status: Code, latency: Duration) {
        self.record_outcome(status == Code::Ok, latency);
        if let Some(exporter) = &self.exporter {
            exporter.observe(status, latency);
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Derive a measurement for a window of the given wall-clock length.
    pub fn snapshot(&self, window: Duration) -> Measurement {
        let total = self.total();
        let errors = self.errors();
        let latency = self.latency.lock();
        let p99 = micros_to_ms(latency.value_at_quantile(0.99));
        let mean = latency.mean() / 1000.0;
        drop(latency);

        build_measurement(total, errors, p99, mean, window)
    }

    /// Like [`snapshot`](Self::snapshot), then start a fresh window.
    pub fn snapshot_and_reset(&self, window: Duration) -> Measurement {
        let mut latency = self.latency.lock();
        let total = self.total.swap(0, Ordering::Relaxed);
        let errors = self.errors.swap(0, Ordering::Relaxed);
        let p99 = micros_to_ms(latency.value_at_quantile(0.99));
        let mean = latency.mean() / 1000.0;
        latency.reset();
        drop(latency);

        build_measurement(total, errors, p99, mean, window)
    }

    pub fn latency_summary(&self) -> LatencySummary {
        let latency = self.latency.lock();
        if latency.is_empty() {
            return LatencySummary::default();
        }

        LatencySummary {
            mean_ms: latency.mean() / 1000.0,
            p90_ms: micros_to_ms(latency.value_at_quantile(0.90)),
            p95_ms: micros_to_ms(latency.value_at_quantile(0.95)),
            p99_ms: micros_to_ms(latency.value_at_quantile(0.99)),
            max_ms: micros_to_ms(latency.max()),
        }
    }

    /// Discard everything recorded in the current window.
    pub fn reset(&self) {
        let mut latency = self.latency.lock();
        self.total.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        latency.reset();
    }
}

fn build_measurement(
    total: u64,
    errors: u64,
    p99_latency_ms: f64,
    mean_latency_ms: f64,
    window: Duration,
) -> Measurement {
    let error_rate = if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    };

    let window_secs = window.as_secs_f64();
    let current_throughput = if window_secs > 0.0 {
        total as f64 / window_secs
    } else {
        0.0
    };

    Measurement {
        error_rate,
        p99_latency_ms,
        mean_latency_ms,
        current_throughput,
        measured_at: Utc::now(),
        window_secs,
        samples: total,
    }
}

fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_has_zero_error_rate() {
        let aggregator = MetricsAggregator::new().unwrap();
        let measurement = aggregator.snapshot(Duration::from_secs(10));

        assert_eq!(measurement.error_rate, 0.0);
        assert_eq!(measurement.current_throughput, 0.0);
        assert_eq!(measurement.p99_latency_ms, 0.0);
        assert_eq!(measurement.samples, 0);
    }

    #[test]
    fn test_snapshot_rates() {
        let aggregator = MetricsAggregator::new().unwrap();
        for i in 0..100 {
            aggregator.record_outcome(i % 10 != 0, Duration::from_millis(5));
        }

        let measurement = aggregator.snapshot(Duration::from_secs(4));
        assert_eq!(measurement.samples, 100);
        assert!((measurement.error_rate - 0.1).abs() < 1e-9);
        assert!((measurement.current_throughput - 25.0).abs() < 1e-9);
        assert!((measurement.p99_latency_ms - 5.0).abs() < 0.01);

        // snapshot alone keeps the window open
        assert_eq!(aggregator.total(), 100);
    }

    #[test]
    fn test_p99_tracks_tail() {
        let aggregator = MetricsAggregator::new().unwrap();
        for _ in 0..980 {
            aggregator.record_outcome(true, Duration::from_millis(1));
        }
        for _ in 0..20 {
            aggregator.record_outcome(true, Duration::from_millis(200));
        }

        let measurement = aggregator.snapshot(Duration::from_secs(1));
        assert!(measurement.p99_latency_ms > 190.0);
        assert!(measurement.p99_latency_ms < 210.0);

        let summary = aggregator.latency_summary();
        assert!(summary.p90_ms < 1.1);
        assert!(summary.mean_ms > 4.0 && summary.mean_ms < 6.0);
    }

    #[test]
    fn test_snapshot_and_reset_starts_new_window() {
        let aggregator = MetricsAggregator::new().unwrap();
        aggregator.record_outcome(false, Duration::from_millis(2));
        aggregator.record_outcome(true, Duration::from_millis(2));

        let first = aggregator.snapshot_and_reset(Duration::from_secs(1));
        assert_eq!(first.samples, 2);
        assert!((first.error_rate - 0.5).abs() < 1e-9);

        let second = aggregator.snapshot_and_reset(Duration::from_secs(1));
        assert_eq!(second.samples, 0);
        assert_eq!(second.error_rate, 0.0);
    }

    #[test]
    fn test_status_other_than_ok_is_error() {
        let exporter = Arc::new(LoadMetrics::new().unwrap());
        let aggregator = MetricsAggregator::new()
            .unwrap()
            .with_exporter(Arc::clone(&exporter));

        aggregator.record_status(Code::Ok, Duration::from_millis(1));
        aggregator.record_status(Code::DeadlineExceeded, Duration::from_millis(1000));
        aggregator.record_status(Code::Unavailable, Duration::from_millis(1));

        assert_eq!(aggregator.total(), 3);
        assert_eq!(aggregator.errors(), 2);
        assert_eq!(exporter.calls_with_status(Code::DeadlineExceeded), 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let aggregator = Arc::new(MetricsAggregator::new().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        aggregator.record_outcome(true, Duration::from_micros(250));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(aggregator.total(), 8000);
        assert_eq!(aggregator.errors(), 0);
    }
}
