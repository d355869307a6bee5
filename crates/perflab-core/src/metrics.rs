//! Prometheus metrics for the load generator
//!
//! Unlike a server, a load generator may run several independent drivers in one
//! process, so every `LoadMetrics` owns its own registry instead of the default one.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use tonic::Code;

use crate::error::PerfLabResult;

/// Cumulative call metrics of one load generator.
pub struct LoadMetrics {
    registry: Registry,

    /// Calls by gRPC status code name
    calls: IntCounterVec,

    /// Client-observed call latency
    call_duration: Histogram,

    /// Rate the driver is currently pacing towards
    target_rate: IntGauge,
}

impl LoadMetrics {
    /// Create and register all load metrics.
    pub fn new() -> PerfLabResult<Self> {
        let registry = Registry::new();

        let calls = IntCounterVec::new(
            Opts::new("perflab_calls_total", "Total number of RPC calls issued"),
            &["status"],
        )?;

        // Buckets: 1ms .. 10s, matching the server-side histogram
        let call_duration = Histogram::with_opts(
            HistogramOpts::new(
                "perflab_call_duration_seconds",
                "Client-observed RPC latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )?;

        let target_rate = IntGauge::new(
            "perflab_target_rate",
            "Target request rate of the running load step",
        )?;

        registry.register(Box::new(calls.clone()))?;
        registry.register(Box::new(call_duration.clone()))?;
        registry.register(Box::new(target_rate.clone()))?;

        Ok(Self {
            registry,
            calls,
            call_duration,
            target_rate,
        })
    }

    pub fn observe(&self, status: Code, latency: Duration) {
        self.calls
            .with_label_values(&[status_label(status).as_str()])
            .inc();
        self.call_duration.observe(latency.as_secs_f64());
    }

    pub fn set_target_rate(&self, rate: u32) {
        self.target_rate.set(i64::from(rate));
    }

    /// Total calls recorded with the given status.
    pub fn calls_with_status(&self, status: Code) -> u64 {
        self.calls
            .with_label_values(&[status_label(status).as_str()])
            .get()
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Status label as tonic names the code, e.g. `DeadlineExceeded`.
fn status_label(status: Code) -> String {
    format!("{status:?}")
}
