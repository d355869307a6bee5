//! Prometheus metrics of the Greeter service
//!
//! Registered in the default registry on first access.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

/// Total number of processed requests by method
pub static REQUESTS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "grpc_server_requests_processed_total",
        "The total number of processed gRPC requests",
        &["method"]
    )
    .expect("Failed to register processed requests counter")
});

/// Request handling duration by method
pub static REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "grpc_server_request_duration_seconds",
        "Request duration in seconds",
        &["method"],
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register request duration histogram")
});

/// Force registration so the metrics are exported before the first request.
pub fn init() {
    Lazy::force(&REQUESTS_PROCESSED);
    Lazy::force(&REQUEST_DURATION);
}

/// Render the default registry in the Prometheus text format.
pub fn export() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
