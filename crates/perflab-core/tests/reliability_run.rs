// Reliability runs through the real load driver, on paused tokio time

use async_trait::async_trait;
use perflab_core::{
    GrpcRequest, GrpcResponse, LoadDriver, MetricsAggregator, ReliabilityConfig,
    ReliabilityEvaluator, RpcClient,
};
use perflab_proto::{HelloRequest, SAY_HELLO_METHOD};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::Code;

/// Answers OK until `healthy_calls` calls have been made, then fails everything.
struct DegradingGreeter {
    calls: AtomicU64,
    healthy_calls: u64,
}

#[async_trait]
impl RpcClient for DegradingGreeter {
    async fn invoke(&self, _request: &GrpcRequest) -> GrpcResponse {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let status = if call < self.healthy_calls {
            Code::Ok
        } else {
            Code::Unavailable
        };
        GrpcResponse {
            status,
            latency: Duration::from_millis(4),
        }
    }
}

fn driver(healthy_calls: u64) -> LoadDriver {
    let client = Arc::new(DegradingGreeter {
        calls: AtomicU64::new(0),
        healthy_calls,
    });
    let request = GrpcRequest {
        method: SAY_HELLO_METHOD.to_string(),
        payload: HelloRequest {
            name: "World".to_string(),
        },
        deadline: Duration::from_secs(1),
    };
    LoadDriver::new(client, request, Arc::new(MetricsAggregator::new().unwrap()), 5)
}

fn config() -> ReliabilityConfig {
    ReliabilityConfig {
        target_load: 50,
        test_duration_secs: 6,
        ramp_up_duration_secs: 2,
        measurement_window_secs: 2,
        max_throughput_variance: 0.2,
        required_stable_windows: 3,
        ..ReliabilityConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_steady_target_passes() {
    let mut driver = driver(u64::MAX);
    let report = ReliabilityEvaluator::new(config()).run(&mut driver).await;

    assert_eq!(report.windows.len(), 3);
    for window in &report.windows {
        assert!(
            (45.0..=55.0).contains(&window.current_throughput),
            "throughput = {}",
            window.current_throughput
        );
        assert_eq!(window.error_rate, 0.0);
    }

    assert_eq!(report.verdict.stable_windows, 3);
    assert_eq!(report.verdict.total_windows, 3);
    assert!(report.passed());
}

#[tokio::test(start_paused = true)]
async fn test_target_failing_mid_run_fails() {
    let mut driver = driver(150);
    let report = ReliabilityEvaluator::new(config()).run(&mut driver).await;

    assert_eq!(report.windows.len(), 3);
    let last = report.windows.last().unwrap();
    assert_eq!(last.error_rate, 1.0);
    // Failed calls still complete, so throughput alone would look healthy
    assert!(last.current_throughput > 40.0);

    assert!(report.verdict.stable_windows < 3);
    assert!(report.verdict.avg_error_rate > 0.01);
    assert!(!report.passed());
}
