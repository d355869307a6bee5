//! Fixed-concurrency smoke test.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::SmokeConfig;
use crate::driver::LoadDriver;
use crate::measurement::LatencySummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmokeReport {
    pub test_id: String,
    pub started_at: DateTime<Utc>,
    pub users: usize,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub throughput: f64,
    pub latency: LatencySummary,
    pub passed: bool,
}

/// Closed-loop load from a fixed number of virtual users, judged on error rate and p99.
pub struct SmokeTest {
    config: SmokeConfig,
}

impl SmokeTest {
    pub fn new(config: SmokeConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, driver: &LoadDriver) -> SmokeReport {
        let started_at = Utc::now();
        let test_id = started_at.to_rfc3339();
        let aggregator = driver.aggregator();
        aggregator.reset();

        driver
            .run_closed_loop(self.config.users, self.config.ramp_up(), self.config.duration())
            .await;

        let measurement = aggregator.snapshot(self.config.ramp_up() + self.config.duration());
        let latency = aggregator.latency_summary();
        let passed = latency.p99_ms < self.config.max_p99_latency_ms
            && measurement.error_rate < self.config.max_error_rate;

        info!(
            test_id = %test_id,
            requests = measurement.samples,
            error_rate = measurement.error_rate,
            p99_ms = latency.p99_ms,
            passed,
            "Smoke test finished"
        );

        SmokeReport {
            test_id,
            started_at,
            users: self.config.users,
            total_requests: measurement.samples,
            total_errors: aggregator.errors(),
            error_rate: measurement.error_rate,
            throughput: measurement.current_throughput,
            latency,
            passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::MetricsAggregator;
    use crate::client::{GrpcRequest, GrpcResponse, RpcClient};
    use async_trait::async_trait;
    use perflab_proto::HelloRequest;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tonic::Code;

    struct Flaky {
        calls: AtomicU64,
        fail_every: u64,
    }

    #[async_trait]
    impl RpcClient for Flaky {
        async fn invoke(&self, _request: &GrpcRequest) -> GrpcResponse {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            let status = if call % self.fail_every == 0 {
                Code::Internal
            } else {
                Code::Ok
            };
            GrpcResponse {
                status,
                latency: Duration::from_millis(20),
            }
        }
    }

    fn driver(fail_every: u64) -> LoadDriver {
        let client = Arc::new(Flaky {
            calls: AtomicU64::new(0),
            fail_every,
        });
        let request = GrpcRequest {
            method: perflab_proto::SAY_HELLO_METHOD.to_string(),
            payload: HelloRequest::default(),
            deadline: Duration::from_secs(1),
        };
        LoadDriver::new(
            client,
            request,
            Arc::new(MetricsAggregator::new().unwrap()),
            1,
        )
    }

    fn config() -> SmokeConfig {
        SmokeConfig {
            users: 2,
            ramp_up_secs: 0,
            duration_secs: 2,
            ..SmokeConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_smoke_passes_on_healthy_target() {
        let report = SmokeTest::new(config()).run(&driver(u64::MAX)).await;

        assert_eq!(report.total_requests, 200);
        assert_eq!(report.total_errors, 0);
        assert!((report.throughput - 100.0).abs() < 1e-9);
        assert!((report.latency.p99_ms - 20.0).abs() < 0.1);
        assert!(report.passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_smoke_fails_on_errors() {
        let report = SmokeTest::new(config()).run(&driver(10)).await;

        assert_eq!(report.total_errors, 20);
        assert!((report.error_rate - 0.1).abs() < 1e-9);
        assert!(!report.passed);
    }
}
