//! Step-load saturation search.
//!
//! Measures a low-rate baseline, then raises the rate step by step (doubling until the
//! first sign of saturation, then in smaller increments) until errors, latency or a
//! throughput plateau say the target is saturated. The highest clean step is then
//! validated below, at and above its rate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::StepLoadConfig;
use crate::driver::{LoadPlan, LoadProbe};
use crate::measurement::Measurement;

/// Floor for the baseline p99 so a sub-millisecond baseline does not make every step look slow.
const MIN_BASELINE_P99_MS: f64 = 1.0;

/// Why the step search stopped raising the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ErrorRate,
    Latency,
    Plateau,
    Ceiling,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::ErrorRate => write!(f, "error rate exceeded threshold"),
            StopReason::Latency => write!(f, "p99 latency exceeded baseline limit"),
            StopReason::Plateau => write!(f, "throughput plateaued"),
            StopReason::Ceiling => write!(f, "rate ceiling reached"),
        }
    }
}

/// One measured step, baseline included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub target_rate: u32,
    pub measurement: Measurement,
}

/// A validation run relative to the found maximum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRun {
    /// Share of the maximum rate, in percent
    pub load_percent: u32,
    pub target_rate: u32,
    pub measurement: Measurement,
    pub acceptable: bool,
    /// Overload runs are reported but never fail the test
    pub informational: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepLoadReport {
    pub test_id: String,
    pub started_at: DateTime<Utc>,
    pub max_rate: u32,
    pub baseline_p99_ms: f64,
    pub stop_reason: StopReason,
    pub steps: Vec<StepResult>,
    pub validations: Vec<ValidationRun>,
    pub passed: bool,
}

pub struct StepLoadSearch<P> {
    probe: P,
    config: StepLoadConfig,
}

impl<P: LoadProbe> StepLoadSearch<P> {
    pub fn new(probe: P, config: StepLoadConfig) -> Self {
        Self { probe, config }
    }

    pub fn into_probe(self) -> P {
        self.probe
    }

    pub async fn run(&mut self) -> StepLoadReport {
        let started_at = Utc::now();
        let test_id = started_at.to_rfc3339();
        info!(test_id = %test_id, "Starting step load test");

        let baseline = self
            .measure(self.config.baseline_rate, self.config.baseline_duration_secs)
            .await;
        let baseline_p99_ms = baseline.p99_latency_ms.max(MIN_BASELINE_P99_MS);
        info!(
            rate = self.config.baseline_rate,
            p99_ms = baseline.p99_latency_ms,
            "Baseline measured"
        );

        let mut steps = vec![StepResult {
            target_rate: self.config.baseline_rate,
            measurement: baseline,
        }];

        let (max_rate, stop_reason) = self.find_max_rate(baseline_p99_ms, &mut steps).await;
        info!(max_rate, reason = %stop_reason, "Step search finished");

        let validations = self.validate(max_rate, baseline_p99_ms).await;
        let passed = validations
            .iter()
            .filter(|run| !run.informational)
            .all(|run| run.acceptable);

        StepLoadReport {
            test_id,
            started_at,
            max_rate,
            baseline_p99_ms,
            stop_reason,
            steps,
            validations,
            passed,
        }
    }

    /// Raise the rate until a stop criterion triggers; returns the last clean rate.
    async fn find_max_rate(
        &mut self,
        baseline_p99_ms: f64,
        steps: &mut Vec<StepResult>,
    ) -> (u32, StopReason) {
        let latency_limit = baseline_p99_ms * self.config.latency_multiplier;
        let mut max_rate = self.config.baseline_rate;
        let mut current_rate = self.config.start_rate;
        let mut saturated = false;
        let mut previous_throughput: Option<f64> = None;

        loop {
            if current_rate > self.config.rate_ceiling {
                warn!(
                    rate = current_rate,
                    ceiling = self.config.rate_ceiling,
                    "Stopping at rate ceiling"
                );
                return (max_rate, StopReason::Ceiling);
            }

            let measurement = self
                .measure(current_rate, self.config.step_duration_secs)
                .await;
            let error_rate = measurement.error_rate;
            let p99 = measurement.p99_latency_ms;
            let throughput = measurement.current_throughput;
            steps.push(StepResult {
                target_rate: current_rate,
                measurement,
            });

            if error_rate > self.config.error_threshold {
                info!(
                    rate = current_rate,
                    error_rate_percent = error_rate * 100.0,
                    "Stopping: error rate exceeded threshold"
                );
                return (max_rate, StopReason::ErrorRate);
            }

            if p99 > latency_limit {
                info!(
                    rate = current_rate,
                    p99_ms = p99,
                    limit_ms = latency_limit,
                    "Stopping: p99 latency exceeded limit"
                );
                return (max_rate, StopReason::Latency);
            }

            if let Some(previous) = previous_throughput {
                let improvement = (throughput - previous) / previous;
                if improvement < self.config.plateau_threshold {
                    info!(
                        rate = current_rate,
                        improvement_percent = improvement * 100.0,
                        "Stopping: throughput improvement below threshold"
                    );
                    return (max_rate, StopReason::Plateau);
                }
            }

            previous_throughput = Some(throughput);
            max_rate = current_rate;

            if !saturated
                && (error_rate > self.config.error_threshold / 2.0 || p99 > latency_limit / 2.0)
            {
                info!(rate = current_rate, "First saturation observed");
                saturated = true;
            }

            let increment = if saturated {
                ((f64::from(current_rate) * self.config.saturated_growth) as u32).max(1)
            } else {
                current_rate
            };
            current_rate = current_rate.saturating_add(increment);
        }
    }

    async fn validate(&mut self, max_rate: u32, baseline_p99_ms: f64) -> Vec<ValidationRun> {
        let latency_limit = baseline_p99_ms * self.config.latency_multiplier;
        let runs = [
            (90, self.config.validation_duration_secs, false),
            (100, self.config.full_validation_duration_secs, false),
            (110, self.config.overload_validation_duration_secs, true),
        ];

        let mut validations = Vec::with_capacity(runs.len());
        for (load_percent, duration_secs, informational) in runs {
            let target_rate = ((u64::from(max_rate) * load_percent / 100) as u32).max(1);
            info!(load_percent, rate = target_rate, "Validating");

            let measurement = self.measure(target_rate, duration_secs).await;
            let acceptable = measurement.error_rate < self.config.error_threshold
                && measurement.p99_latency_ms < latency_limit;

            if !acceptable && !informational {
                warn!(
                    load_percent,
                    error_rate = measurement.error_rate,
                    p99_ms = measurement.p99_latency_ms,
                    "Validation run not acceptable"
                );
            }

            validations.push(ValidationRun {
                load_percent: load_percent as u32,
                target_rate,
                measurement,
                acceptable,
                informational,
            });
        }
        validations
    }

    async fn measure(&mut self, rate: u32, hold_secs: u64) -> Measurement {
        let plan = LoadPlan::ramped(
            rate,
            self.config.ramp_up(),
            std::time::Duration::from_secs(hold_secs),
        );
        self.probe.measure(plan).await
    }
}
