//! Human-readable result blocks and machine-readable summaries.

use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::error::{PerfLabError, PerfLabResult};
use crate::reliability::ReliabilityReport;
use crate::search::{MaximumLoadReport, VerificationOutcome};
use crate::smoke::SmokeReport;
use crate::step_search::StepLoadReport;

const RULE: &str = "====================================";

/// Write `report` as pretty-printed JSON.
pub fn write_summary<T: Serialize>(report: &T, path: &Path) -> PerfLabResult<()> {
    let json = to_summary_json(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn to_summary_json<T: Serialize>(report: &T) -> PerfLabResult<String> {
    serde_json::to_string_pretty(report).map_err(|e| PerfLabError::Serialization(e.to_string()))
}

fn status(passed: bool) -> &'static str {
    if passed {
        "PASSED"
    } else {
        "FAILED"
    }
}

impl fmt::Display for MaximumLoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "MAXIMUM LOAD TEST RESULTS")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Approximate maximum: {} RPS", self.approximate_max)?;
        writeln!(f, "Precise maximum: {} RPS", self.precise_max)?;
        writeln!(f, "Measurement rounds: {}", self.rounds.len())?;

        match &self.verification {
            VerificationOutcome::Verified {
                requested_rate,
                verified_rate,
                window,
                recommended_load,
                spread_percent,
            } => {
                writeln!(
                    f,
                    "Verified maximum throughput: {:.2} RPS",
                    window.avg_throughput
                )?;
                if verified_rate == requested_rate {
                    writeln!(f, "At target rate: {verified_rate} RPS")?;
                } else {
                    writeln!(
                        f,
                        "At target rate: {verified_rate} RPS (reduced from {requested_rate} RPS)"
                    )?;
                }
                writeln!(f, "Throughput stability: {spread_percent:.2}%")?;
                writeln!(f)?;
                writeln!(f, "Recommended sustainable load: {recommended_load} RPS")?;
            }
            VerificationOutcome::Failed {
                last_attempted_rate,
                ..
            } => {
                writeln!(
                    f,
                    "Failed to verify stable maximum load. \
                     Last attempted rate: {last_attempted_rate} RPS"
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Test Status: {}", status(self.passed()))?;
        write!(f, "{RULE}")
    }
}

impl fmt::Display for ReliabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = &self.verdict;

        writeln!(f, "{RULE}")?;
        writeln!(f, "RELIABILITY TEST RESULTS")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Target Load: {} RPS", self.target_load)?;
        writeln!(f, "Average Throughput: {:.2} RPS", verdict.avg_throughput)?;
        writeln!(
            f,
            "Throughput Variance: {:.2}%",
            verdict.throughput_variance * 100.0
        )?;
        writeln!(f, "Average Error Rate: {:.2}%", verdict.avg_error_rate * 100.0)?;
        writeln!(f, "Average P99 Latency: {:.2}ms", verdict.avg_p99_latency_ms)?;
        writeln!(
            f,
            "Stable Measurement Windows: {}/{}",
            verdict.stable_windows, verdict.total_windows
        )?;
        writeln!(f)?;
        writeln!(f, "Test Status: {}", status(verdict.passed))?;
        write!(f, "{RULE}")
    }
}

impl fmt::Display for StepLoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Load Test Results Summary")?;
        writeln!(f, "========================")?;
        writeln!(f, "Maximum sustainable load: {} RPS", self.max_rate)?;
        writeln!(f, "Baseline P99 latency: {:.2} ms", self.baseline_p99_ms)?;
        writeln!(f, "Stopped because: {}", self.stop_reason)?;
        writeln!(f)?;
        writeln!(f, "Detailed Results:")?;
        writeln!(f, "----------------")?;

        for step in &self.steps {
            let m = &step.measurement;
            writeln!(f, "Target Rate: {} RPS", step.target_rate)?;
            writeln!(f, "- Throughput: {:.2} RPS", m.current_throughput)?;
            writeln!(f, "- Error Rate: {:.2}%", m.error_rate * 100.0)?;
            writeln!(f, "- P99 Latency: {:.2} ms", m.p99_latency_ms)?;
            writeln!(f, "- Mean Latency: {:.2} ms", m.mean_latency_ms)?;
        }

        writeln!(f)?;
        writeln!(f, "Validation:")?;
        writeln!(f, "----------------")?;
        for run in &self.validations {
            let verdict = match (run.acceptable, run.informational) {
                (true, _) => "ok",
                (false, true) => "degraded (informational)",
                (false, false) => "not acceptable",
            };
            writeln!(
                f,
                "{}% ({} RPS): {:.2}% errors, p99 {:.2} ms, {}",
                run.load_percent,
                run.target_rate,
                run.measurement.error_rate * 100.0,
                run.measurement.p99_latency_ms,
                verdict
            )?;
        }

        writeln!(f)?;
        write!(f, "Test Status: {}", status(self.passed))
    }
}

impl fmt::Display for SmokeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Smoke test {}", self.test_id)?;
        writeln!(f, "Virtual users: {}", self.users)?;
        writeln!(f, "Total samples: {}", self.total_requests)?;
        writeln!(f, "Error rate: {:.2}%", self.error_rate * 100.0)?;
        writeln!(f, "Throughput: {:.2} RPS", self.throughput)?;
        writeln!(f, "Average response time: {:.2} ms", self.latency.mean_ms)?;
        writeln!(
            f,
            "Percentiles: p90 {:.2} ms, p95 {:.2} ms, p99 {:.2} ms",
            self.latency.p90_ms, self.latency.p95_ms, self.latency.p99_ms
        )?;
        write!(f, "Test Status: {}", status(self.passed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{Measurement, StabilityWindow};
    use crate::reliability::ReliabilityVerdict;
    use crate::search::{SearchPhase, SearchRound};
    use chrono::Utc;

    fn reliability_report(passed: bool) -> ReliabilityReport {
        ReliabilityReport {
            test_id: "1700000000000".to_string(),
            started_at: Utc::now(),
            target_load: 1000,
            windows: vec![Measurement::new(1000.0, 0.0, 12.5)],
            verdict: ReliabilityVerdict {
                avg_throughput: 1000.0,
                throughput_variance: 0.0123,
                avg_error_rate: 0.0005,
                avg_p99_latency_ms: 12.5,
                stable_windows: if passed { 6 } else { 5 },
                total_windows: 6,
                passed,
            },
        }
    }

    #[test]
    fn test_reliability_block() {
        let text = reliability_report(true).to_string();
        assert!(text.contains("RELIABILITY TEST RESULTS"));
        assert!(text.contains("Average Throughput: 1000.00 RPS"));
        assert!(text.contains("Throughput Variance: 1.23%"));
        assert!(text.contains("Average Error Rate: 0.05%"));
        assert!(text.contains("Average P99 Latency: 12.50ms"));
        assert!(text.contains("Stable Measurement Windows: 6/6"));
        assert!(text.contains("Test Status: PASSED"));

        let text = reliability_report(false).to_string();
        assert!(text.contains("Stable Measurement Windows: 5/6"));
        assert!(text.contains("Test Status: FAILED"));
    }

    #[test]
    fn test_maximum_load_block() {
        let window = StabilityWindow {
            min_throughput: 3400.0,
            max_throughput: 3500.0,
            avg_throughput: 3450.0,
            sample_count: 2,
        };
        let report = MaximumLoadReport {
            test_id: "1".to_string(),
            started_at: Utc::now(),
            approximate_max: 3000,
            precise_max: 3500,
            verification: VerificationOutcome::Verified {
                requested_rate: 3500,
                verified_rate: 3500,
                window,
                recommended_load: 2760,
                spread_percent: window.spread() * 100.0,
            },
            rounds: vec![SearchRound {
                phase: SearchPhase::Verification,
                rate: 3500,
                window: Some(window),
            }],
        };

        let text = report.to_string();
        assert!(text.contains("MAXIMUM LOAD TEST RESULTS"));
        assert!(text.contains("Verified maximum throughput: 3450.00 RPS"));
        assert!(text.contains("At target rate: 3500 RPS"));
        assert!(text.contains("Throughput stability: 2.90%"));
        assert!(text.contains("Recommended sustainable load: 2760 RPS"));
        assert!(text.contains("Test Status: PASSED"));
    }

    #[test]
    fn test_summary_json() {
        let json = to_summary_json(&reliability_report(true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["target_load"], 1000);
        assert_eq!(value["verdict"]["passed"], true);
        assert_eq!(value["verdict"]["stable_windows"], 6);
        assert_eq!(value["windows"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_write_summary() {
        let path = std::env::temp_dir().join(format!(
            "perflab-summary-{}.json",
            std::process::id()
        ));
        write_summary(&reliability_report(false), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"passed\": false"));
        std::fs::remove_file(&path).unwrap();
    }
}
