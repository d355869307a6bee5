//! Sustained-load reliability evaluation.
//!
//! One long run at a fixed target rate: a ramp-up, then steady state cut into fixed
//! windows. Each window is judged on its own, then the run is judged as a whole. Any failed
//! criterion fails the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ReliabilityConfig;
use crate::driver::LoadProbe;
use crate::measurement::Measurement;

/// Aggregate judgement of a reliability run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityVerdict {
    pub avg_throughput: f64,
    /// (max - min) / avg throughput across windows
    pub throughput_variance: f64,
    pub avg_error_rate: f64,
    pub avg_p99_latency_ms: f64,
    pub stable_windows: usize,
    pub total_windows: usize,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityReport {
    pub test_id: String,
    pub started_at: DateTime<Utc>,
    pub target_load: u32,
    pub windows: Vec<Measurement>,
    pub verdict: ReliabilityVerdict,
}

impl ReliabilityReport {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }
}

pub struct ReliabilityEvaluator {
    config: ReliabilityConfig,
}

impl ReliabilityEvaluator {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self { config }
    }

    /// Window lengths covering the steady-state duration; the last one may be partial.
    pub fn window_schedule(&self) -> Vec<Duration> {
        let window = self.config.measurement_window();
        let mut remaining = self.config.test_duration();
        let mut schedule = Vec::with_capacity(self.config.window_count());

        while !remaining.is_zero() && !window.is_zero() {
            let next = window.min(remaining);
            schedule.push(next);
            remaining -= next;
        }
        schedule
    }

    /// Ramp up, hold the target load, and judge every window.
    pub async fn run<P: LoadProbe>(&self, probe: &mut P) -> ReliabilityReport {
        let started_at = Utc::now();
        let test_id = started_at.timestamp_millis().to_string();
        let schedule = self.window_schedule();

        info!(
            test_id = %test_id,
            target_load = self.config.target_load,
            ramp_up_secs = self.config.ramp_up_duration_secs,
            windows = schedule.len(),
            "Starting reliability test"
        );

        let windows = probe
            .measure_windows(
                self.config.target_load,
                self.config.ramp_up_duration(),
                &schedule,
            )
            .await;

        let verdict = self.evaluate(&windows);
        if verdict.passed {
            info!(stable_windows = verdict.stable_windows, "Reliability test passed");
        } else {
            warn!(
                stable_windows = verdict.stable_windows,
                total_windows = verdict.total_windows,
                "Reliability test failed"
            );
        }

        ReliabilityReport {
            test_id,
            started_at,
            target_load: self.config.target_load,
            windows,
            verdict,
        }
    }

    /// A window is stable when error rate, p99 latency and throughput are all within bounds.
    pub fn is_stable_window(&self, window: &Measurement) -> bool {
        let target = f64::from(self.config.target_load);
        let lower_bound = target * self.config.window_lower_bound_ratio;
        let upper_bound = target * (1.0 + self.config.max_throughput_variance);

        window.error_rate <= self.config.max_error_rate
            && window.p99_latency_ms <= self.config.max_p99_latency_ms
            && window.current_throughput >= lower_bound
            && window.current_throughput <= upper_bound
    }

    pub fn evaluate(&self, windows: &[Measurement]) -> ReliabilityVerdict {
        let total_windows = windows.len();
        let count = total_windows.max(1) as f64;

        let avg_throughput = windows.iter().map(|w| w.current_throughput).sum::<f64>() / count;
        let avg_error_rate = windows.iter().map(|w| w.error_rate).sum::<f64>() / count;
        let avg_p99_latency_ms = windows.iter().map(|w| w.p99_latency_ms).sum::<f64>() / count;

        let min = windows
            .iter()
            .map(|w| w.current_throughput)
            .fold(f64::INFINITY, f64::min);
        let max = windows
            .iter()
            .map(|w| w.current_throughput)
            .fold(f64::NEG_INFINITY, f64::max);

        // No throughput means no basis for a variance; such a run cannot pass
        let throughput_variance = if avg_throughput > 0.0 {
            (max - min) / avg_throughput
        } else {
            f64::INFINITY
        };

        let stable_windows = windows
            .iter()
            .enumerate()
            .filter(|(index, window)| {
                let stable = self.is_stable_window(window);
                debug!(
                    window = index + 1,
                    stable,
                    throughput = window.current_throughput,
                    error_rate = window.error_rate,
                    p99_ms = window.p99_latency_ms,
                    "Reliability window"
                );
                stable
            })
            .count();

        let passed = throughput_variance <= self.config.max_throughput_variance
            && avg_error_rate <= self.config.max_error_rate
            && avg_p99_latency_ms <= self.config.max_p99_latency_ms
            && stable_windows >= self.config.required_stable_windows;

        ReliabilityVerdict {
            avg_throughput,
            throughput_variance,
            avg_error_rate,
            avg_p99_latency_ms,
            stable_windows,
            total_windows,
            passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReliabilityConfig {
        ReliabilityConfig {
            target_load: 1000,
            test_duration_secs: 1800,
            measurement_window_secs: 300,
            required_stable_windows: 6,
            ..ReliabilityConfig::default()
        }
    }

    fn window(throughput: f64, error_rate: f64, p99: f64) -> Measurement {
        Measurement::new(throughput, error_rate, p99)
    }

    #[test]
    fn test_schedule_covers_duration() {
        let evaluator = ReliabilityEvaluator::new(config());
        assert_eq!(evaluator.window_schedule(), vec![Duration::from_secs(300); 6]);

        let evaluator = ReliabilityEvaluator::new(ReliabilityConfig {
            test_duration_secs: 700,
            ..config()
        });
        assert_eq!(
            evaluator.window_schedule(),
            vec![
                Duration::from_secs(300),
                Duration::from_secs(300),
                Duration::from_secs(100)
            ]
        );
    }

    #[test]
    fn test_constant_run_passes() {
        let evaluator = ReliabilityEvaluator::new(config());
        let windows = vec![window(1000.0, 0.0, 20.0); 6];

        let verdict = evaluator.evaluate(&windows);
        assert!(verdict.passed);
        assert_eq!(verdict.stable_windows, 6);
        assert_eq!(verdict.total_windows, 6);
        assert_eq!(verdict.throughput_variance, 0.0);
        assert_eq!(verdict.avg_throughput, 1000.0);
    }

    #[test]
    fn test_one_unstable_window_fails_run() {
        let evaluator = ReliabilityEvaluator::new(config());
        let mut windows = vec![window(1000.0, 0.0, 20.0); 6];
        // Latency spike in one window; averages stay within bounds
        windows[3] = window(1000.0, 0.0, 800.0);

        let verdict = evaluator.evaluate(&windows);
        assert_eq!(verdict.stable_windows, 5);
        assert!(verdict.avg_p99_latency_ms <= 500.0);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_window_throughput_bounds() {
        let evaluator = ReliabilityEvaluator::new(config());
        assert!(evaluator.is_stable_window(&window(900.0, 0.0, 1.0)));
        assert!(evaluator.is_stable_window(&window(1100.0, 0.0, 1.0)));
        assert!(!evaluator.is_stable_window(&window(899.0, 0.0, 1.0)));
        assert!(!evaluator.is_stable_window(&window(1101.0, 0.0, 1.0)));
        assert!(!evaluator.is_stable_window(&window(1000.0, 0.02, 1.0)));
    }

    #[test]
    fn test_high_aggregate_variance_fails_even_with_enough_stable_windows() {
        let evaluator = ReliabilityEvaluator::new(ReliabilityConfig {
            required_stable_windows: 4,
            ..config()
        });
        let windows = vec![
            window(1000.0, 0.0, 10.0),
            window(1000.0, 0.0, 10.0),
            window(1000.0, 0.0, 10.0),
            window(1000.0, 0.0, 10.0),
            window(500.0, 0.0, 10.0),
            window(500.0, 0.0, 10.0),
        ];

        let verdict = evaluator.evaluate(&windows);
        assert_eq!(verdict.stable_windows, 4);
        assert!(verdict.throughput_variance > 0.1);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_no_throughput_fails() {
        let evaluator = ReliabilityEvaluator::new(config());
        let verdict = evaluator.evaluate(&[]);
        assert!(!verdict.passed);
        assert_eq!(verdict.total_windows, 0);
        assert!(verdict.throughput_variance.is_infinite());

        let verdict = evaluator.evaluate(&vec![window(0.0, 0.0, 0.0); 6]);
        assert!(!verdict.passed);
    }
}
