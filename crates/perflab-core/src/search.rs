//! Maximum sustainable load search.
//!
//! Three sequential phases, never revisited:
//! 1. Approximate: linear scan in `large_step` increments until throughput stops being
//!    stable or stops growing.
//! 2. Precise: binary search within one `large_step` either side of the approximation,
//!    keeping rates that are both stable and efficient.
//! 3. Verification: re-measure the found rate, backing off on failure.
//!
//! Every measurement is minutes of real traffic, so the phases aim to probe as few rates as
//! possible.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SearchConfig;
use crate::driver::LoadProbe;
use crate::measurement::StabilityWindow;
use crate::stability::StabilityEvaluator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Approximate,
    Precise,
    Verification,
}

impl std::fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchPhase::Approximate => write!(f, "approximate"),
            SearchPhase::Precise => write!(f, "precise"),
            SearchPhase::Verification => write!(f, "verification"),
        }
    }
}

/// One probed rate and what the stability check made of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRound {
    pub phase: SearchPhase,
    pub rate: u32,
    /// `None` when the rate was unstable
    pub window: Option<StabilityWindow>,
}

/// Result of re-measuring the found maximum.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified {
        /// Rate handed to verification by the precise phase
        requested_rate: u32,
        /// Rate that produced a stable window, lower than requested after retries
        verified_rate: u32,
        window: StabilityWindow,
        /// Safety margin below the verified throughput
        recommended_load: u32,
        spread_percent: f64,
    },
    Failed {
        requested_rate: u32,
        last_attempted_rate: u32,
    },
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified { .. })
    }
}

/// Everything a maximum-load search found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaximumLoadReport {
    pub test_id: String,
    pub started_at: DateTime<Utc>,
    pub approximate_max: u32,
    pub precise_max: u32,
    pub verification: VerificationOutcome,
    pub rounds: Vec<SearchRound>,
}

impl MaximumLoadReport {
    pub fn passed(&self) -> bool {
        self.verification.is_verified()
    }
}

/// Drives a [`LoadProbe`] through the three search phases.
pub struct MaximumLoadSearch<P> {
    probe: P,
    config: SearchConfig,
    evaluator: StabilityEvaluator,
    rounds: Vec<SearchRound>,
}

impl<P: LoadProbe> MaximumLoadSearch<P> {
    pub fn new(probe: P, config: SearchConfig) -> Self {
        let evaluator = StabilityEvaluator::new(config.stability_threshold);
        Self {
            probe,
            config,
            evaluator,
            rounds: Vec::new(),
        }
    }

    /// Rates probed so far, in order.
    pub fn rounds(&self) -> &[SearchRound] {
        &self.rounds
    }

    pub fn into_probe(self) -> P {
        self.probe
    }

    /// Run all three phases.
    pub async fn run(&mut self) -> MaximumLoadReport {
        let started_at = Utc::now();
        let test_id = started_at.timestamp_millis().to_string();
        info!(test_id = %test_id, "Starting maximum load test");

        let approximate_max = self.find_approximate_maximum().await;
        info!(rate = approximate_max, "Found approximate maximum");

        let precise_max = self.find_precise_maximum(approximate_max).await;
        info!(rate = precise_max, "Found precise maximum");

        let verification = self.verify_maximum(precise_max).await;

        MaximumLoadReport {
            test_id,
            started_at,
            approximate_max,
            precise_max,
            verification,
            rounds: self.rounds.clone(),
        }
    }

    /// Scan upwards from `initial_load` until the rate is unstable or throughput stops growing.
    ///
    /// Returns the last rate known to be good: one step back when instability was hit, the
    /// current rate on diminishing returns or at the configured ceiling.
    pub async fn find_approximate_maximum(&mut self) -> u32 {
        let mut current_rate = self.config.initial_load;
        let mut last_stable_throughput = 0.0;

        loop {
            let Some(window) = self
                .measure_with_stability_check(SearchPhase::Approximate, current_rate)
                .await
            else {
                info!(rate = current_rate, "Throughput unstable, stepping back");
                return current_rate.saturating_sub(self.config.large_step);
            };

            if last_stable_throughput > 0.0
                && window.avg_throughput
                    < last_stable_throughput * self.config.min_throughput_growth_ratio
            {
                info!(
                    rate = current_rate,
                    throughput = window.avg_throughput,
                    previous = last_stable_throughput,
                    "Throughput growth below threshold"
                );
                return current_rate;
            }

            last_stable_throughput = window.avg_throughput;

            let next_rate = current_rate.saturating_add(self.config.large_step);
            if next_rate > self.config.max_load_ceiling {
                warn!(
                    rate = current_rate,
                    ceiling = self.config.max_load_ceiling,
                    "Reached load ceiling while throughput still grows"
                );
                return current_rate;
            }
            current_rate = next_rate;
        }
    }

    /// Binary search in `[approximate - large_step, approximate + large_step]`, never below
    /// `initial_load`. Returns the highest rate known to be stable and efficient.
    pub async fn find_precise_maximum(&mut self, approximate_max: u32) -> u32 {
        let mut left = self
            .config
            .initial_load
            .max(approximate_max.saturating_sub(self.config.large_step));
        let mut right = approximate_max.saturating_add(self.config.large_step);

        while right.saturating_sub(left) > self.config.small_step {
            // left + (right - left) / 2 is the floor of the midpoint without overflow
            let mid = left + (right - left) / 2;
            let window = self
                .measure_with_stability_check(SearchPhase::Precise, mid)
                .await;

            match window {
                Some(window) if self.is_efficient(&window, mid) => {
                    debug!(left = mid, right, "Rate kept");
                    left = mid;
                }
                _ => {
                    debug!(left, right = mid, "Rate rejected");
                    right = mid;
                }
            }
        }

        left
    }

    /// Confirm `rate`, retrying at reduced rates up to `verification_retries` times.
    pub async fn verify_maximum(&mut self, rate: u32) -> VerificationOutcome {
        info!(rate, "Verifying maximum load");

        let mut current_rate = rate;
        let mut retries = self.config.verification_retries;
        let mut window = self
            .measure_with_stability_check(SearchPhase::Verification, current_rate)
            .await;

        while window.is_none() && retries > 0 {
            current_rate = ((f64::from(current_rate) * self.config.verification_backoff_ratio)
                .floor() as u32)
                .max(1);
            warn!(rate = current_rate, "Verification failed, retrying with reduced rate");

            window = self
                .measure_with_stability_check(SearchPhase::Verification, current_rate)
                .await;
            retries -= 1;
        }

        match window {
            Some(window) => {
                let recommended_load =
                    (window.avg_throughput * self.config.recommended_load_ratio).floor() as u32;
                info!(
                    rate = current_rate,
                    throughput = window.avg_throughput,
                    recommended_load,
                    "Maximum load verified"
                );

                VerificationOutcome::Verified {
                    requested_rate: rate,
                    verified_rate: current_rate,
                    window,
                    recommended_load,
                    spread_percent: window.spread() * 100.0,
                }
            }
            None => {
                error!(
                    rate = current_rate,
                    "Failed to verify stable maximum load"
                );
                VerificationOutcome::Failed {
                    requested_rate: rate,
                    last_attempted_rate: current_rate,
                }
            }
        }
    }

    fn is_efficient(&self, window: &StabilityWindow, rate: u32) -> bool {
        window.avg_throughput >= f64::from(rate) * self.config.min_efficiency_ratio
    }

    /// Take `required_stable_measurements` consecutive windows at `rate` and classify them.
    async fn measure_with_stability_check(
        &mut self,
        phase: SearchPhase,
        rate: u32,
    ) -> Option<StabilityWindow> {
        let windows = self.stability_windows();
        let measurements = self
            .probe
            .measure_windows(rate, Duration::ZERO, &windows)
            .await;

        let window = self.evaluator.evaluate(&measurements);
        debug!(
            %phase,
            rate,
            stable = window.is_some(),
            throughput = window.map(|w| w.avg_throughput).unwrap_or_default(),
            "Stability check finished"
        );

        self.rounds.push(SearchRound {
            phase,
            rate,
            window,
        });
        window
    }

    /// The first window is a full step, follow-ups are shorter stability checks.
    fn stability_windows(&self) -> Vec<Duration> {
        let count = self.config.required_stable_measurements.max(1);
        let mut windows = Vec::with_capacity(count);
        windows.push(self.config.step_duration());
        windows.extend(std::iter::repeat(self.config.stability_check_duration()).take(count - 1));
        windows
    }
}
