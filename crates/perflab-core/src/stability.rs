//! Stability classification of repeated measurements at one target rate.

use crate::measurement::{Measurement, StabilityWindow};

/// Decides whether a sequence of measurements shows stable throughput.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityEvaluator {
    /// Maximum relative spread (max - min) / avg
    threshold: f64,
}

impl StabilityEvaluator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Summarize `measurements`, or `None` when they are not stable.
    ///
    /// An empty sequence is unstable, and so is one whose average throughput is zero:
    /// nothing completed, so there is no throughput to call stable.
    pub fn evaluate(&self, measurements: &[Measurement]) -> Option<StabilityWindow> {
        if measurements.is_empty() {
            return None;
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for measurement in measurements {
            let throughput = measurement.current_throughput;
            min = min.min(throughput);
            max = max.max(throughput);
            sum += throughput;
        }

        let avg = sum / measurements.len() as f64;
        if avg <= 0.0 || avg.is_nan() {
            return None;
        }

        if (max - min) / avg > self.threshold {
            return None;
        }

        Some(StabilityWindow {
            min_throughput: min,
            max_throughput: max,
            avg_throughput: avg,
            sample_count: measurements.len(),
        })
    }
}
