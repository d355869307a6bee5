// Property-based tests for the stability evaluator
//
// Properties tested:
// 1. Identical throughputs are always stable with zero spread and avg = that value
// 2. Any sequence whose relative spread exceeds the threshold is unstable
// 3. A returned window always satisfies min <= avg <= max and spread <= threshold

use perflab_core::{Measurement, StabilityEvaluator};
use proptest::prelude::*;

fn measurements(throughputs: &[f64]) -> Vec<Measurement> {
    throughputs
        .iter()
        .map(|&throughput| Measurement::new(throughput, 0.0, 5.0))
        .collect()
}

proptest! {
    #[test]
    fn prop_identical_throughput_is_stable(
        throughput in 0.001f64..1_000_000.0,
        count in 1usize..20,
        threshold in 0.0f64..1.0,
    ) {
        let window = StabilityEvaluator::new(threshold)
            .evaluate(&measurements(&vec![throughput; count]));

        prop_assert!(window.is_some());
        let window = window.unwrap();
        prop_assert_eq!(window.spread(), 0.0);
        prop_assert!((window.avg_throughput - throughput).abs() <= throughput * 1e-12);
        prop_assert_eq!(window.sample_count, count);
    }

    #[test]
    fn prop_wide_spread_is_unstable(
        throughputs in prop::collection::vec(1.0f64..100_000.0, 2..10),
        threshold in 0.0f64..0.5,
    ) {
        let min = throughputs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = throughputs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let avg = throughputs.iter().sum::<f64>() / throughputs.len() as f64;
        // Stay clear of the boundary where rounding decides
        prop_assume!((max - min) / avg > threshold * 1.000_001 + 1e-9);

        let window = StabilityEvaluator::new(threshold).evaluate(&measurements(&throughputs));
        prop_assert!(window.is_none());
    }

    #[test]
    fn prop_window_is_consistent(
        throughputs in prop::collection::vec(1.0f64..100_000.0, 1..10),
        threshold in 0.0f64..2.0,
    ) {
        let evaluator = StabilityEvaluator::new(threshold);
        if let Some(window) = evaluator.evaluate(&measurements(&throughputs)) {
            prop_assert!(window.min_throughput <= window.avg_throughput + 1e-9);
            prop_assert!(window.avg_throughput <= window.max_throughput + 1e-9);
            prop_assert!(window.spread() <= threshold);
            prop_assert_eq!(window.sample_count, throughputs.len());
        }
    }
}
