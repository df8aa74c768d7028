//! Property-based tests for warmup planning

use chrono::{TimeZone, Utc};
use courier_common::models::WarmupConfig;
use courier_delivery::warmup::plan;
use proptest::prelude::*;

fn config_strategy() -> impl Strategy<Value = WarmupConfig> {
    (1u64..500, 1.1f64..4.0, 0.5f64..72.0, 1u64..2_000).prop_map(
        |(initial, factor, interval, extra)| WarmupConfig {
            initial_batch_size: initial,
            increment_factor: factor,
            increment_interval_hours: interval,
            max_batch_size: initial + extra,
            start_date: Utc
                .with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        },
    )
}

proptest! {
    /// Every contact lands in exactly one stage
    #[test]
    fn test_batches_sum_to_total(total in 0u64..50_000, config in config_strategy()) {
        let stages = plan(total, &config);
        let sum: u64 = stages.iter().map(|stage| stage.batch_size).sum();
        prop_assert_eq!(sum, total);
        prop_assert_eq!(stages.last().map_or(0, |stage| stage.cumulative_sent), total);
    }

    /// No stage exceeds the maximum and none is empty
    #[test]
    fn test_batches_within_bounds(total in 1u64..50_000, config in config_strategy()) {
        for stage in plan(total, &config) {
            prop_assert!(stage.batch_size >= 1);
            prop_assert!(stage.batch_size <= config.max_batch_size);
        }
    }

    /// Cumulative counts and dates only move forward
    #[test]
    fn test_plan_is_monotonic(total in 1u64..50_000, config in config_strategy()) {
        let stages = plan(total, &config);

        for pair in stages.windows(2) {
            prop_assert!(pair[1].cumulative_sent > pair[0].cumulative_sent);
            prop_assert!(pair[1].scheduled_date > pair[0].scheduled_date);
            prop_assert!(pair[1].day_offset >= pair[0].day_offset);
            prop_assert_eq!(pair[1].stage, pair[0].stage + 1);
        }

        // Only the final stage may shrink
        if stages.len() > 2 {
            for pair in stages[..stages.len() - 1].windows(2) {
                prop_assert!(pair[1].batch_size >= pair[0].batch_size);
            }
        }
    }
}
