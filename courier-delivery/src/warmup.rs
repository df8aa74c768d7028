//! Domain warmup batch planning
//!
//! A warmup send ramps volume up geometrically: stage `n` targets
//! `floor(initial × factor^n)` messages, capped at the maximum batch size and
//! at what is left to send. Once the target reaches the maximum every further
//! stage is a full batch except the last, which carries the remainder.
//!
//! Planning is pure. Pacing stages against their scheduled dates is the
//! dispatcher's job.

use chrono::{DateTime, Duration, Utc};
use courier_common::{
    ValidationError,
    models::{WarmupConfig, WarmupStage},
};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Check warmup parameters before a send is accepted.
#[must_use]
pub fn validate(config: &WarmupConfig, now: DateTime<Utc>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.initial_batch_size == 0 {
        errors.push(ValidationError::invalid(
            "warmup.initial_batch_size",
            "must be greater than 0",
        ));
    }

    if !config.increment_factor.is_finite() || config.increment_factor <= 1.0 {
        errors.push(ValidationError::invalid(
            "warmup.increment_factor",
            "must be greater than 1",
        ));
    }

    if !config.increment_interval_hours.is_finite() || config.increment_interval_hours <= 0.0 {
        errors.push(ValidationError::invalid(
            "warmup.increment_interval_hours",
            "must be greater than 0",
        ));
    }

    if config.max_batch_size <= config.initial_batch_size {
        errors.push(ValidationError::invalid(
            "warmup.max_batch_size",
            "must be greater than the initial batch size",
        ));
    }

    if config.start_date <= now {
        errors.push(ValidationError::invalid(
            "warmup.start_date",
            "must be in the future",
        ));
    }

    errors
}

/// Target size of stage `n` before capping by what is left to send.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "batch sizes are far below the range where f64 loses integers"
)]
fn stage_target(config: &WarmupConfig, stage: u32) -> u64 {
    let target = (config.initial_batch_size as f64
        * config.increment_factor.powf(f64::from(stage)))
    .floor();

    if !target.is_finite() || target >= config.max_batch_size as f64 {
        config.max_batch_size
    } else {
        target.max(0.0) as u64
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "offsets are bounded by the plan length times the interval"
)]
fn stage_at(config: &WarmupConfig, stage: u32, batch_size: u64, cumulative: u64) -> WarmupStage {
    let hours = f64::from(stage) * config.increment_interval_hours;
    let offset = Duration::milliseconds((hours * MILLIS_PER_HOUR).round() as i64);

    WarmupStage {
        stage,
        batch_size,
        cumulative_sent: cumulative,
        day_offset: (hours / 24.0).floor().max(0.0) as u32,
        scheduled_date: config.start_date + offset,
    }
}

/// Split `total_contacts` sends into warmup stages.
///
/// The batch sizes always add up to `total_contacts`. A degenerate
/// configuration (zero initial or maximum size) yields an empty plan;
/// [`validate`] rejects those before a send is accepted.
#[must_use]
pub fn plan(total_contacts: u64, config: &WarmupConfig) -> Vec<WarmupStage> {
    let mut stages = Vec::new();
    if total_contacts == 0 || config.initial_batch_size == 0 || config.max_batch_size == 0 {
        return stages;
    }

    let mut cumulative = 0u64;
    let mut stage = 0u32;

    while cumulative < total_contacts {
        let remaining = total_contacts - cumulative;
        let target = stage_target(config, stage);

        if target >= config.max_batch_size {
            let full = remaining / config.max_batch_size;
            let remainder = remaining % config.max_batch_size;

            for _ in 0..full {
                cumulative += config.max_batch_size;
                stages.push(stage_at(config, stage, config.max_batch_size, cumulative));
                stage += 1;
            }

            if remainder > 0 {
                cumulative += remainder;
                stages.push(stage_at(config, stage, remainder, cumulative));
            }

            break;
        }

        let batch = target.clamp(1, remaining);
        cumulative += batch;
        stages.push(stage_at(config, stage, batch, cumulative));
        stage += 1;
    }

    stages
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config(initial: u64, factor: f64, interval: f64, max: u64) -> WarmupConfig {
        WarmupConfig {
            initial_batch_size: initial,
            increment_factor: factor,
            increment_interval_hours: interval,
            max_batch_size: max,
            start_date: DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
                .map(|date| date.with_timezone(&Utc))
                .unwrap_or_default(),
        }
    }

    fn sizes(stages: &[WarmupStage]) -> Vec<u64> {
        stages.iter().map(|stage| stage.batch_size).collect()
    }

    #[test]
    fn test_small_audience_fits_in_two_stages() {
        let stages = plan(130, &config(50, 2.0, 24.0, 200));
        assert_eq!(sizes(&stages), vec![50, 80]);
        assert_eq!(stages[1].cumulative_sent, 130);
    }

    #[test]
    fn test_empty_audience_gives_empty_plan() {
        assert!(plan(0, &config(50, 2.0, 24.0, 200)).is_empty());
    }

    #[test]
    fn test_closed_form_after_reaching_max() {
        let stages = plan(1000, &config(100, 2.0, 24.0, 300));
        assert_eq!(sizes(&stages), vec![100, 200, 300, 300, 100]);
        assert_eq!(
            stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(stages.last().map(|s| s.cumulative_sent), Some(1000));
    }

    #[test]
    fn test_exact_multiple_has_no_remainder_stage() {
        let stages = plan(700, &config(100, 2.0, 24.0, 200));
        assert_eq!(sizes(&stages), vec![100, 200, 200, 200]);
    }

    #[test]
    fn test_stage_dates_follow_interval() {
        let config = config(10, 1.5, 12.0, 100);
        let stages = plan(100, &config);

        assert_eq!(stages[0].scheduled_date, config.start_date);
        assert_eq!(stages[0].day_offset, 0);
        assert_eq!(stages[1].scheduled_date, config.start_date + Duration::hours(12));
        assert_eq!(stages[1].day_offset, 0);
        assert_eq!(stages[2].scheduled_date, config.start_date + Duration::hours(24));
        assert_eq!(stages[2].day_offset, 1);
    }

    #[test]
    fn test_batch_size_recomputed_from_initial() {
        // 10, 15, 22 (floor 22.5), 33 (floor 33.75)
        let stages = plan(80, &config(10, 1.5, 24.0, 1000));
        assert_eq!(sizes(&stages), vec![10, 15, 22, 33]);
    }

    #[test]
    fn test_validation() {
        let now = Utc::now();
        let mut bad = config(0, 1.0, 0.0, 0);
        bad.start_date = now - Duration::hours(1);

        let fields: Vec<String> = validate(&bad, now)
            .iter()
            .map(|e| e.field().to_string())
            .collect();
        assert_eq!(
            fields,
            vec![
                "warmup.initial_batch_size",
                "warmup.increment_factor",
                "warmup.increment_interval_hours",
                "warmup.max_batch_size",
                "warmup.start_date",
            ]
        );

        let mut good = config(50, 2.0, 24.0, 200);
        good.start_date = now + Duration::hours(1);
        assert!(validate(&good, now).is_empty());
    }
}
