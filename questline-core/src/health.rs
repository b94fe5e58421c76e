//! Folds pulse metrics into a single 0-100 health score.

use crate::pulse::PulseMetrics;

pub const MAX_HEALTH: u8 = 100;

/// Health for a project with the given pulse.
pub fn score(metrics: &PulseMetrics) -> u8 {
    let completion = f64::from(metrics.completion_percent) * 0.5;
    let velocity = f64::from(metrics.velocity_7d.saturating_mul(3).min(25));
    let blockage = if metrics.tasks_blocked > 0 { -12.0 } else { 8.0 };
    let freshness = if metrics.stale { -16.0 } else { 8.0 };

    let raw = completion + velocity + blockage + freshness;
    raw.round().clamp(0.0, f64::from(MAX_HEALTH)) as u8
}
