//! Per-project progress metrics derived from the current task set.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{ProjectPulse, Task, TaskState};

/// Shown as the next action when nothing is recommendable.
pub const NO_RECOMMENDATION_MESSAGE: &str =
    "No open tasks yet. Create your first quest and add a task to get moving.";

const VELOCITY_WINDOW_DAYS: i64 = 7;
const STALE_AFTER_DAYS: i64 = 10;

/// The numeric part of a pulse, without the recommendation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseMetrics {
    pub completion_percent: u8,
    pub tasks_todo: u32,
    pub tasks_doing: u32,
    pub tasks_blocked: u32,
    pub tasks_done: u32,
    pub velocity_7d: u32,
    pub stale: bool,
    pub xp_earned: u64,
}

impl PulseMetrics {
    pub fn into_pulse(self, project_id: Uuid, next_action: Option<String>) -> ProjectPulse {
        ProjectPulse {
            project_id,
            completion_percent: self.completion_percent,
            tasks_todo: self.tasks_todo,
            tasks_doing: self.tasks_doing,
            tasks_blocked: self.tasks_blocked,
            tasks_done: self.tasks_done,
            velocity_7d: self.velocity_7d,
            stale: self.stale,
            xp_earned: self.xp_earned,
            next_action: next_action.unwrap_or_else(|| NO_RECOMMENDATION_MESSAGE.to_string()),
        }
    }
}

/// Compute pulse metrics for every task of a project as of `now`.
///
/// Tasks in `review` are counted with `doing`.
pub fn calculate(tasks: &[Task], now: DateTime<Utc>) -> PulseMetrics {
    let mut metrics = PulseMetrics::default();
    let velocity_since = now - Duration::days(VELOCITY_WINDOW_DAYS);

    for task in tasks {
        match task.state {
            TaskState::Todo => metrics.tasks_todo += 1,
            TaskState::Doing | TaskState::Review => metrics.tasks_doing += 1,
            TaskState::Blocked => metrics.tasks_blocked += 1,
            TaskState::Done => {
                metrics.tasks_done += 1;
                metrics.xp_earned += u64::from(task.earned_points());
            }
        }
        if let Some(completed_at) = task.completed_at {
            if completed_at >= velocity_since && completed_at <= now {
                metrics.velocity_7d += 1;
            }
        }
    }

    let total = tasks.len();
    if total > 0 {
        let percent = (100.0 * f64::from(metrics.tasks_done) / total as f64).round();
        metrics.completion_percent = percent.clamp(0.0, 100.0) as u8;
    }

    metrics.stale = match tasks.iter().map(|t| t.updated_at).max() {
        Some(last_touch) => now - last_touch > Duration::days(STALE_AFTER_DAYS),
        None => true,
    };

    metrics
}
