use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point-in-time progress snapshot for one project. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPulse {
    pub project_id: Uuid,
    pub completion_percent: u8,
    pub tasks_todo: u32,
    pub tasks_doing: u32,
    pub tasks_blocked: u32,
    pub tasks_done: u32,
    pub velocity_7d: u32,
    pub stale: bool,
    pub xp_earned: u64,
    pub next_action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextTaskRecommendation {
    pub task_id: Uuid,
    pub project_id: Uuid,
    pub reason: String,
    pub score: u8,
}
