//! Tool argument types. rmcp derives each tool's input schema from these.

use std::collections::BTreeMap;

use rmcp::schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListProjectsRequest {
    #[schemars(description = "Only projects with this status: active, paused or archived")]
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetProjectPulseRequest {
    #[schemars(description = "Project id, slug or path")]
    pub project_id: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListTasksRequest {
    #[schemars(description = "Project id, slug or path")]
    #[serde(default)]
    pub project_id: Option<String>,
    #[schemars(description = "Only tasks in this state: todo, doing, review, done or blocked")]
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskRequest {
    #[schemars(description = "Short task title")]
    pub title: String,
    #[schemars(description = "Project id, slug or path; the task goes to its most urgent open quest")]
    #[serde(default)]
    pub project_id: Option<String>,
    #[schemars(description = "Quest to file the task under")]
    #[serde(default)]
    pub quest_id: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[schemars(description = "Estimated effort in points")]
    #[serde(default)]
    pub estimate_points: Option<u32>,
    #[schemars(description = "Free-text reasons the task cannot proceed")]
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[schemars(description = "Initial state: todo, doing, review, done or blocked")]
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateTaskRequest {
    #[schemars(description = "The task ID to update")]
    pub task_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[schemars(description = "New state: todo, doing, review, done or blocked")]
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub estimate_points: Option<u32>,
    #[serde(default)]
    pub actual_points: Option<u32>,
    #[schemars(description = "Replaces the blocker list")]
    #[serde(default)]
    pub blockers: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompleteTaskRequest {
    #[schemars(description = "The task ID to mark as complete")]
    pub task_id: String,
    #[schemars(description = "Effort actually spent; defaults to the prior value or the estimate")]
    #[serde(default)]
    pub actual_points: Option<u32>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct GetNextTaskRequest {
    #[schemars(description = "Limit the recommendation to one project (id, slug or path)")]
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogSessionEventRequest {
    #[schemars(description = "Working directory of the agent session")]
    pub cwd: String,
    #[schemars(description = "Command that started the session")]
    pub command: String,
    #[schemars(description = "codex, claude or unknown")]
    #[serde(default)]
    pub agent: Option<String>,
    #[schemars(description = "Task ids suggested to the agent; defaults to the current recommendation")]
    #[serde(default)]
    pub suggested_task_ids: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListQuestsRequest {
    #[schemars(description = "Project id, slug or path")]
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateQuestRequest {
    #[schemars(description = "Project id, slug or path")]
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[schemars(description = "todo, active, done or blocked")]
    #[serde(default)]
    pub state: Option<String>,
    #[schemars(description = "Higher is more urgent")]
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub xp_reward: Option<u32>,
    #[schemars(description = "RFC 3339 due date")]
    #[serde(default)]
    pub due_at: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RegisterProjectRequest {
    pub name: String,
    #[schemars(description = "Project root; re-registering a known path updates it in place")]
    pub path: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[schemars(description = "active, paused or archived")]
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
