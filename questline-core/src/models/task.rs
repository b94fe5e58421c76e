use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub quest_id: Uuid,
    pub title: String,
    pub details: String,
    pub state: TaskState,
    pub estimate_points: u32,
    pub actual_points: Option<u32>,
    pub blockers: Vec<String>,
    pub notes: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Points credited once the task is done.
    pub fn earned_points(&self) -> u32 {
        self.actual_points.unwrap_or(self.estimate_points)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Todo,
    Doing,
    Review,
    Done,
    Blocked,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Review => "review",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "doing" => Some(Self::Doing),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Whether the task is still open work the scorer may recommend.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Todo | Self::Doing | Self::Review)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub title: String,
    #[serde(default)]
    pub details: String,
    pub state: Option<TaskState>,
    #[serde(default)]
    pub estimate_points: u32,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub details: Option<String>,
    pub state: Option<TaskState>,
    pub estimate_points: Option<u32>,
    pub actual_points: Option<u32>,
    pub blockers: Option<Vec<String>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub quest_id: Option<Uuid>,
    pub state: Option<TaskState>,
}
