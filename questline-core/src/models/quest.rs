use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub state: QuestState,
    pub xp_reward: u32,
    pub due_at: Option<DateTime<Utc>>,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestState {
    #[default]
    Todo,
    Active,
    Done,
    Blocked,
}

impl QuestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Active => "active",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "active" => Some(Self::Active),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateQuestInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub state: Option<QuestState>,
    #[serde(default)]
    pub xp_reward: u32,
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateQuestInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub state: Option<QuestState>,
    pub xp_reward: Option<u32>,
    pub due_at: Option<DateTime<Utc>>,
    pub priority: Option<i64>,
}
