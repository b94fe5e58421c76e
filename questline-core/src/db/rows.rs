//! Raw row shapes and their typed decoding into domain entities.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use uuid::Uuid;

use super::codec;
use crate::error::DecodeError;
use crate::models::*;
use crate::scorer::Candidate;

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, DecodeError> {
    Uuid::parse_str(value).map_err(|_| DecodeError::InvalidUuid {
        field,
        value: value.to_string(),
    })
}

fn parse_ts(field: &'static str, value: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| DecodeError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

fn parse_opt_ts(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, DecodeError> {
    value.map(|v| parse_ts(field, v)).transpose()
}

fn parse_enum<T>(
    field: &'static str,
    value: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, DecodeError> {
    parse(value).ok_or_else(|| DecodeError::InvalidEnum {
        field,
        value: value.to_string(),
    })
}

fn to_u32(field: &'static str, value: i64) -> Result<u32, DecodeError> {
    u32::try_from(value).map_err(|_| DecodeError::OutOfRange { field, value })
}

pub(crate) struct ProjectRow {
    id: String,
    slug: String,
    name: String,
    path: String,
    status: String,
    tags: Option<String>,
    health_score: i64,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    pub const COLUMNS: &'static str =
        "p.id, p.slug, p.name, p.path, p.status, p.tags, p.health_score, p.created_at, p.updated_at";

    pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            path: row.get(3)?,
            status: row.get(4)?,
            tags: row.get(5)?,
            health_score: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl TryFrom<ProjectRow> for Project {
    type Error = DecodeError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let health_score = u8::try_from(row.health_score)
            .ok()
            .filter(|h| *h <= 100)
            .ok_or(DecodeError::OutOfRange {
                field: "projects.health_score",
                value: row.health_score,
            })?;
        Ok(Project {
            id: parse_uuid("projects.id", &row.id)?,
            slug: row.slug,
            name: row.name,
            path: row.path,
            status: parse_enum("projects.status", &row.status, ProjectStatus::from_str)?,
            tags: codec::decode_list(row.tags.as_deref()),
            health_score,
            created_at: parse_ts("projects.created_at", &row.created_at)?,
            updated_at: parse_ts("projects.updated_at", &row.updated_at)?,
        })
    }
}

pub(crate) struct QuestRow {
    id: String,
    project_id: String,
    title: String,
    description: String,
    state: String,
    xp_reward: i64,
    due_at: Option<String>,
    priority: i64,
    created_at: String,
    updated_at: String,
}

impl QuestRow {
    pub const COLUMNS: &'static str = "q.id, q.project_id, q.title, q.description, q.state, \
         q.xp_reward, q.due_at, q.priority, q.created_at, q.updated_at";

    pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            state: row.get(4)?,
            xp_reward: row.get(5)?,
            due_at: row.get(6)?,
            priority: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl TryFrom<QuestRow> for Quest {
    type Error = DecodeError;

    fn try_from(row: QuestRow) -> Result<Self, Self::Error> {
        Ok(Quest {
            id: parse_uuid("quests.id", &row.id)?,
            project_id: parse_uuid("quests.project_id", &row.project_id)?,
            title: row.title,
            description: row.description,
            state: parse_enum("quests.state", &row.state, QuestState::from_str)?,
            xp_reward: to_u32("quests.xp_reward", row.xp_reward)?,
            due_at: parse_opt_ts("quests.due_at", row.due_at.as_deref())?,
            priority: row.priority,
            created_at: parse_ts("quests.created_at", &row.created_at)?,
            updated_at: parse_ts("quests.updated_at", &row.updated_at)?,
        })
    }
}

pub(crate) struct TaskRow {
    id: String,
    quest_id: String,
    title: String,
    details: String,
    state: String,
    estimate_points: i64,
    actual_points: Option<i64>,
    blockers: Option<String>,
    notes: String,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    pub const COLUMNS: &'static str = "t.id, t.quest_id, t.title, t.details, t.state, \
         t.estimate_points, t.actual_points, t.blockers, t.notes, t.completed_at, \
         t.created_at, t.updated_at";

    pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            quest_id: row.get(1)?,
            title: row.get(2)?,
            details: row.get(3)?,
            state: row.get(4)?,
            estimate_points: row.get(5)?,
            actual_points: row.get(6)?,
            blockers: row.get(7)?,
            notes: row.get(8)?,
            completed_at: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = DecodeError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: parse_uuid("tasks.id", &row.id)?,
            quest_id: parse_uuid("tasks.quest_id", &row.quest_id)?,
            title: row.title,
            details: row.details,
            state: parse_enum("tasks.state", &row.state, TaskState::from_str)?,
            estimate_points: to_u32("tasks.estimate_points", row.estimate_points)?,
            actual_points: row
                .actual_points
                .map(|p| to_u32("tasks.actual_points", p))
                .transpose()?,
            blockers: codec::decode_list(row.blockers.as_deref()),
            notes: row.notes,
            completed_at: parse_opt_ts("tasks.completed_at", row.completed_at.as_deref())?,
            created_at: parse_ts("tasks.created_at", &row.created_at)?,
            updated_at: parse_ts("tasks.updated_at", &row.updated_at)?,
        })
    }
}

pub(crate) struct SessionEventRow {
    id: String,
    agent: String,
    cwd: String,
    command: String,
    started_at: String,
    ended_at: Option<String>,
    suggested_task_ids: Option<String>,
    metadata: Option<String>,
}

impl SessionEventRow {
    pub const COLUMNS: &'static str = "e.id, e.agent, e.cwd, e.command, e.started_at, \
         e.ended_at, e.suggested_task_ids, e.metadata";

    pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            agent: row.get(1)?,
            cwd: row.get(2)?,
            command: row.get(3)?,
            started_at: row.get(4)?,
            ended_at: row.get(5)?,
            suggested_task_ids: row.get(6)?,
            metadata: row.get(7)?,
        })
    }
}

impl TryFrom<SessionEventRow> for SessionEvent {
    type Error = DecodeError;

    fn try_from(row: SessionEventRow) -> Result<Self, Self::Error> {
        Ok(SessionEvent {
            id: parse_uuid("session_events.id", &row.id)?,
            agent: parse_enum("session_events.agent", &row.agent, AgentKind::from_str)?,
            cwd: row.cwd,
            command: row.command,
            started_at: parse_ts("session_events.started_at", &row.started_at)?,
            ended_at: parse_opt_ts("session_events.ended_at", row.ended_at.as_deref())?,
            suggested_task_ids: codec::decode_list(row.suggested_task_ids.as_deref()),
            metadata: codec::decode_map(row.metadata.as_deref()),
        })
    }
}

pub(crate) struct CandidateRow {
    task_id: String,
    task_title: String,
    task_state: String,
    blockers: Option<String>,
    quest_title: String,
    quest_state: String,
    quest_priority: i64,
    project_id: String,
    project_name: String,
}

impl CandidateRow {
    pub const COLUMNS: &'static str = "t.id, t.title, t.state, t.blockers, \
         q.title, q.state, q.priority, p.id, p.name";

    pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task_id: row.get(0)?,
            task_title: row.get(1)?,
            task_state: row.get(2)?,
            blockers: row.get(3)?,
            quest_title: row.get(4)?,
            quest_state: row.get(5)?,
            quest_priority: row.get(6)?,
            project_id: row.get(7)?,
            project_name: row.get(8)?,
        })
    }
}

impl TryFrom<CandidateRow> for Candidate {
    type Error = DecodeError;

    fn try_from(row: CandidateRow) -> Result<Self, Self::Error> {
        Ok(Candidate {
            task_id: parse_uuid("tasks.id", &row.task_id)?,
            task_title: row.task_title,
            task_state: parse_enum("tasks.state", &row.task_state, TaskState::from_str)?,
            blocker_count: codec::decode_list(row.blockers.as_deref()).len(),
            quest_title: row.quest_title,
            quest_state: parse_enum("quests.state", &row.quest_state, QuestState::from_str)?,
            quest_priority: row.quest_priority,
            project_id: parse_uuid("projects.id", &row.project_id)?,
            project_name: row.project_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_row() -> TaskRow {
        TaskRow {
            id: Uuid::new_v4().to_string(),
            quest_id: Uuid::new_v4().to_string(),
            title: "Write docs".into(),
            details: String::new(),
            state: "todo".into(),
            estimate_points: 2,
            actual_points: None,
            blockers: None,
            notes: String::new(),
            completed_at: None,
            created_at: format_ts(Utc::now()),
            updated_at: format_ts(Utc::now()),
        }
    }

    #[test]
    fn decodes_well_formed_task() {
        let task = Task::try_from(task_row()).expect("decodes");
        assert_eq!(task.state, TaskState::Todo);
        assert!(task.blockers.is_empty());
    }

    #[test]
    fn rejects_unknown_state() {
        let mut row = task_row();
        row.state = "someday".into();
        let err = Task::try_from(row).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidEnum {
                field: "tasks.state",
                value: "someday".into()
            }
        );
    }

    #[test]
    fn rejects_bad_uuid_and_timestamp() {
        let mut row = task_row();
        row.id = "not-a-uuid".into();
        assert!(matches!(
            Task::try_from(row),
            Err(DecodeError::InvalidUuid { field: "tasks.id", .. })
        ));

        let mut row = task_row();
        row.updated_at = "yesterday".into();
        assert!(matches!(
            Task::try_from(row),
            Err(DecodeError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn rejects_negative_points() {
        let mut row = task_row();
        row.estimate_points = -1;
        assert!(matches!(
            Task::try_from(row),
            Err(DecodeError::OutOfRange { .. })
        ));
    }
}
