//! SQLite-backed store for projects, quests, tasks and session events.
//!
//! Every quest or task mutation runs in one transaction together with the
//! health recompute for the owning project.

pub mod codec;
mod rows;
mod schema;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Params, Row};
use uuid::Uuid;

use crate::error::{DecodeError, StoreError, StoreResult};
use crate::models::*;
use crate::scorer::{self, Candidate};
use crate::{health, pulse};
use rows::{format_ts, CandidateRow, ProjectRow, QuestRow, SessionEventRow, TaskRow};

pub use schema::SCHEMA;

/// Quest that receives tasks filed against a project with no open quest.
pub const BACKLOG_QUEST_TITLE: &str = "Backlog";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    health_runs: Arc<AtomicUsize>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database with the schema already applied.
    pub fn open_memory() -> StoreResult<Self> {
        let db = Self::from_connection(Connection::open_in_memory()?)?;
        db.migrate()?;
        Ok(db)
    }

    /// Default on-disk location under the platform data directory.
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("dev", "questline", "questline")
            .context("Could not determine a home directory for the database")?;
        Ok(dirs.data_dir().join("questline.db"))
    }

    pub fn open_default() -> anyhow::Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tracing::debug!("Opening database at {}", path.display());
        Ok(Self::open(&path)?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            health_runs: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn migrate(&self) -> StoreResult<()> {
        self.lock()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Number of health recomputes run since this handle was opened.
    pub fn health_recompute_count(&self) -> usize {
        self.health_runs.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub fn create_project(&self, input: CreateProjectInput) -> StoreResult<Project> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let project = insert_project(&tx, input)?;
        tx.commit()?;
        tracing::info!("Created project {} ({})", project.slug, project.id);
        Ok(project)
    }

    /// Create a project, or update the one already registered at the same path.
    ///
    /// The existing record keeps its id and slug unless a slug is supplied.
    pub fn register_project(&self, input: CreateProjectInput) -> StoreResult<Project> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let path = expand_home(&input.path);
        let existing: Option<Project> = fetch_one(
            &tx,
            &format!("SELECT {} FROM projects p WHERE p.path = ?1", ProjectRow::COLUMNS),
            params![path],
            ProjectRow::read,
        )?;

        let project = match existing {
            Some(existing) => {
                let patch = UpdateProjectInput {
                    slug: input.slug,
                    name: Some(input.name),
                    path: None,
                    status: input.status,
                    tags: Some(input.tags),
                };
                let updated = apply_project_update(&tx, existing, patch)?;
                tracing::info!("Updated registered project {} ({})", updated.slug, updated.id);
                updated
            }
            None => {
                let created = insert_project(&tx, input)?;
                tracing::info!("Registered project {} ({})", created.slug, created.id);
                created
            }
        };
        tx.commit()?;
        Ok(project)
    }

    pub fn get_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        let conn = self.lock()?;
        get_project_in(&conn, id)
    }

    /// Look a project up by id, then slug, then path. First match wins.
    pub fn resolve_project(&self, key: &str) -> StoreResult<Project> {
        let conn = self.lock()?;
        let key = key.trim();
        if let Ok(id) = Uuid::parse_str(key) {
            if let Some(project) = get_project_in(&conn, id)? {
                return Ok(project);
            }
        }
        let by_slug: Option<Project> = fetch_one(
            &conn,
            &format!("SELECT {} FROM projects p WHERE p.slug = ?1", ProjectRow::COLUMNS),
            params![key],
            ProjectRow::read,
        )?;
        if let Some(project) = by_slug {
            return Ok(project);
        }
        let by_path: Option<Project> = fetch_one(
            &conn,
            &format!("SELECT {} FROM projects p WHERE p.path = ?1", ProjectRow::COLUMNS),
            params![expand_home(key)],
            ProjectRow::read,
        )?;
        by_path.ok_or_else(|| StoreError::not_found("project", key))
    }

    pub fn list_projects(&self, status: Option<ProjectStatus>) -> StoreResult<Vec<Project>> {
        let conn = self.lock()?;
        fetch_all(
            &conn,
            &format!(
                "SELECT {} FROM projects p
                 WHERE (?1 IS NULL OR p.status = ?1)
                 ORDER BY p.updated_at DESC, p.rowid DESC",
                ProjectRow::COLUMNS
            ),
            params![status.map(|s| s.as_str())],
            ProjectRow::read,
        )
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> StoreResult<Project> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existing =
            get_project_in(&tx, id)?.ok_or_else(|| StoreError::not_found("project", id))?;
        let project = apply_project_update(&tx, existing, input)?;
        tx.commit()?;
        Ok(project)
    }

    /// Delete a project together with its quests and their tasks.
    pub fn delete_project(&self, id: Uuid) -> StoreResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])?;
        if rows > 0 {
            tracing::info!("Deleted project {}", id);
        }
        Ok(rows > 0)
    }

    // ------------------------------------------------------------------
    // Quests
    // ------------------------------------------------------------------

    pub fn create_quest(&self, project_id: Uuid, input: CreateQuestInput) -> StoreResult<Quest> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if get_project_in(&tx, project_id)?.is_none() {
            return Err(StoreError::not_found("project", project_id));
        }
        let quest = insert_quest(&tx, project_id, input)?;
        self.after_mutation(&tx, quest.id);
        tx.commit()?;
        Ok(quest)
    }

    pub fn get_quest(&self, id: Uuid) -> StoreResult<Option<Quest>> {
        let conn = self.lock()?;
        get_quest_in(&conn, id)
    }

    /// Quests ordered by descending priority, then most recently updated.
    pub fn list_quests(&self, project_id: Option<Uuid>) -> StoreResult<Vec<Quest>> {
        let conn = self.lock()?;
        fetch_all(
            &conn,
            &format!(
                "SELECT {} FROM quests q
                 WHERE (?1 IS NULL OR q.project_id = ?1)
                 ORDER BY q.priority DESC, q.updated_at DESC, q.rowid DESC",
                QuestRow::COLUMNS
            ),
            params![project_id.map(|id| id.to_string())],
            QuestRow::read,
        )
    }

    pub fn update_quest(&self, id: Uuid, input: UpdateQuestInput) -> StoreResult<Quest> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut quest = get_quest_in(&tx, id)?.ok_or_else(|| StoreError::not_found("quest", id))?;

        if let Some(title) = input.title {
            quest.title = non_empty("title", title)?;
        }
        if let Some(description) = input.description {
            quest.description = description;
        }
        if let Some(state) = input.state {
            quest.state = state;
        }
        if let Some(xp_reward) = input.xp_reward {
            quest.xp_reward = xp_reward;
        }
        if input.due_at.is_some() {
            quest.due_at = input.due_at;
        }
        if let Some(priority) = input.priority {
            quest.priority = priority;
        }
        quest.updated_at = Utc::now();

        tx.execute(
            "UPDATE quests SET title = ?1, description = ?2, state = ?3, xp_reward = ?4,
                 due_at = ?5, priority = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                quest.title,
                quest.description,
                quest.state.as_str(),
                quest.xp_reward,
                quest.due_at.map(format_ts),
                quest.priority,
                format_ts(quest.updated_at),
                quest.id.to_string(),
            ],
        )?;
        self.after_mutation(&tx, quest.id);
        tx.commit()?;
        Ok(quest)
    }

    /// The quest new project-level tasks should be filed under: the most
    /// urgent quest that is not done, or a fresh active backlog quest.
    pub fn default_quest_for(&self, project_id: Uuid) -> StoreResult<Quest> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if get_project_in(&tx, project_id)?.is_none() {
            return Err(StoreError::not_found("project", project_id));
        }
        let (quest, created) = default_quest_in(&tx, project_id)?;
        if created {
            self.after_mutation(&tx, quest.id);
        }
        tx.commit()?;
        Ok(quest)
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub fn create_task(&self, quest_id: Uuid, input: CreateTaskInput) -> StoreResult<Task> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if get_quest_in(&tx, quest_id)?.is_none() {
            return Err(StoreError::not_found("quest", quest_id));
        }
        let task = insert_task(&tx, quest_id, input)?;
        self.after_mutation(&tx, quest_id);
        tx.commit()?;
        tracing::debug!("Created task {} under quest {}", task.id, quest_id);
        Ok(task)
    }

    /// File a task under the project's default quest. Picking or creating
    /// that quest and inserting the task commit together.
    pub fn create_task_in_project(
        &self,
        project_id: Uuid,
        input: CreateTaskInput,
    ) -> StoreResult<Task> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if get_project_in(&tx, project_id)?.is_none() {
            return Err(StoreError::not_found("project", project_id));
        }
        let (quest, _) = default_quest_in(&tx, project_id)?;
        let task = insert_task(&tx, quest.id, input)?;
        self.after_mutation(&tx, quest.id);
        tx.commit()?;
        tracing::debug!("Created task {} under quest {} ({})", task.id, quest.id, quest.title);
        Ok(task)
    }

    pub fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        let conn = self.lock()?;
        get_task_in(&conn, id)
    }

    /// Tasks matching the filter, most recently updated first.
    pub fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let conn = self.lock()?;
        fetch_all(
            &conn,
            &format!(
                "SELECT {} FROM tasks t
                 JOIN quests q ON q.id = t.quest_id
                 WHERE (?1 IS NULL OR q.project_id = ?1)
                   AND (?2 IS NULL OR t.quest_id = ?2)
                   AND (?3 IS NULL OR t.state = ?3)
                 ORDER BY t.updated_at DESC, t.rowid DESC",
                TaskRow::COLUMNS
            ),
            params![
                filter.project_id.map(|id| id.to_string()),
                filter.quest_id.map(|id| id.to_string()),
                filter.state.map(|s| s.as_str()),
            ],
            TaskRow::read,
        )
    }

    pub fn update_task(&self, id: Uuid, input: UpdateTaskInput) -> StoreResult<Task> {
        self.mutate_task(id, |task, now| {
            if let Some(title) = input.title {
                task.title = non_empty("title", title)?;
            }
            if let Some(details) = input.details {
                task.details = details;
            }
            if let Some(estimate) = input.estimate_points {
                task.estimate_points = estimate;
            }
            if input.actual_points.is_some() {
                task.actual_points = input.actual_points;
            }
            if let Some(blockers) = input.blockers {
                task.blockers = blockers;
            }
            if let Some(notes) = input.notes {
                task.notes = notes;
            }
            if let Some(state) = input.state {
                set_task_state(task, state, now);
            }
            Ok(())
        })
    }

    /// Mark a task done. Actual points come from the argument, else the prior
    /// actual value, else the estimate.
    pub fn complete_task(&self, id: Uuid, actual_points: Option<u32>) -> StoreResult<Task> {
        self.mutate_task(id, |task, now| {
            task.actual_points = actual_points
                .or(task.actual_points)
                .or(Some(task.estimate_points));
            set_task_state(task, TaskState::Done, now);
            Ok(())
        })
    }

    fn mutate_task<F>(&self, id: Uuid, apply: F) -> StoreResult<Task>
    where
        F: FnOnce(&mut Task, DateTime<Utc>) -> StoreResult<()>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut task = get_task_in(&tx, id)?.ok_or_else(|| StoreError::not_found("task", id))?;
        let now = Utc::now();
        apply(&mut task, now)?;
        task.updated_at = now;

        tx.execute(
            "UPDATE tasks SET title = ?1, details = ?2, state = ?3, estimate_points = ?4,
                 actual_points = ?5, blockers = ?6, notes = ?7, completed_at = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                task.title,
                task.details,
                task.state.as_str(),
                task.estimate_points,
                task.actual_points,
                codec::encode_list(&task.blockers),
                task.notes,
                task.completed_at.map(format_ts),
                format_ts(task.updated_at),
                task.id.to_string(),
            ],
        )?;
        self.after_mutation(&tx, task.quest_id);
        tx.commit()?;
        Ok(task)
    }

    // ------------------------------------------------------------------
    // Session events
    // ------------------------------------------------------------------

    pub fn create_session_event(&self, input: CreateSessionEventInput) -> StoreResult<SessionEvent> {
        let event = SessionEvent {
            id: Uuid::new_v4(),
            agent: input.agent,
            cwd: non_empty("cwd", input.cwd)?,
            command: non_empty("command", input.command)?,
            started_at: input.started_at.unwrap_or_else(Utc::now),
            ended_at: input.ended_at,
            suggested_task_ids: input.suggested_task_ids,
            metadata: input.metadata,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO session_events (id, agent, cwd, command, started_at, ended_at,
                 suggested_task_ids, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id.to_string(),
                event.agent.as_str(),
                event.cwd,
                event.command,
                format_ts(event.started_at),
                event.ended_at.map(format_ts),
                codec::encode_list(&event.suggested_task_ids),
                codec::encode_map(&event.metadata),
            ],
        )?;
        Ok(event)
    }

    /// Most recent session events first.
    pub fn list_session_events(&self, limit: usize) -> StoreResult<Vec<SessionEvent>> {
        let conn = self.lock()?;
        fetch_all(
            &conn,
            &format!(
                "SELECT {} FROM session_events e
                 ORDER BY e.started_at DESC, e.rowid DESC
                 LIMIT ?1",
                SessionEventRow::COLUMNS
            ),
            params![i64::try_from(limit).unwrap_or(i64::MAX)],
            SessionEventRow::read,
        )
    }

    // ------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------

    pub fn project_pulse(&self, project_id: Uuid) -> StoreResult<ProjectPulse> {
        let conn = self.lock()?;
        if get_project_in(&conn, project_id)?.is_none() {
            return Err(StoreError::not_found("project", project_id));
        }
        let tasks = project_tasks_in(&conn, project_id)?;
        let metrics = pulse::calculate(&tasks, Utc::now());
        let next = scorer::pick(&candidates_in(&conn, Some(project_id))?);
        Ok(metrics.into_pulse(project_id, next.map(|n| n.reason)))
    }

    pub fn next_task_recommendation(
        &self,
        project_id: Option<Uuid>,
    ) -> StoreResult<Option<NextTaskRecommendation>> {
        let conn = self.lock()?;
        Ok(scorer::pick(&candidates_in(&conn, project_id)?))
    }

    // ------------------------------------------------------------------
    // Health propagation
    // ------------------------------------------------------------------

    /// Post-mutation hook: recompute health for the project owning `quest_id`.
    ///
    /// Best effort. Failures are logged and never fail the mutation.
    fn after_mutation(&self, conn: &Connection, quest_id: Uuid) {
        self.health_runs.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = propagate_health(conn, quest_id) {
            tracing::warn!("Health recompute for quest {} failed: {}", quest_id, e);
        }
    }
}

fn propagate_health(conn: &Connection, quest_id: Uuid) -> StoreResult<()> {
    let project_id: Option<String> = conn
        .query_row(
            "SELECT project_id FROM quests WHERE id = ?1",
            params![quest_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(project_id) = project_id else {
        tracing::debug!("Quest {} vanished; skipping health recompute", quest_id);
        return Ok(());
    };
    let project_id = Uuid::parse_str(&project_id).map_err(|_| DecodeError::InvalidUuid {
        field: "quests.project_id",
        value: project_id.clone(),
    })?;

    let now = Utc::now();
    let metrics = pulse::calculate(&project_tasks_in(conn, project_id)?, now);
    let score = health::score(&metrics);
    conn.execute(
        "UPDATE projects SET health_score = ?1, updated_at = ?2 WHERE id = ?3",
        params![score, format_ts(now), project_id.to_string()],
    )?;
    tracing::debug!("Project {} health is now {}", project_id, score);
    Ok(())
}

fn set_task_state(task: &mut Task, state: TaskState, now: DateTime<Utc>) {
    if state == TaskState::Done {
        if task.state != TaskState::Done || task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    } else {
        task.completed_at = None;
    }
    task.state = state;
}

fn insert_project(conn: &Connection, input: CreateProjectInput) -> StoreResult<Project> {
    let name = non_empty("name", input.name)?;
    let path = expand_home(&non_empty("path", input.path)?);
    let slug = match input.slug {
        Some(slug) => non_empty("slug", slugify(&slug))?,
        None => unique_slug(conn, &slugify(&name))?,
    };
    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4(),
        slug,
        name,
        path,
        status: input.status.unwrap_or_default(),
        tags: input.tags,
        health_score: 0,
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO projects (id, slug, name, path, status, tags, health_score, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            project.id.to_string(),
            project.slug,
            project.name,
            project.path,
            project.status.as_str(),
            codec::encode_list(&project.tags),
            project.health_score,
            format_ts(project.created_at),
            format_ts(project.updated_at),
        ],
    )
    .map_err(|e| conflict_or(e, "a project with this slug or path already exists"))?;
    Ok(project)
}

fn apply_project_update(
    conn: &Connection,
    mut project: Project,
    input: UpdateProjectInput,
) -> StoreResult<Project> {
    if let Some(slug) = input.slug {
        project.slug = non_empty("slug", slugify(&slug))?;
    }
    if let Some(name) = input.name {
        project.name = non_empty("name", name)?;
    }
    if let Some(path) = input.path {
        project.path = expand_home(&non_empty("path", path)?);
    }
    if let Some(status) = input.status {
        project.status = status;
    }
    if let Some(tags) = input.tags {
        project.tags = tags;
    }
    project.updated_at = Utc::now();

    conn.execute(
        "UPDATE projects SET slug = ?1, name = ?2, path = ?3, status = ?4, tags = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            project.slug,
            project.name,
            project.path,
            project.status.as_str(),
            codec::encode_list(&project.tags),
            format_ts(project.updated_at),
            project.id.to_string(),
        ],
    )
    .map_err(|e| conflict_or(e, "a project with this slug or path already exists"))?;
    Ok(project)
}

fn insert_quest(conn: &Connection, project_id: Uuid, input: CreateQuestInput) -> StoreResult<Quest> {
    let now = Utc::now();
    let quest = Quest {
        id: Uuid::new_v4(),
        project_id,
        title: non_empty("title", input.title)?,
        description: input.description,
        state: input.state.unwrap_or_default(),
        xp_reward: input.xp_reward,
        due_at: input.due_at,
        priority: input.priority,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO quests (id, project_id, title, description, state, xp_reward, due_at,
             priority, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            quest.id.to_string(),
            quest.project_id.to_string(),
            quest.title,
            quest.description,
            quest.state.as_str(),
            quest.xp_reward,
            quest.due_at.map(format_ts),
            quest.priority,
            format_ts(quest.created_at),
            format_ts(quest.updated_at),
        ],
    )?;
    Ok(quest)
}

fn unique_slug(conn: &Connection, base: &str) -> StoreResult<String> {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    loop {
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE slug = ?1)",
            params![candidate],
            |row| row.get(0),
        )?;
        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, suffix);
        suffix += 1;
    }
}

fn default_quest_in(conn: &Connection, project_id: Uuid) -> StoreResult<(Quest, bool)> {
    let open: Option<Quest> = fetch_one(
        conn,
        &format!(
            "SELECT {} FROM quests q
             WHERE q.project_id = ?1 AND q.state != 'done'
             ORDER BY q.priority DESC, q.updated_at DESC, q.rowid DESC
             LIMIT 1",
            QuestRow::COLUMNS
        ),
        params![project_id.to_string()],
        QuestRow::read,
    )?;
    match open {
        Some(quest) => Ok((quest, false)),
        None => {
            let quest = insert_quest(
                conn,
                project_id,
                CreateQuestInput {
                    title: BACKLOG_QUEST_TITLE.to_string(),
                    state: Some(QuestState::Active),
                    ..Default::default()
                },
            )?;
            Ok((quest, true))
        }
    }
}

fn insert_task(conn: &Connection, quest_id: Uuid, input: CreateTaskInput) -> StoreResult<Task> {
    let now = Utc::now();
    let state = input.state.unwrap_or_default();
    let task = Task {
        id: Uuid::new_v4(),
        quest_id,
        title: non_empty("title", input.title)?,
        details: input.details,
        state,
        estimate_points: input.estimate_points,
        actual_points: None,
        blockers: input.blockers,
        notes: input.notes,
        completed_at: (state == TaskState::Done).then_some(now),
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO tasks (id, quest_id, title, details, state, estimate_points,
             actual_points, blockers, notes, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            task.id.to_string(),
            task.quest_id.to_string(),
            task.title,
            task.details,
            task.state.as_str(),
            task.estimate_points,
            task.actual_points,
            codec::encode_list(&task.blockers),
            task.notes,
            task.completed_at.map(format_ts),
            format_ts(task.created_at),
            format_ts(task.updated_at),
        ],
    )?;
    Ok(task)
}

fn get_project_in(conn: &Connection, id: Uuid) -> StoreResult<Option<Project>> {
    fetch_one(
        conn,
        &format!("SELECT {} FROM projects p WHERE p.id = ?1", ProjectRow::COLUMNS),
        params![id.to_string()],
        ProjectRow::read,
    )
}

fn get_quest_in(conn: &Connection, id: Uuid) -> StoreResult<Option<Quest>> {
    fetch_one(
        conn,
        &format!("SELECT {} FROM quests q WHERE q.id = ?1", QuestRow::COLUMNS),
        params![id.to_string()],
        QuestRow::read,
    )
}

fn get_task_in(conn: &Connection, id: Uuid) -> StoreResult<Option<Task>> {
    fetch_one(
        conn,
        &format!("SELECT {} FROM tasks t WHERE t.id = ?1", TaskRow::COLUMNS),
        params![id.to_string()],
        TaskRow::read,
    )
}

fn project_tasks_in(conn: &Connection, project_id: Uuid) -> StoreResult<Vec<Task>> {
    fetch_all(
        conn,
        &format!(
            "SELECT {} FROM tasks t
             JOIN quests q ON q.id = t.quest_id
             WHERE q.project_id = ?1",
            TaskRow::COLUMNS
        ),
        params![project_id.to_string()],
        TaskRow::read,
    )
}

/// Open tasks with their quest and project, in tie-break order.
fn candidates_in(conn: &Connection, project_id: Option<Uuid>) -> StoreResult<Vec<Candidate>> {
    fetch_all(
        conn,
        &format!(
            "SELECT {} FROM tasks t
             JOIN quests q ON q.id = t.quest_id
             JOIN projects p ON p.id = q.project_id
             WHERE t.state IN ('todo', 'doing', 'review')
               AND (?1 IS NULL OR p.id = ?1)
             ORDER BY q.priority DESC, t.updated_at DESC, t.rowid DESC",
            CandidateRow::COLUMNS
        ),
        params![project_id.map(|id| id.to_string())],
        CandidateRow::read,
    )
}

fn fetch_all<R, T>(
    conn: &Connection,
    sql: &str,
    params: impl Params,
    read: fn(&Row<'_>) -> rusqlite::Result<R>,
) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = DecodeError>,
{
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, read)?
        .collect::<Result<Vec<R>, _>>()?;
    raw.into_iter()
        .map(|r| T::try_from(r).map_err(StoreError::from))
        .collect()
}

fn fetch_one<R, T>(
    conn: &Connection,
    sql: &str,
    params: impl Params,
    read: fn(&Row<'_>) -> rusqlite::Result<R>,
) -> StoreResult<Option<T>>
where
    T: TryFrom<R, Error = DecodeError>,
{
    let raw = conn.query_row(sql, params, read).optional()?;
    Ok(raw.map(T::try_from).transpose()?)
}

fn non_empty(field: &str, value: String) -> StoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn conflict_or(err: rusqlite::Error, message: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(message.to_string())
        }
        _ => StoreError::Sqlite(err),
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> String {
    let path = path.trim();
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.display(), rest),
        None => path.to_string(),
    }
}
