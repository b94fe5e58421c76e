pub mod framing;
pub mod tools;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::advisor::{self, Advisor};
use crate::config::AdvisorConfig;
use questline_core::models::*;
use questline_core::{Database, StoreError};
use tools::*;

pub const SERVER_NAME: &str = "questline";

const TASK_STATES: &str = "todo, doing, review, done, blocked";
const QUEST_STATES: &str = "todo, active, done, blocked";
const PROJECT_STATUSES: &str = "active, paused, archived";

#[derive(Clone)]
pub struct McpServer {
    db: Database,
    advisor: Arc<dyn Advisor>,
    advisor_timeout: Duration,
    tool_router: ToolRouter<Self>,
}

/// Caller mistakes become invalid params tagged with a `data.kind`; anything
/// else is an internal error.
fn store_error(err: StoreError) -> McpError {
    let kind = match &err {
        StoreError::NotFound { .. } => "not_found",
        StoreError::Validation(_) => "validation",
        StoreError::Conflict(_) => "conflict",
        _ => return McpError::internal_error(err.to_string(), None),
    };
    McpError::invalid_params(err.to_string(), Some(json!({ "kind": kind })))
}

fn validation(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), Some(json!({ "kind": "validation" })))
}

fn structured<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let value =
        serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::structured(value))
}

impl McpServer {
    pub fn new(db: Database, advisor: Arc<dyn Advisor>, advisor_timeout: Duration) -> Self {
        Self {
            db,
            advisor,
            advisor_timeout,
            tool_router: Self::tool_router(),
        }
    }

    /// Server with no advisor configured.
    pub fn heuristic_only(db: Database) -> Self {
        Self::new(db, Arc::new(advisor::NoAdvisor), AdvisorConfig::disabled().timeout)
    }

    fn parse_uuid(field: &str, s: &str) -> Result<Uuid, McpError> {
        Uuid::parse_str(s.trim()).map_err(|e| validation(format!("Invalid {}: {}", field, e)))
    }

    fn parse_choice<T>(
        field: &str,
        value: Option<&str>,
        parse: fn(&str) -> Option<T>,
        allowed: &str,
    ) -> Result<Option<T>, McpError> {
        value
            .map(|v| {
                parse(&v.trim().to_ascii_lowercase()).ok_or_else(|| {
                    validation(format!("Invalid {} '{}': expected one of {}", field, v, allowed))
                })
            })
            .transpose()
    }

    fn parse_agent(agent: Option<&str>) -> AgentKind {
        agent
            .and_then(|a| AgentKind::from_str(&a.trim().to_ascii_lowercase()))
            .unwrap_or_default()
    }

    fn resolve_scope(&self, key: Option<String>) -> Result<Option<Uuid>, McpError> {
        key.map(|key| self.db.resolve_project(&key).map(|p| p.id))
            .transpose()
            .map_err(store_error)
    }
}

#[tool_router]
impl McpServer {
    #[tool(description = "List tracked projects with their health scores")]
    async fn list_projects(
        &self,
        params: Parameters<ListProjectsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let status = Self::parse_choice(
            "status",
            req.status.as_deref(),
            ProjectStatus::from_str,
            PROJECT_STATUSES,
        )?;
        let projects = self.db.list_projects(status).map_err(store_error)?;
        structured(&json!({ "projects": projects }))
    }

    #[tool(description = "Get completion, velocity, staleness and next action for a project")]
    async fn get_project_pulse(
        &self,
        params: Parameters<GetProjectPulseRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let project = self.db.resolve_project(&req.project_id).map_err(store_error)?;
        let pulse = self.db.project_pulse(project.id).map_err(store_error)?;
        structured(&pulse)
    }

    #[tool(description = "List tasks, optionally filtered by project and state")]
    async fn list_tasks(
        &self,
        params: Parameters<ListTasksRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let state = Self::parse_choice("state", req.state.as_deref(), TaskState::from_str, TASK_STATES)?;
        let project_id = self.resolve_scope(req.project_id)?;

        let tasks = self
            .db
            .list_tasks(&TaskFilter {
                project_id,
                quest_id: None,
                state,
            })
            .map_err(store_error)?;
        structured(&json!({ "tasks": tasks }))
    }

    #[tool(description = "Create a task under a quest, or under a project's most urgent open quest")]
    async fn create_task(
        &self,
        params: Parameters<CreateTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let state = Self::parse_choice("state", req.state.as_deref(), TaskState::from_str, TASK_STATES)?;
        let quest_id = req
            .quest_id
            .as_deref()
            .map(|q| Self::parse_uuid("quest_id", q))
            .transpose()?;
        if req.title.trim().is_empty() {
            return Err(validation("title must not be empty"));
        }

        let input = CreateTaskInput {
            title: req.title,
            details: req.details.unwrap_or_default(),
            state,
            estimate_points: req.estimate_points.unwrap_or_default(),
            blockers: req.blockers,
            notes: req.notes.unwrap_or_default(),
        };

        let task = match (quest_id, req.project_id.as_deref()) {
            (Some(quest_id), project_key) => {
                let quest = self
                    .db
                    .get_quest(quest_id)
                    .map_err(store_error)?
                    .ok_or_else(|| store_error(StoreError::not_found("quest", quest_id)))?;
                if let Some(key) = project_key {
                    let project = self.db.resolve_project(key).map_err(store_error)?;
                    if project.id != quest.project_id {
                        return Err(validation(format!(
                            "Quest {} does not belong to project {}",
                            quest_id, project.slug
                        )));
                    }
                }
                self.db.create_task(quest.id, input)
            }
            (None, Some(key)) => {
                let project = self.db.resolve_project(key).map_err(store_error)?;
                self.db.create_task_in_project(project.id, input)
            }
            (None, None) => {
                return Err(validation("create_task requires project_id or quest_id"));
            }
        }
        .map_err(store_error)?;

        tracing::info!("Created task {} ({})", task.id, task.title);
        structured(&task)
    }

    #[tool(description = "Patch fields of a task")]
    async fn update_task(
        &self,
        params: Parameters<UpdateTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let task_id = Self::parse_uuid("task_id", &req.task_id)?;
        let state = Self::parse_choice("state", req.state.as_deref(), TaskState::from_str, TASK_STATES)?;

        let task = self
            .db
            .update_task(
                task_id,
                UpdateTaskInput {
                    title: req.title,
                    details: req.details,
                    state,
                    estimate_points: req.estimate_points,
                    actual_points: req.actual_points,
                    blockers: req.blockers,
                    notes: req.notes,
                },
            )
            .map_err(store_error)?;
        structured(&task)
    }

    #[tool(description = "Mark a task as complete")]
    async fn complete_task(
        &self,
        params: Parameters<CompleteTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let task_id = Self::parse_uuid("task_id", &req.task_id)?;

        let task = self
            .db
            .complete_task(task_id, req.actual_points)
            .map_err(store_error)?;
        tracing::info!("Completed task {} ({})", task.id, task.title);
        structured(&task)
    }

    #[tool(description = "Recommend the single best next task, with optional advisor summary")]
    async fn get_next_task(
        &self,
        params: Parameters<GetNextTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let project_id = self.resolve_scope(req.project_id)?;

        let recommendation = self
            .db
            .next_task_recommendation(project_id)
            .map_err(store_error)?;
        let context = advisor::build_context(&self.db, project_id, recommendation.clone())
            .map_err(store_error)?;

        // A panicking advisor fails this call only.
        let bridge = Arc::clone(&self.advisor);
        let timeout = self.advisor_timeout;
        let advice = tokio::spawn(async move {
            advisor::advise(bridge.as_ref(), &context, timeout).await
        })
        .await
        .map_err(|e| McpError::internal_error(format!("Advisor failed: {}", e), None))?;

        structured(&json!({
            "recommendation": recommendation,
            "advice": advice,
        }))
    }

    #[tool(description = "Record that an agent session started in a directory")]
    async fn log_session_event(
        &self,
        params: Parameters<LogSessionEventRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        if req.cwd.trim().is_empty() {
            return Err(validation("cwd must not be empty"));
        }
        if req.command.trim().is_empty() {
            return Err(validation("command must not be empty"));
        }
        let agent = Self::parse_agent(req.agent.as_deref());

        let suggested_task_ids = match req.suggested_task_ids {
            Some(ids) => ids,
            None => {
                let scope = match self.db.resolve_project(&req.cwd) {
                    Ok(project) => Some(project.id),
                    Err(StoreError::NotFound { .. }) => None,
                    Err(e) => return Err(store_error(e)),
                };
                self.db
                    .next_task_recommendation(scope)
                    .map_err(store_error)?
                    .map(|r| vec![r.task_id.to_string()])
                    .unwrap_or_default()
            }
        };

        let event = self
            .db
            .create_session_event(CreateSessionEventInput {
                agent,
                cwd: req.cwd,
                command: req.command,
                started_at: None,
                ended_at: None,
                suggested_task_ids,
                metadata: req.metadata,
            })
            .map_err(store_error)?;
        tracing::info!("Logged {} session in {}", event.agent.as_str(), event.cwd);
        structured(&event)
    }

    #[tool(description = "List quests by descending priority")]
    async fn list_quests(
        &self,
        params: Parameters<ListQuestsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_id = self.resolve_scope(params.0.project_id)?;
        let quests = self.db.list_quests(project_id).map_err(store_error)?;
        structured(&json!({ "quests": quests }))
    }

    #[tool(description = "Create a quest in a project")]
    async fn create_quest(
        &self,
        params: Parameters<CreateQuestRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let state =
            Self::parse_choice("state", req.state.as_deref(), QuestState::from_str, QUEST_STATES)?;
        let due_at = req
            .due_at
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw.trim())
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| validation(format!("Invalid due_at '{}': {}", raw, e)))
            })
            .transpose()?;

        let project = self.db.resolve_project(&req.project_id).map_err(store_error)?;
        let quest = self
            .db
            .create_quest(
                project.id,
                CreateQuestInput {
                    title: req.title,
                    description: req.description.unwrap_or_default(),
                    state,
                    xp_reward: req.xp_reward.unwrap_or_default(),
                    due_at,
                    priority: req.priority.unwrap_or_default(),
                },
            )
            .map_err(store_error)?;
        structured(&quest)
    }

    #[tool(description = "Register a project by path, updating it if the path is already known")]
    async fn register_project(
        &self,
        params: Parameters<RegisterProjectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let status = Self::parse_choice(
            "status",
            req.status.as_deref(),
            ProjectStatus::from_str,
            PROJECT_STATUSES,
        )?;
        let project = self
            .db
            .register_project(CreateProjectInput {
                slug: req.slug,
                name: req.name,
                path: req.path,
                status,
                tags: req.tags,
            })
            .map_err(store_error)?;
        structured(&project)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Questline tracks projects as quests and tasks and recommends the next task \
                 worth doing. Call get_next_task before starting work and complete_task when done."
                    .into(),
            ),
            ..Default::default()
        }
    }
}

/// Serve `service` over `Content-Length` framed JSON-RPC until the input
/// closes and every owed reply is written.
pub async fn serve_framed<R, W>(service: McpServer, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let transport = transport::framed(reader, writer);
    let server = service.serve((transport.sink, transport.stream)).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    transport.writer.await??;
    Ok(())
}

pub async fn run_stdio_server(db: Database, advisor_config: AdvisorConfig) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let advisor = advisor::from_config(&advisor_config);
    let service = McpServer::new(db, advisor, advisor_config.timeout);
    serve_framed(service, stdin(), stdout()).await
}
