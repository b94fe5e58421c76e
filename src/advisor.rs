//! Optional LLM advice layered on top of the heuristic recommendation.
//!
//! The advisor may be missing, slow, or broken. Every failure degrades to the
//! heuristic answer built from the scorer's pick; nothing here surfaces an
//! error to the caller.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::AdvisorConfig;
use questline_core::models::{NextTaskRecommendation, ProjectStatus, TaskFilter, TaskState};
use questline_core::{Database, StoreResult};

/// Recent tasks included in the advisor context.
pub const CONTEXT_TASK_LIMIT: usize = 12;

pub const NO_PICK_SUMMARY: &str =
    "Nothing is queued up yet. Create your first quest and add a task to get moving.";

const SYSTEM_PROMPT: &str = "You help a solo developer decide what to work on next. \
You receive JSON describing their projects (with a 0-100 health score), recent tasks, \
and a heuristic pick. Reply with a JSON object of the form \
{\"summary\": string, \"recommendedTaskIds\": [string]} where the summary is at most \
two sentences and the ids are chosen only from the provided tasks, best first.";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An outside service that can suggest what to do next.
pub trait Advisor: Send + Sync {
    fn recommend<'a>(
        &'a self,
        context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Option<AdvisorRecommendation>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisorContext {
    pub projects: Vec<ProjectSummary>,
    pub recent_tasks: Vec<TaskSummary>,
    pub current_pick: Option<NextTaskRecommendation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub health_score: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub title: String,
    pub state: TaskState,
    pub blocker_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorRecommendation {
    pub summary: String,
    pub recommended_task_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceSource {
    Advisor,
    Heuristic,
}

/// What the `get_next_task` tool reports alongside the raw recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Advice {
    pub summary: String,
    pub recommended_task_ids: Vec<String>,
    pub source: AdviceSource,
}

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("advisor request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("advisor returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("advisor returned unusable content: {0}")]
    Malformed(String),
}

/// Gather the context bundle for one project, or all of them.
pub fn build_context(
    db: &Database,
    project_id: Option<Uuid>,
    current_pick: Option<NextTaskRecommendation>,
) -> StoreResult<AdvisorContext> {
    let projects = db
        .list_projects(None)?
        .into_iter()
        .filter(|p| project_id.map_or(true, |id| id == p.id))
        .map(|p| ProjectSummary {
            id: p.id,
            name: p.name,
            status: p.status,
            health_score: p.health_score,
        })
        .collect();

    let recent_tasks = db
        .list_tasks(&TaskFilter {
            project_id,
            ..Default::default()
        })?
        .into_iter()
        .take(CONTEXT_TASK_LIMIT)
        .map(|t| TaskSummary {
            id: t.id,
            title: t.title,
            state: t.state,
            blocker_count: t.blockers.len(),
        })
        .collect();

    Ok(AdvisorContext {
        projects,
        recent_tasks,
        current_pick,
    })
}

/// Deterministic advice derived from the scorer's pick alone.
pub fn heuristic(pick: Option<&NextTaskRecommendation>) -> Advice {
    match pick {
        Some(pick) => Advice {
            summary: format!("Momentum move: {}", pick.reason),
            recommended_task_ids: vec![pick.task_id.to_string()],
            source: AdviceSource::Heuristic,
        },
        None => Advice {
            summary: NO_PICK_SUMMARY.to_string(),
            recommended_task_ids: Vec::new(),
            source: AdviceSource::Heuristic,
        },
    }
}

/// Ask the advisor, bounded by `timeout`, falling back to the heuristic.
pub async fn advise(advisor: &dyn Advisor, context: &AdvisorContext, timeout: Duration) -> Advice {
    let fallback = || heuristic(context.current_pick.as_ref());

    let recommendation = match tokio::time::timeout(timeout, advisor.recommend(context)).await {
        Ok(Some(recommendation)) => recommendation,
        Ok(None) => return fallback(),
        Err(_) => {
            tracing::warn!("Advisor timed out after {:?}; using heuristic", timeout);
            return fallback();
        }
    };

    let known: HashSet<String> = context
        .recent_tasks
        .iter()
        .map(|t| t.id.to_string())
        .chain(context.current_pick.iter().map(|p| p.task_id.to_string()))
        .collect();
    let mut seen = HashSet::new();
    let recommended_task_ids: Vec<String> = recommendation
        .recommended_task_ids
        .into_iter()
        .filter(|id| known.contains(id) && seen.insert(id.clone()))
        .collect();

    let summary = recommendation.summary.trim().to_string();
    if summary.is_empty() {
        return fallback();
    }
    Advice {
        summary,
        recommended_task_ids,
        source: AdviceSource::Advisor,
    }
}

/// Advisor used when none is configured.
pub struct NoAdvisor;

impl Advisor for NoAdvisor {
    fn recommend<'a>(
        &'a self,
        _context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Option<AdvisorRecommendation>> {
        Box::pin(async { None })
    }
}

/// Advisor backed by an OpenAI-compatible chat completions endpoint.
pub struct LlmAdvisor {
    client: reqwest::Client,
    config: AdvisorConfig,
}

impl LlmAdvisor {
    pub fn new(config: AdvisorConfig) -> Result<Self, AdvisorError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn request(&self, context: &AdvisorContext) -> Result<String, AdvisorError> {
        let context_json = serde_json::to_string(context)
            .map_err(|e| AdvisorError::Malformed(e.to_string()))?;
        let body = json!({
            "model": self.config.model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": context_json },
            ],
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdvisorError::Status(status));
        }
        Ok(response.text().await?)
    }
}

impl Advisor for LlmAdvisor {
    fn recommend<'a>(
        &'a self,
        context: &'a AdvisorContext,
    ) -> BoxFuture<'a, Option<AdvisorRecommendation>> {
        Box::pin(async move {
            match self.request(context).await.and_then(|body| parse_completion(&body)) {
                Ok(recommendation) => Some(recommendation),
                Err(e) => {
                    tracing::warn!("Advisor unavailable: {}", e);
                    None
                }
            }
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Extract the advisor payload from a chat completion response body.
pub fn parse_completion(body: &str) -> Result<AdvisorRecommendation, AdvisorError> {
    let completion: ChatCompletion =
        serde_json::from_str(body).map_err(|e| AdvisorError::Malformed(e.to_string()))?;
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AdvisorError::Malformed("no message content".into()))?;

    serde_json::from_str(strip_code_fence(&content))
        .map_err(|e| AdvisorError::Malformed(e.to_string()))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Build the advisor for a configuration; disabled configs get [`NoAdvisor`].
pub fn from_config(config: &AdvisorConfig) -> Arc<dyn Advisor> {
    if !config.is_enabled() {
        tracing::info!("Advisor disabled; using heuristic advice only");
        return Arc::new(NoAdvisor);
    }
    match LlmAdvisor::new(config.clone()) {
        Ok(advisor) => {
            tracing::info!("Advisor enabled ({} via {})", config.model, config.base_url);
            Arc::new(advisor)
        }
        Err(e) => {
            tracing::warn!("Could not build advisor client: {}", e);
            Arc::new(NoAdvisor)
        }
    }
}
