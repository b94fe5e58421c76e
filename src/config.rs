//! Runtime configuration resolved from CLI flags and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use questline_core::Database;

pub const DEFAULT_ADVISOR_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ADVISOR_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ADVISOR_TIMEOUT_SECS: u64 = 8;

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Path to the SQLite database (defaults to the platform data directory)
    #[arg(long = "db", env = "QUESTLINE_DB", global = true)]
    pub db_path: Option<PathBuf>,
}

impl StoreArgs {
    /// Open and migrate the configured database.
    pub fn open(&self) -> anyhow::Result<Database> {
        let db = match &self.db_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Database::open(path)?
            }
            None => Database::open_default()?,
        };
        db.migrate()?;
        Ok(db)
    }
}

#[derive(Debug, Clone, Args)]
pub struct AdvisorArgs {
    /// Base URL of an OpenAI-compatible API used for advice
    #[arg(long = "advisor-url", env = "QUESTLINE_ADVISOR_URL", default_value = DEFAULT_ADVISOR_URL, global = true)]
    pub url: String,

    /// Model name sent to the advisor
    #[arg(long = "advisor-model", env = "QUESTLINE_ADVISOR_MODEL", default_value = DEFAULT_ADVISOR_MODEL, global = true)]
    pub model: String,

    /// API key for the advisor (falls back to OPENAI_API_KEY)
    #[arg(long = "advisor-key", env = "QUESTLINE_ADVISOR_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Seconds to wait for the advisor before using the heuristic answer
    #[arg(long = "advisor-timeout-secs", env = "QUESTLINE_ADVISOR_TIMEOUT_SECS", default_value_t = DEFAULT_ADVISOR_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,

    /// Never call the advisor
    #[arg(long = "no-advisor", global = true)]
    pub disabled: bool,
}

impl AdvisorArgs {
    pub fn into_config(self) -> AdvisorConfig {
        let fallback_key = std::env::var("OPENAI_API_KEY").ok();
        self.resolve(fallback_key)
    }

    fn resolve(self, fallback_key: Option<String>) -> AdvisorConfig {
        let api_key = if self.disabled {
            None
        } else {
            self.api_key
                .or(fallback_key)
                .filter(|key| !key.trim().is_empty())
        };
        AdvisorConfig {
            base_url: self.url.trim_end_matches('/').to_string(),
            model: self.model,
            api_key,
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl AdvisorConfig {
    pub fn disabled() -> Self {
        Self {
            base_url: DEFAULT_ADVISOR_URL.to_string(),
            model: DEFAULT_ADVISOR_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_ADVISOR_TIMEOUT_SECS),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}
