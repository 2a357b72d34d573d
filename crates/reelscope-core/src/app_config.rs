use std::net::SocketAddr;

use crate::settings::{AnalysisSettings, BackfillSettings, SchedulerSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub openai_api_key: Option<String>,
    pub pool_service_url: String,
    pub analyzer_url: String,
    pub collaborator_timeout_secs: u64,
    pub collaborator_max_retries: u32,
    pub scheduler: SchedulerSettings,
    pub analysis: AnalysisSettings,
    pub backfill: BackfillSettings,
}

impl AppConfig {
    /// Whether an AI credential that looks usable is configured.
    #[must_use]
    pub fn has_ai_credential(&self) -> bool {
        is_valid_ai_credential(self.openai_api_key.as_deref())
    }
}

/// Accepts `sk-` prefixed keys with no embedded whitespace.
#[must_use]
pub fn is_valid_ai_credential(key: Option<&str>) -> bool {
    key.map(str::trim).is_some_and(|k| {
        k.len() > "sk-".len() && k.starts_with("sk-") && !k.chars().any(char::is_whitespace)
    })
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("pool_service_url", &self.pool_service_url)
            .field("analyzer_url", &self.analyzer_url)
            .field("collaborator_timeout_secs", &self.collaborator_timeout_secs)
            .field("collaborator_max_retries", &self.collaborator_max_retries)
            .field("scheduler", &self.scheduler)
            .field("analysis", &self.analysis)
            .field("backfill", &self.backfill)
            .finish()
    }
}
