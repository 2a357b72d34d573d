//! Job timeline events emitted by the orchestrator.

use serde::Serialize;

/// Source tag attached to every event this crate emits.
pub const SOURCE_TAG: &str = "content_analysis";

pub const CODE_SKIPPED: &str = "analysis_skipped";
pub const CODE_ASSET_FAILED: &str = "analysis_asset_failed";
pub const CODE_COMPLETED: &str = "analysis_completed";
pub const CODE_FAILED: &str = "analysis_failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub job_id: i64,
    pub source: &'static str,
    pub code: &'static str,
    pub level: EventLevel,
    pub message: String,
    pub metrics: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

impl JobEvent {
    #[must_use]
    pub fn new(job_id: i64, code: &'static str, level: EventLevel, message: String) -> Self {
        Self {
            job_id,
            source: SOURCE_TAG,
            code,
            level,
            message,
            metrics: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: serde_json::Value) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
