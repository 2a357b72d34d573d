//! Shared domain types and configuration for reelscope.
//!
//! Nothing in this crate performs I/O beyond reading environment variables.

pub mod app_config;
pub mod config;
pub mod content;
pub mod run;
pub mod settings;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use content::{
    AnalysisContext, AssetLinkage, ContentSource, JobContext, MediaAsset, PoolRequest, PoolSummary,
    QualifiedPool, QualifiedPost, SnapshotCounts,
};
pub use run::{AssetFailure, RunStatus, ScopeCounters, SkipReason, MAX_DIAGNOSTIC_ERRORS};
pub use settings::{AnalysisSettings, BackfillSettings, SchedulerSettings};

/// Identifier of a job row. Jobs are owned by an external system; the core
/// only ever refers to them by id.
pub type JobId = i64;

/// Identifier of a media asset row.
pub type AssetId = i64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("media asset {0} is linked to both a client and a competitor snapshot")]
    DualLinkage(AssetId),
    #[error("media asset {0} has no snapshot or post linkage")]
    MissingLinkage(AssetId),
    #[error("unknown run status: {0}")]
    UnknownRunStatus(String),
    #[error("unknown skip reason: {0}")]
    UnknownSkipReason(String),
}
