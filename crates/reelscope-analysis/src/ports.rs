//! Seams between the orchestrator and the systems it drives.
//!
//! Production implementations live in [`crate::pg`] and [`crate::http`];
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use reelscope_core::{
    AnalysisContext, AnalysisSettings, AssetId, JobContext, JobId, MediaAsset, PoolRequest,
    QualifiedPool, ScopeCounters,
};
use reelscope_db::RunFinalization;
use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, StoreError};
use crate::events::JobEvent;

/// Source of the qualified content pool for a job.
#[async_trait]
pub trait PoolProvider: Send + Sync {
    async fn fetch_pool(
        &self,
        job_id: JobId,
        request: &PoolRequest,
    ) -> Result<QualifiedPool, CollaboratorError>;
}

/// Result reported by the analyzer for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerVerdict {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalyzerVerdict {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The expensive AI step. One call per asset.
#[async_trait]
pub trait AssetAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        asset: &MediaAsset,
        context: &AnalysisContext,
    ) -> Result<AnalyzerVerdict, CollaboratorError>;
}

/// Fire-and-forget sink for job events.
///
/// Implementations must return promptly and must not panic; any delivery
/// failure is theirs to log.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: JobEvent);
}

/// Read access to media assets and their analysis state.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn job_context(&self, job_id: JobId) -> Result<JobContext, StoreError>;

    /// Loads the given assets. Unknown ids are omitted; order is unspecified.
    async fn load_assets(&self, ids: &[AssetId]) -> Result<Vec<MediaAsset>, StoreError>;

    /// Number of `ids` that currently carry at least one analysis record.
    async fn count_analyzed(&self, ids: &[AssetId]) -> Result<i64, StoreError>;

    /// Job-wide count of downloaded assets with a storage pointer.
    async fn count_downloaded(&self, job_id: JobId) -> Result<i64, StoreError>;
}

/// Durable record of orchestration passes.
#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn create_run(
        &self,
        job_id: JobId,
        config: &AnalysisSettings,
        snapshot: &ScopeCounters,
    ) -> Result<i64, StoreError>;

    async fn finalize_run(
        &self,
        run_id: i64,
        finalization: &RunFinalization,
    ) -> Result<(), StoreError>;
}
