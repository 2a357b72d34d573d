//! Postgres-backed implementations of the store, ledger and event ports.

use async_trait::async_trait;
use reelscope_core::{AnalysisSettings, AssetId, JobContext, JobId, MediaAsset, ScopeCounters};
use reelscope_db::{NewJobEvent, RunFinalization};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::events::{EventLevel, JobEvent};
use crate::ports::{EventEmitter, MediaStore, RunLedger};

#[derive(Debug, Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn job_context(&self, job_id: JobId) -> Result<JobContext, StoreError> {
        Ok(reelscope_db::get_job_context(&self.pool, job_id).await?)
    }

    async fn load_assets(&self, ids: &[AssetId]) -> Result<Vec<MediaAsset>, StoreError> {
        let rows = reelscope_db::load_media_assets(&self.pool, ids).await?;
        let mut assets = Vec::with_capacity(rows.len());
        for row in rows {
            let asset_id = row.id;
            match row.into_asset() {
                Ok(asset) => assets.push(asset),
                // Unlinked rows cannot be attributed to a source; leave them out.
                Err(e) => tracing::warn!(asset_id, error = %e, "store: dropping malformed asset row"),
            }
        }
        Ok(assets)
    }

    async fn count_analyzed(&self, ids: &[AssetId]) -> Result<i64, StoreError> {
        Ok(reelscope_db::count_analyzed_assets(&self.pool, ids).await?)
    }

    async fn count_downloaded(&self, job_id: JobId) -> Result<i64, StoreError> {
        Ok(reelscope_db::count_downloaded_assets(&self.pool, job_id).await?)
    }
}

#[derive(Debug, Clone)]
pub struct PgRunLedger {
    pool: PgPool,
}

impl PgRunLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunLedger for PgRunLedger {
    async fn create_run(
        &self,
        job_id: JobId,
        config: &AnalysisSettings,
        snapshot: &ScopeCounters,
    ) -> Result<i64, StoreError> {
        let row = reelscope_db::create_analysis_run(&self.pool, job_id, config, snapshot).await?;
        Ok(row.id)
    }

    async fn finalize_run(
        &self,
        run_id: i64,
        finalization: &RunFinalization,
    ) -> Result<(), StoreError> {
        reelscope_db::finalize_analysis_run(&self.pool, run_id, finalization).await?;
        Ok(())
    }
}

/// Writes events to `job_events` on a background task and mirrors them to
/// `tracing`.
#[derive(Debug, Clone)]
pub struct PgEventEmitter {
    pool: PgPool,
}

impl PgEventEmitter {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EventEmitter for PgEventEmitter {
    fn emit(&self, event: JobEvent) {
        let job_id = event.job_id;
        let code = event.code;
        match event.level {
            EventLevel::Info => tracing::info!(job_id, code, message = %event.message, "event"),
            EventLevel::Warn => tracing::warn!(job_id, code, message = %event.message, "event"),
            EventLevel::Error => tracing::error!(job_id, code, message = %event.message, "event"),
        }

        let row = NewJobEvent {
            job_id,
            source: event.source.to_string(),
            code: code.to_string(),
            level: event.level.as_str().to_string(),
            message: event.message,
            metrics: event.metrics,
            metadata: event.metadata,
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(job_id, code, "events: no runtime, event not persisted");
            return;
        };
        let pool = self.pool.clone();
        handle.spawn(async move {
            if let Err(e) = reelscope_db::insert_job_event(&pool, &row).await {
                tracing::error!(job_id, code, error = %e, "events: failed to persist job event");
            }
        });
    }
}
