//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use reelscope_core::{
    AnalysisContext, AnalysisSettings, AssetId, AssetLinkage, ContentSource, JobContext, JobId,
    MediaAsset, PoolRequest, PoolSummary, QualifiedPool, QualifiedPost, ScopeCounters,
};
use reelscope_db::RunFinalization;

use crate::error::{CollaboratorError, StoreError};
use crate::events::JobEvent;
use crate::ports::{AnalyzerVerdict, AssetAnalyzer, EventEmitter, MediaStore, PoolProvider, RunLedger};

pub fn client_post(id: &str, likes: u64, assets: &[AssetId]) -> QualifiedPost {
    QualifiedPost {
        post_id: id.to_string(),
        source: ContentSource::Client,
        platform: "instagram".to_string(),
        handle: "acme".to_string(),
        likes,
        comments: 0,
        views: 0,
        posted_at: None,
        media_asset_ids: assets.to_vec(),
    }
}

pub fn competitor_post(id: &str, handle: &str, likes: u64, assets: &[AssetId]) -> QualifiedPost {
    QualifiedPost {
        source: ContentSource::Competitor,
        handle: handle.to_string(),
        ..client_post(id, likes, assets)
    }
}

pub fn ready_asset(id: AssetId, analyzed: bool) -> MediaAsset {
    MediaAsset {
        id,
        downloaded: true,
        storage_pointer: Some(format!("media/{id}.jpg")),
        linkage: AssetLinkage::ClientSnapshot(1),
        has_analysis: analyzed,
    }
}

/// Returns a fixed pool, or a 503 when built with [`FakePool::failing`].
pub struct FakePool {
    pool: Option<QualifiedPool>,
}

impl FakePool {
    pub fn with_posts(posts: Vec<QualifiedPost>) -> Self {
        Self {
            pool: Some(QualifiedPool {
                posts,
                summary: PoolSummary::default(),
            }),
        }
    }

    pub fn failing() -> Self {
        Self { pool: None }
    }
}

#[async_trait]
impl PoolProvider for FakePool {
    async fn fetch_pool(
        &self,
        _job_id: JobId,
        _request: &PoolRequest,
    ) -> Result<QualifiedPool, CollaboratorError> {
        self.pool.clone().ok_or_else(|| CollaboratorError::Status {
            service: "pool",
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeStore {
    assets: Mutex<HashMap<AssetId, MediaAsset>>,
}

impl FakeStore {
    pub fn with_assets(assets: Vec<MediaAsset>) -> Self {
        Self {
            assets: Mutex::new(assets.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    pub fn mark_analyzed(&self, id: AssetId) {
        if let Some(asset) = self.assets.lock().unwrap().get_mut(&id) {
            asset.has_analysis = true;
        }
    }

    pub fn analyzed_count(&self) -> usize {
        self.assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.has_analysis)
            .count()
    }
}

#[async_trait]
impl MediaStore for FakeStore {
    async fn job_context(&self, _job_id: JobId) -> Result<JobContext, StoreError> {
        Ok(JobContext {
            brand_name: Some("Acme".to_string()),
            niche: Some("beverages".to_string()),
        })
    }

    async fn load_assets(&self, ids: &[AssetId]) -> Result<Vec<MediaAsset>, StoreError> {
        let assets = self.assets.lock().unwrap();
        // Reverse to prove callers do not rely on store order.
        Ok(ids.iter().rev().filter_map(|id| assets.get(id).cloned()).collect())
    }

    async fn count_analyzed(&self, ids: &[AssetId]) -> Result<i64, StoreError> {
        let assets = self.assets.lock().unwrap();
        let distinct: HashSet<&AssetId> = ids.iter().collect();
        let n = distinct
            .into_iter()
            .filter(|id| assets.get(id).is_some_and(|a| a.has_analysis))
            .count();
        Ok(i64::try_from(n).unwrap())
    }

    async fn count_downloaded(&self, _job_id: JobId) -> Result<i64, StoreError> {
        let n = self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.is_ready())
            .count();
        Ok(i64::try_from(n).unwrap())
    }
}

/// Fails every call as if the database were unreachable.
pub struct FailingStore;

impl FailingStore {
    fn down() -> StoreError {
        StoreError::Unavailable("down".to_string())
    }
}

#[async_trait]
impl MediaStore for FailingStore {
    async fn job_context(&self, _job_id: JobId) -> Result<JobContext, StoreError> {
        Err(Self::down())
    }

    async fn load_assets(&self, _ids: &[AssetId]) -> Result<Vec<MediaAsset>, StoreError> {
        Err(Self::down())
    }

    async fn count_analyzed(&self, _ids: &[AssetId]) -> Result<i64, StoreError> {
        Err(Self::down())
    }

    async fn count_downloaded(&self, _job_id: JobId) -> Result<i64, StoreError> {
        Err(Self::down())
    }
}

/// Parks every call until the test releases it, so a pass can be held open.
#[derive(Default)]
pub struct GatedAnalyzer {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl AssetAnalyzer for GatedAnalyzer {
    async fn analyze(
        &self,
        _asset: &MediaAsset,
        _context: &AnalysisContext,
    ) -> Result<AnalyzerVerdict, CollaboratorError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(AnalyzerVerdict::ok())
    }
}

/// Succeeds by marking the asset analyzed in the shared store, unless told
/// to fail for a given id.
pub struct FakeAnalyzer {
    store: Arc<FakeStore>,
    verdict_failures: Mutex<HashSet<AssetId>>,
    transport_failures: Mutex<HashSet<AssetId>>,
    panics: Mutex<HashSet<AssetId>>,
    calls: Mutex<Vec<AssetId>>,
    contexts: Mutex<HashMap<AssetId, AnalysisContext>>,
}

impl FakeAnalyzer {
    pub fn new(store: Arc<FakeStore>) -> Self {
        Self {
            store,
            verdict_failures: Mutex::default(),
            transport_failures: Mutex::default(),
            panics: Mutex::default(),
            calls: Mutex::default(),
            contexts: Mutex::default(),
        }
    }

    pub fn fail_verdict(&self, id: AssetId) {
        self.verdict_failures.lock().unwrap().insert(id);
    }

    pub fn fail_transport(&self, id: AssetId) {
        self.transport_failures.lock().unwrap().insert(id);
    }

    pub fn panic_on(&self, id: AssetId) {
        self.panics.lock().unwrap().insert(id);
    }

    pub fn calls(&self) -> Vec<AssetId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contexts(&self) -> HashMap<AssetId, AnalysisContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetAnalyzer for FakeAnalyzer {
    async fn analyze(
        &self,
        asset: &MediaAsset,
        context: &AnalysisContext,
    ) -> Result<AnalyzerVerdict, CollaboratorError> {
        self.calls.lock().unwrap().push(asset.id);
        self.contexts
            .lock()
            .unwrap()
            .insert(asset.id, context.clone());

        let should_panic = self.panics.lock().unwrap().contains(&asset.id);
        assert!(!should_panic, "analyzer exploded on asset {}", asset.id);

        if self.transport_failures.lock().unwrap().contains(&asset.id) {
            return Err(CollaboratorError::Status {
                service: "analyzer",
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        if self.verdict_failures.lock().unwrap().contains(&asset.id) {
            return Ok(AnalyzerVerdict::failed("model refused"));
        }
        self.store.mark_analyzed(asset.id);
        Ok(AnalyzerVerdict::ok())
    }
}

#[derive(Default)]
pub struct FakeLedger {
    next_id: AtomicI64,
    created: Mutex<Vec<(i64, JobId)>>,
    finalized: Mutex<Vec<RunFinalization>>,
    pub fail_create: AtomicBool,
    pub fail_finalize: AtomicBool,
}

impl FakeLedger {
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn finalized(&self) -> Vec<RunFinalization> {
        self.finalized.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunLedger for FakeLedger {
    async fn create_run(
        &self,
        job_id: JobId,
        _config: &AnalysisSettings,
        _snapshot: &ScopeCounters,
    ) -> Result<i64, StoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger offline".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.created.lock().unwrap().push((id, job_id));
        Ok(id)
    }

    async fn finalize_run(
        &self,
        _run_id: i64,
        finalization: &RunFinalization,
    ) -> Result<(), StoreError> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger offline".to_string()));
        }
        self.finalized.lock().unwrap().push(finalization.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingEvents {
    pub fn codes(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.code).collect()
    }
}

impl EventEmitter for RecordingEvents {
    fn emit(&self, event: JobEvent) {
        self.events.lock().unwrap().push(event);
    }
}
