//! Content pool and media asset types.
//!
//! `QualifiedPool` and its members mirror the JSON contract of the external
//! pool provider, so field names serialize in camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AssetId, CoreError};

/// Which side of the comparison a piece of content belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Client,
    Competitor,
}

impl ContentSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentSource::Client => "client",
            ContentSource::Competitor => "competitor",
        }
    }
}

impl std::fmt::Display for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post that passed the provider's readiness checks for this job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedPost {
    pub post_id: String,
    pub source: ContentSource,
    pub platform: String,
    pub handle: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub views: u64,
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media_asset_ids: Vec<AssetId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCounts {
    pub client: u32,
    pub competitor: u32,
}

/// Provider-side accounting of what was dropped while building the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSummary {
    pub ready_snapshot_counts: SnapshotCounts,
    pub dropped_no_media: u32,
    pub dropped_no_metrics: u32,
    pub dropped_out_of_scope_competitor: u32,
    pub qualified_posts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualifiedPool {
    pub posts: Vec<QualifiedPost>,
    #[serde(default)]
    pub summary: PoolSummary,
}

impl QualifiedPool {
    /// Distinct media asset ids across all posts, in first-seen order.
    #[must_use]
    pub fn distinct_asset_ids(&self) -> Vec<AssetId> {
        let mut seen = std::collections::HashSet::new();
        self.posts
            .iter()
            .flat_map(|p| p.media_asset_ids.iter().copied())
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Options sent to the pool provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRequest {
    pub allow_degraded_snapshots: bool,
    pub require_scoped_competitors: bool,
    pub max_client_snapshots: u32,
    pub max_competitor_snapshots: u32,
    pub max_posts_per_snapshot: u32,
}

impl Default for PoolRequest {
    fn default() -> Self {
        Self {
            allow_degraded_snapshots: false,
            require_scoped_competitors: true,
            max_client_snapshots: 12,
            max_competitor_snapshots: 24,
            max_posts_per_snapshot: 12,
        }
    }
}

/// What an asset is attached to. Exactly one link is ever present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AssetLinkage {
    ClientSnapshot(i64),
    CompetitorSnapshot(i64),
    GenericPost(String),
}

impl AssetLinkage {
    /// Builds a linkage from the nullable columns of an asset row.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DualLinkage`] when both snapshot links are set and
    /// [`CoreError::MissingLinkage`] when nothing is set.
    pub fn from_parts(
        asset_id: AssetId,
        client_snapshot_id: Option<i64>,
        competitor_snapshot_id: Option<i64>,
        post_id: Option<String>,
    ) -> Result<Self, CoreError> {
        match (client_snapshot_id, competitor_snapshot_id, post_id) {
            (Some(_), Some(_), _) => Err(CoreError::DualLinkage(asset_id)),
            (Some(id), None, _) => Ok(Self::ClientSnapshot(id)),
            (None, Some(id), _) => Ok(Self::CompetitorSnapshot(id)),
            (None, None, Some(post)) => Ok(Self::GenericPost(post)),
            (None, None, None) => Err(CoreError::MissingLinkage(asset_id)),
        }
    }

    /// Competitor when a competitor snapshot link exists, client otherwise.
    #[must_use]
    pub fn source(&self) -> ContentSource {
        match self {
            AssetLinkage::CompetitorSnapshot(_) => ContentSource::Competitor,
            AssetLinkage::ClientSnapshot(_) | AssetLinkage::GenericPost(_) => {
                ContentSource::Client
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: AssetId,
    pub downloaded: bool,
    pub storage_pointer: Option<String>,
    pub linkage: AssetLinkage,
    pub has_analysis: bool,
}

impl MediaAsset {
    /// Downloaded and pointing at stored bytes.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.downloaded
            && self
                .storage_pointer
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty())
    }
}

/// Job-level fields the analyzer uses to frame its prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub brand_name: Option<String>,
    pub niche: Option<String>,
}

/// Per-asset context handed to the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisContext {
    pub brand_name: Option<String>,
    pub niche: Option<String>,
    pub platform: Option<String>,
    pub source: ContentSource,
}
