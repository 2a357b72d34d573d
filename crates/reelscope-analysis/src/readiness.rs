//! Readiness gates evaluated before any analyzer call.
//!
//! Gates run in [`SkipReason`] priority order and the first one that trips
//! decides the skip. Every gate is a pure function of its inputs, so
//! re-evaluating an unchanged pool yields the same reason.

use reelscope_core::{AssetId, MediaAsset, QualifiedPool, SkipReason};

/// Gate 1: the AI credential.
///
/// # Errors
///
/// Returns [`SkipReason::OpenaiNotConfigured`] when no usable key is set.
pub fn check_credential(configured: bool) -> Result<(), SkipReason> {
    if configured {
        Ok(())
    } else {
        Err(SkipReason::OpenaiNotConfigured)
    }
}

/// Gates 2 and 3: the pool has posts, and those posts link media.
///
/// # Errors
///
/// Returns [`SkipReason::NoQualifiedScopedPosts`] for an empty pool and
/// [`SkipReason::NoQualifiedMediaAssets`] when no post links an asset.
pub fn check_pool(pool: &QualifiedPool) -> Result<(), SkipReason> {
    if pool.posts.is_empty() {
        return Err(SkipReason::NoQualifiedScopedPosts);
    }
    if pool.posts.iter().all(|p| p.media_asset_ids.is_empty()) {
        return Err(SkipReason::NoQualifiedMediaAssets);
    }
    Ok(())
}

/// Assets that passed gates 4 and 5, in selection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
    /// Downloaded with a storage pointer.
    pub eligible: Vec<MediaAsset>,
    /// Eligible assets still to analyze. Equal to `eligible` when
    /// already-analyzed assets are not being skipped.
    pub pending: Vec<MediaAsset>,
}

impl Candidates {
    #[must_use]
    pub fn analyzed_count(&self) -> usize {
        self.eligible.iter().filter(|a| a.has_analysis).count()
    }

    #[must_use]
    pub fn eligible_ids(&self) -> Vec<AssetId> {
        self.eligible.iter().map(|a| a.id).collect()
    }
}

/// Gates 4 and 5 over the selected assets.
///
/// # Errors
///
/// Returns [`SkipReason::NoDownloadedAssets`] when none of `selected` is
/// ready, and [`SkipReason::NoUnanalyzedMedia`] when every ready asset is
/// already analyzed and `skip_already_analyzed` is set.
pub fn select_candidates(
    selected: &[MediaAsset],
    skip_already_analyzed: bool,
) -> Result<Candidates, SkipReason> {
    let eligible: Vec<MediaAsset> = selected.iter().filter(|a| a.is_ready()).cloned().collect();
    if eligible.is_empty() {
        return Err(SkipReason::NoDownloadedAssets);
    }

    let pending: Vec<MediaAsset> = if skip_already_analyzed {
        eligible.iter().filter(|a| !a.has_analysis).cloned().collect()
    } else {
        eligible.clone()
    };
    if pending.is_empty() {
        return Err(SkipReason::NoUnanalyzedMedia);
    }

    Ok(Candidates { eligible, pending })
}

/// Runs every gate over a fully loaded input, in the order the orchestrator
/// applies them stage by stage.
#[cfg(test)]
fn evaluate_skip(
    credential_configured: bool,
    pool: &QualifiedPool,
    selected: &[MediaAsset],
    skip_already_analyzed: bool,
) -> Option<SkipReason> {
    check_credential(credential_configured)
        .and_then(|()| check_pool(pool))
        .and_then(|()| select_candidates(selected, skip_already_analyzed).map(|_| ()))
        .err()
}
