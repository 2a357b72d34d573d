//! Read-side queries over `media_assets` and `media_analyses`.
//!
//! Counts here are always computed fresh from the tables; callers must not
//! derive them by adding to an earlier result.

use reelscope_core::{AssetLinkage, CoreError, MediaAsset};
use sqlx::PgPool;

use crate::DbError;

/// A row from `media_assets` joined with whether any analysis exists for it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MediaAssetRow {
    pub id: i64,
    pub job_id: i64,
    pub is_downloaded: bool,
    pub storage_pointer: Option<String>,
    pub client_snapshot_id: Option<i64>,
    pub competitor_snapshot_id: Option<i64>,
    pub post_id: Option<String>,
    pub has_analysis: bool,
}

impl MediaAssetRow {
    /// Converts the row into the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] when the row's linkage columns are dual or empty.
    pub fn into_asset(self) -> Result<MediaAsset, CoreError> {
        let linkage = AssetLinkage::from_parts(
            self.id,
            self.client_snapshot_id,
            self.competitor_snapshot_id,
            self.post_id,
        )?;
        Ok(MediaAsset {
            id: self.id,
            downloaded: self.is_downloaded,
            storage_pointer: self.storage_pointer,
            linkage,
            has_analysis: self.has_analysis,
        })
    }
}

/// Loads the assets with the given ids. Missing ids are silently absent and
/// the result order is unspecified.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_media_assets(pool: &PgPool, ids: &[i64]) -> Result<Vec<MediaAssetRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, MediaAssetRow>(
        "SELECT a.id, a.job_id, a.is_downloaded, a.storage_pointer, \
                a.client_snapshot_id, a.competitor_snapshot_id, a.post_id, \
                EXISTS (SELECT 1 FROM media_analyses m WHERE m.media_asset_id = a.id) \
                    AS has_analysis \
         FROM media_assets a \
         WHERE a.id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Counts how many of `ids` carry at least one analysis record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_analyzed_assets(pool: &PgPool, ids: &[i64]) -> Result<i64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT media_asset_id) FROM media_analyses \
         WHERE media_asset_id = ANY($1)",
    )
    .bind(ids)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Counts a job's downloaded assets that have a storage pointer.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_downloaded_assets(pool: &PgPool, job_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM media_assets \
         WHERE job_id = $1 AND is_downloaded \
           AND storage_pointer IS NOT NULL AND storage_pointer <> ''",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> MediaAssetRow {
        MediaAssetRow {
            id: 5,
            job_id: 1,
            is_downloaded: true,
            storage_pointer: Some("media/5.jpg".to_string()),
            client_snapshot_id: None,
            competitor_snapshot_id: Some(9),
            post_id: Some("p-5".to_string()),
            has_analysis: false,
        }
    }

    #[test]
    fn into_asset_maps_competitor_linkage() {
        let asset = row().into_asset().expect("valid row");
        assert_eq!(asset.linkage, AssetLinkage::CompetitorSnapshot(9));
        assert!(asset.is_ready());
    }

    #[test]
    fn into_asset_rejects_dual_linkage() {
        let mut r = row();
        r.client_snapshot_id = Some(3);
        assert_eq!(r.into_asset().unwrap_err(), CoreError::DualLinkage(5));
    }
}
