use async_trait::async_trait;
use reelscope_core::{JobId, PoolRequest, QualifiedPool};
use reqwest::{Client, Url};

use super::retry::retry_with_backoff;
use super::{build_client, join, parse_base_url, post_json, HttpSettings};
use crate::error::CollaboratorError;
use crate::ports::PoolProvider;

const SERVICE: &str = "pool";

/// Client for the qualified pool service:
/// `POST {base}/jobs/{job_id}/qualified-pool`.
pub struct HttpPoolProvider {
    client: Client,
    base_url: Url,
    settings: HttpSettings,
}

impl HttpPoolProvider {
    /// # Errors
    ///
    /// Returns [`CollaboratorError::InvalidUrl`] for an unparseable base URL or
    /// [`CollaboratorError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, settings: HttpSettings) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(&settings)?,
            base_url: parse_base_url(base_url)?,
            settings,
        })
    }
}

#[async_trait]
impl PoolProvider for HttpPoolProvider {
    async fn fetch_pool(
        &self,
        job_id: JobId,
        request: &PoolRequest,
    ) -> Result<QualifiedPool, CollaboratorError> {
        let url = join(&self.base_url, &format!("jobs/{job_id}/qualified-pool"))?;
        let pool: QualifiedPool = retry_with_backoff(
            SERVICE,
            self.settings.max_retries,
            self.settings.backoff_base_ms,
            || post_json(&self.client, SERVICE, &url, request, None),
        )
        .await?;
        tracing::debug!(
            job_id,
            posts = pool.posts.len(),
            dropped_no_media = pool.summary.dropped_no_media,
            "pool: fetched qualified pool"
        );
        Ok(pool)
    }
}
