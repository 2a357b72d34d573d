use async_trait::async_trait;
use reelscope_core::{AnalysisContext, MediaAsset};
use reqwest::{Client, Url};
use serde::Serialize;

use super::retry::retry_with_backoff;
use super::{build_client, join, parse_base_url, post_json, HttpSettings};
use crate::error::CollaboratorError;
use crate::ports::{AnalyzerVerdict, AssetAnalyzer};

const SERVICE: &str = "analyzer";

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    asset: &'a MediaAsset,
    context: &'a AnalysisContext,
}

/// Client for the asset analyzer: `POST {base}/analyze`, authenticated with
/// the AI credential as a bearer token.
pub struct HttpAssetAnalyzer {
    client: Client,
    url: Url,
    api_key: String,
    settings: HttpSettings,
}

impl HttpAssetAnalyzer {
    /// # Errors
    ///
    /// Returns [`CollaboratorError::InvalidUrl`] for an unparseable base URL or
    /// [`CollaboratorError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: &str,
        settings: HttpSettings,
    ) -> Result<Self, CollaboratorError> {
        let base = parse_base_url(base_url)?;
        Ok(Self {
            client: build_client(&settings)?,
            url: join(&base, "analyze")?,
            api_key: api_key.to_owned(),
            settings,
        })
    }
}

#[async_trait]
impl AssetAnalyzer for HttpAssetAnalyzer {
    async fn analyze(
        &self,
        asset: &MediaAsset,
        context: &AnalysisContext,
    ) -> Result<AnalyzerVerdict, CollaboratorError> {
        let body = AnalyzeRequest { asset, context };
        retry_with_backoff(
            SERVICE,
            self.settings.max_retries,
            self.settings.backoff_base_ms,
            || post_json(&self.client, SERVICE, &self.url, &body, Some(&self.api_key)),
        )
        .await
    }
}
