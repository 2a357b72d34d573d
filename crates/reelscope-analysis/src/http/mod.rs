//! HTTP adapters for the pool provider and asset analyzer services.

mod analyzer_client;
mod pool_client;
pub(crate) mod retry;

use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CollaboratorError;

pub use analyzer_client::HttpAssetAnalyzer;
pub use pool_client::HttpPoolProvider;

const USER_AGENT: &str = "reelscope/0.1 (content-analysis)";

/// Transport settings shared by both collaborator clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_retries: 2,
            backoff_base_ms: 1_000,
        }
    }
}

impl HttpSettings {
    #[must_use]
    pub fn from_app_config(config: &reelscope_core::AppConfig) -> Self {
        Self {
            timeout_secs: config.collaborator_timeout_secs,
            max_retries: config.collaborator_max_retries,
            ..Self::default()
        }
    }
}

fn build_client(settings: &HttpSettings) -> Result<Client, CollaboratorError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()?)
}

/// Parses `base_url` so that relative joins append to its path.
fn parse_base_url(base_url: &str) -> Result<Url, CollaboratorError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| CollaboratorError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

fn join(base: &Url, path: &str) -> Result<Url, CollaboratorError> {
    base.join(path).map_err(|e| CollaboratorError::InvalidUrl {
        url: format!("{base}{path}"),
        reason: e.to_string(),
    })
}

/// POSTs `body` as JSON and decodes a JSON response.
///
/// Non-2xx responses become [`CollaboratorError::Status`] with the body text.
async fn post_json<B, R>(
    client: &Client,
    service: &'static str,
    url: &Url,
    body: &B,
    bearer: Option<&str>,
) -> Result<R, CollaboratorError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut request = client.post(url.clone()).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(CollaboratorError::Status {
            service,
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text).map_err(|e| CollaboratorError::Deserialize {
        context: format!("{service} {}", url.path()),
        source: e,
    })
}
