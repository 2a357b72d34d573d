use reelscope_core::JobId;
use thiserror::Error;

/// Failure talking to an external collaborator service.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected contract.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failure reading or writing durable state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] reelscope_db::DbError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Setup-phase failures that abort a pass. Everything after setup is
/// absorbed into the run record instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("qualified pool fetch failed: {0}")]
    PoolFetch(#[source] CollaboratorError),

    #[error("media store error: {0}")]
    Store(#[from] StoreError),

    /// Another pass for the same job is still running in this process. No
    /// run was opened for the rejected request.
    #[error("a pass for job {0} is already running")]
    JobBusy(JobId),
}
