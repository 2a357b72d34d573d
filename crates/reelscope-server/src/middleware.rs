//! Request ids, bearer auth and per-caller rate limiting for the operator API.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;
/// Bucket used for callers that present no bearer token (development only).
const ANONYMOUS_CALLER: &str = "anonymous";

/// Request id for the current request, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Accepted bearer tokens. An empty set with `enabled == false` lets every
/// request through.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Reads `REELSCOPE_API_KEYS` (comma-separated bearer tokens).
    ///
    /// # Errors
    ///
    /// Fails outside development when no key is configured.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("REELSCOPE_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// Parses a comma-separated key list. Blank entries are ignored.
    ///
    /// # Errors
    ///
    /// Fails outside development when the list holds no key.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        match (keys.is_empty(), is_development) {
            (false, _) => Ok(Self {
                api_keys: Arc::new(keys),
                enabled: true,
            }),
            (true, true) => {
                tracing::warn!("auth: REELSCOPE_API_KEYS empty; operator API is open in development");
                Ok(Self {
                    api_keys: Arc::new(HashSet::new()),
                    enabled: false,
                })
            }
            (true, false) => anyhow::bail!(
                "REELSCOPE_API_KEYS must list at least one bearer token outside development"
            ),
        }
    }

    /// Compares against every key in constant time so response timing does
    /// not reveal how much of a token matched.
    fn allows(&self, token: &str) -> bool {
        self.api_keys.iter().fold(false, |found, key| {
            found | bool::from(key.as_bytes().ct_eq(token.as_bytes()))
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: usize,
}

/// Fixed-window request budget, tracked separately per bearer token so one
/// noisy operator script cannot starve the others.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    callers: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            callers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records one request for `caller`; `false` once its budget for the
    /// current window is spent.
    async fn admit(&self, caller: &str) -> bool {
        let now = Instant::now();
        let mut callers = self.callers.lock().await;

        // Drop windows that have expired so the map stays bounded by the
        // number of recently active callers.
        callers.retain(|_, w| now.duration_since(w.started_at) < self.window);

        let window = callers.entry(caller.to_owned()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

/// Takes the caller's `x-request-id` when it is short printable ASCII,
/// otherwise assigns a fresh UUID. The id is exposed as a [`RequestId`]
/// extension and echoed on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| is_usable_request_id(v))
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    res
}

fn is_usable_request_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

fn current_request_id(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |r| r.0.clone())
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => {
            tracing::warn!(path = %req.uri().path(), "auth: rejected request");
            ApiError::new(
                current_request_id(&req),
                "unauthorized",
                "missing or invalid bearer token",
            )
            .into_response()
        }
    }
}

pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let caller = extract_bearer_token(req.headers().get(AUTHORIZATION))
        .unwrap_or(ANONYMOUS_CALLER)
        .to_owned();

    if !rate_limit.admit(&caller).await {
        tracing::warn!(path = %req.uri().path(), "rate limit: request rejected");
        return ApiError::new(current_request_id(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_is_extracted_and_trimmed() {
        let header = HeaderValue::from_static("Bearer  test-token ");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
    }

    #[test]
    fn non_bearer_and_blank_tokens_are_ignored() {
        let basic = HeaderValue::from_static("Basic abc123");
        let blank = HeaderValue::from_static("Bearer   ");
        assert_eq!(extract_bearer_token(Some(&basic)), None);
        assert_eq!(extract_bearer_token(Some(&blank)), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn auth_state_disables_when_no_keys_in_dev() {
        let state = AuthState::from_keys("", true).expect("dev should allow missing keys");
        assert!(!state.enabled);
    }

    #[test]
    fn auth_state_requires_keys_outside_dev() {
        assert!(AuthState::from_keys(" , ", false).is_err());
    }

    #[test]
    fn auth_state_trims_and_splits_keys() {
        let state = AuthState::from_keys(" alpha ,beta,,", false).expect("keys");
        assert!(state.enabled);
        assert!(state.allows("alpha"));
        assert!(state.allows("beta"));
        assert!(!state.allows("gamma"));
    }

    #[test]
    fn auth_state_rejects_prefix_of_a_key() {
        let state = AuthState::from_keys("alpha-long-key", false).expect("keys");
        assert!(!state.allows("alpha"));
        assert!(!state.allows("alpha-long-key-extra"));
    }

    #[test]
    fn request_id_must_be_short_printable_ascii() {
        assert!(is_usable_request_id("req-123"));
        assert!(!is_usable_request_id(""));
        assert!(!is_usable_request_id("has space"));
        assert!(!is_usable_request_id(&"x".repeat(MAX_REQUEST_ID_LEN + 1)));
    }

    #[tokio::test]
    async fn rate_limit_budgets_are_per_caller() {
        let limiter = RateLimitState::new(2, Duration::from_secs(60));
        assert!(limiter.admit("alpha").await);
        assert!(limiter.admit("alpha").await);
        assert!(!limiter.admit("alpha").await);
        assert!(limiter.admit("beta").await);
    }

    #[tokio::test]
    async fn rate_limit_window_resets() {
        let limiter = RateLimitState::new(1, Duration::from_millis(20));
        assert!(limiter.admit("alpha").await);
        assert!(!limiter.admit("alpha").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.admit("alpha").await);
    }
}
