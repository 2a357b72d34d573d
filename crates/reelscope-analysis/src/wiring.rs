//! Builds a production [`Orchestrator`] from application config.

use std::sync::Arc;

use reelscope_core::AppConfig;
use sqlx::PgPool;

use crate::error::CollaboratorError;
use crate::http::{HttpAssetAnalyzer, HttpPoolProvider, HttpSettings};
use crate::orchestrator::{Collaborators, Orchestrator};
use crate::pg::{PgEventEmitter, PgMediaStore, PgRunLedger};

/// Wires HTTP collaborators and Postgres stores into an orchestrator.
///
/// A missing AI credential still yields a working orchestrator; every pass it
/// runs is skipped as `openai_not_configured`.
///
/// # Errors
///
/// Returns [`CollaboratorError`] if a service URL is invalid or an HTTP
/// client cannot be built.
pub fn build_orchestrator(pool: &PgPool, config: &AppConfig) -> Result<Orchestrator, CollaboratorError> {
    let http = HttpSettings::from_app_config(config);
    let api_key = config.openai_api_key.as_deref().unwrap_or_default();

    let collaborators = Collaborators {
        pool: Arc::new(HttpPoolProvider::new(&config.pool_service_url, http)?),
        analyzer: Arc::new(HttpAssetAnalyzer::new(&config.analyzer_url, api_key, http)?),
        store: Arc::new(PgMediaStore::new(pool.clone())),
        ledger: Arc::new(PgRunLedger::new(pool.clone())),
        events: Arc::new(PgEventEmitter::new(pool.clone())),
    };

    Ok(Orchestrator::new(collaborators, config.has_ai_credential()))
}
