mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
    scheduler::{CycleScheduler, PassProcessor, PgJobSource},
};

/// How long shutdown waits for an in-flight scheduler cycle to finish.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = reelscope_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = reelscope_db::PoolConfig::from_app_config(&config);
    let pool = reelscope_db::connect_pool(&config.database_url, pool_config).await?;
    reelscope_db::run_migrations(&pool).await?;

    if !config.has_ai_credential() {
        tracing::warn!("OPENAI_API_KEY missing or malformed; passes will be skipped");
    }
    let orchestrator = Arc::new(reelscope_analysis::build_orchestrator(&pool, &config)?);

    let scheduler = CycleScheduler::spawn(
        Arc::new(PgJobSource::new(pool.clone())),
        Arc::new(PassProcessor::new(
            Arc::clone(&orchestrator),
            config.analysis,
        )),
        config.scheduler,
    );
    if config.scheduler.enabled {
        scheduler.start(config.scheduler).await?;
    } else {
        tracing::info!("scheduler disabled by configuration");
    }

    let auth = AuthState::from_env(matches!(
        config.env,
        reelscope_core::Environment::Development
    ))?;
    let state = AppState {
        pool,
        scheduler: scheduler.clone(),
        orchestrator,
        analysis: config.analysis,
        backfill: config.backfill,
        scheduler_defaults: config.scheduler,
    };
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = scheduler.stop().await {
        tracing::warn!(error = %e, "scheduler stop failed during shutdown");
    }
    match scheduler.wait_idle(SHUTDOWN_DRAIN_TIMEOUT).await {
        Ok(true) => tracing::info!("scheduler idle; shutting down"),
        Ok(false) => tracing::warn!(
            timeout_secs = SHUTDOWN_DRAIN_TIMEOUT.as_secs(),
            "scheduler: cycle still running at shutdown deadline; its run may stay open"
        ),
        Err(e) => tracing::warn!(error = %e, "scheduler: could not wait for in-flight cycle"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
