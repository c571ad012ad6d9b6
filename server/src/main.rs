mod app;
mod config;
mod error;
mod render;
mod routes;
mod services;
mod state;
mod store;

use std::sync::atomic::Ordering;

use sqlx_postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;
use crate::store::Store;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let db_max_connections = config::db_max_connections();
            tracing::info!(db_max_connections, "Connecting to PostgreSQL...");
            let pool = match PgPoolOptions::new()
                .max_connections(db_max_connections)
                .connect(&database_url)
                .await
            {
                Ok(pool) => pool,
                Err(e) => {
                    tracing::error!(error = %e, "failed to connect to PostgreSQL");
                    return;
                }
            };
            if let Err(e) = store::run_migrations(&pool).await {
                tracing::error!(error = %e, "failed to run migrations");
                return;
            }
            tracing::info!("Database connected and migrations applied");
            Some(Store::new(pool))
        }
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL is not set; credential and snapshot persistence is disabled"
            );
            None
        }
    };

    let state = AppState::new(store);

    // Restore the credential and the last published snapshot so the render
    // path serves last-known-good data before the first refresh completes.
    if let Some(store) = state.store.clone() {
        match store.load_api_token().await {
            Ok(Some(token)) => *state.api_token.write().await = Some(token),
            Ok(None) => {}
            Err(e) => tracing::warn!("failed to load stored API token: {e}"),
        }
        match store.load_snapshot().await {
            Ok(Some(persisted)) => {
                let seq = persisted.seq;
                let entries = persisted.entries.len();
                state.next_seq.store(seq, Ordering::Relaxed);
                services::refresh::install_snapshot(&state, persisted).await;
                state.observability.record_snapshot_restored();
                tracing::info!(seq, entries, "restored persisted leaderboard snapshot");
            }
            Ok(None) => tracing::info!("no persisted leaderboard snapshot to restore"),
            Err(e) => tracing::warn!("failed to load persisted snapshot: {e}"),
        }
    }
    if state.api_token.read().await.is_none() {
        match config::initial_api_token() {
            Some(token) => {
                *state.api_token.write().await = Some(token);
                tracing::info!("using CTFD_API_TOKEN from the environment");
            }
            None => {
                tracing::warn!("no CTFd API token configured; refresh will fail until one is set");
            }
        }
    }

    // Startup refresh plus the daily cadence.
    tokio::spawn(services::refresh::run(state.clone()));

    let app = app::build_app(state);

    let addr = format!("0.0.0.0:{}", config::SERVER_PORT);
    tracing::info!("podium server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind TCP listener");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    tracing::info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
