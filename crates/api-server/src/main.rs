//! API Server for the session runner
//!
//! Exposes runs as an HTTP resource, probes the agent service and receives
//! GitHub webhooks. Poll loops run inside this process.

mod config;
mod routes;
mod signature;
mod state;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env file; real environment variables take precedence
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config::default_filter(&config::log_level()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("Using data directory: {:?}", config.data_dir);
    tracing::info!("Agent service: {}", config.agent.base_url);
    if config.webhook_secret.is_none() {
        tracing::warn!("GITHUB_WEBHOOK_SECRET is not set, webhook signatures will not be verified");
    }

    let app_state = AppState::new(&config)
        .await
        .context("Failed to initialize application state")?;

    if config.resume_polling {
        match app_state.orchestrator().resume_in_flight().await {
            Ok(n) => tracing::info!("Resumed {} poll loops", n),
            Err(e) => tracing::error!("Failed to resume poll loops: {}", e),
        }
    }

    let app = routes::router(app_state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!("REST API listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.orchestrator().shutdown().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
