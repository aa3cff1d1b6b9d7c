mod app;
mod cache;
mod config;
mod routes;
mod services;
mod state;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::services::dataset_loader::{self, DatasetSources};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let sources = DatasetSources::from_env();
    tracing::info!(
        census = %sources.census_path.display(),
        boundaries = %sources.boundary_path.display(),
        simplify_tolerance = ?sources.boundary_options.simplify_tolerance,
        "Loading census and boundary data..."
    );
    let dataset = match tokio::task::spawn_blocking(move || dataset_loader::load(&sources)).await {
        Ok(Ok(dataset)) => dataset,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to load dataset");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "dataset loader task failed");
            return;
        }
    };
    tracing::info!(
        divisions = dataset.boundaries.len(),
        census_records = dataset.census.len(),
        years = dataset.catalog.years().count(),
        "Dataset loaded"
    );

    let state = AppState::new(dataset);
    tracing::info!(
        default_join = %state.map_config.default_join_mode,
        cache_entries = state.choropleth_cache.capacity(),
        "Choropleth settings"
    );

    let app = app::build_app(state, &config::static_dir());

    let addr = format!("0.0.0.0:{}", config::server_port());
    tracing::info!("Agricultural census dashboard listening on {addr}");

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
