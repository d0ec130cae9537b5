use gateway_service::{api, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    gateway_service::init_logging(&config.logging.level);
    gateway_service::init_metrics();

    tracing::info!("Starting search gateway");
    tracing::info!("Loaded configuration: {:?}", config);
    tracing::info!(
        "Looking for indices in: {}",
        config.paths.project_root.display()
    );

    let state = Arc::new(AppState::new(config));
    state.search.current().await;

    let app = api::router(Arc::clone(&state))?;
    let listener = TcpListener::bind((
        state.config.server.host.as_str(),
        state.config.server.port,
    ))
    .await?;
    tracing::info!("Search gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let cancelled = state.builds.cancel_all();
    if cancelled > 0 {
        tracing::info!("Cancelled {} index builds on shutdown", cancelled);
        if !state.builds.wait_idle(Duration::from_secs(5)).await {
            tracing::warn!("Some index builds did not stop before shutdown");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down");
}
