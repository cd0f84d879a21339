// Threaded Discussion Server - posts, nested comments and live comment streams

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use threaded_discussion::{
    app_state::AppState,
    config::Config,
    discussion_interface::create_discussion_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    let app = create_discussion_router(state.clone());

    // Start server
    let addr = config.server_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Discussion server listening on http://{} ({} storage)", addr, config.storage);

    // Live comment streams never finish on their own, so the bus is closed
    // as part of the shutdown signal to let them drain.
    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown_state.close_subscriptions().await;
        })
        .await?;

    state.close_database().await;
    info!("Server stopped");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
}
