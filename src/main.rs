//! plate-sync server binary.

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use plate_sync::adapters::auth::JwtCredentialVerifier;
use plate_sync::adapters::store::InMemoryDocumentStore;
use plate_sync::adapters::websocket::{sync_router, SyncState};
use plate_sync::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    let store = Arc::new(InMemoryDocumentStore::new());
    let verifier = Arc::new(JwtCredentialVerifier::from_config(&config.auth));
    let state = SyncState::new(
        store.clone(),
        store,
        verifier,
        Vec::new(),
        (&config.sync).into(),
    );

    let app = sync_router(&config.server.sync_path)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        path = %config.server.sync_path,
        environment = ?config.server.environment,
        "plate-sync listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("plate-sync stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
