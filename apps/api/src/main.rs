mod auth;
mod config;
mod errors;
mod extract;
mod flows;
mod llm_client;
mod routes;
mod state;
mod subscriptions;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::flows::catalog::FlowCatalog;
use crate::flows::engine::FlowEngine;
use crate::llm_client::GeminiClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::subscriptions::{
    spawn_error_listener, ErrorPublisher, InMemoryDocumentSource, Subscriber,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AgriSense API v{}", env!("CARGO_PKG_VERSION"));

    // Validate every flow declaration before accepting traffic
    let catalog = FlowCatalog::load()?;
    info!("Flow catalog loaded ({} flows)", catalog.iter().count());

    // Initialize generation client
    let gemini = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_api_url.clone(),
        config.gemini_model.clone(),
        config.generation_timeout,
    )?;
    info!(
        "Generation client initialized (model: {}, timeout: {:?})",
        gemini.model(),
        config.generation_timeout
    );

    let engine = FlowEngine::new(Arc::new(gemini), Arc::new(catalog));

    // Permission errors from document subscriptions are logged by one listener
    let errors = ErrorPublisher::default();
    spawn_error_listener(&errors);
    let subscriber = Subscriber::new(Arc::new(InMemoryDocumentSource::default()), errors);

    let state = AppState {
        engine,
        config: config.clone(),
        subscriber,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the dashboard host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
