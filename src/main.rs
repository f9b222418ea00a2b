//! Medical Code Resolver - Main Entry Point
//!
//! Serves RxNorm and ICD-10 resolution over HTTP.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medcode::config::Config;
use medcode::handlers::{self, AppState};
use medcode::services::ResolutionOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "medcode=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    info!("Starting Medical Code Resolver v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Completion model: {} (temperature {})",
        config.completion_model, config.completion_temperature
    );
    info!(
        "Embedding model: {} ({}D)",
        config.embedding_model, config.embedding_dimension
    );

    let orchestrator = match ResolutionOrchestrator::from_config(&config) {
        Ok(orch) => Arc::new(orch),
        Err(e) => {
            error!("Failed to initialize resolver: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = orchestrator.example_store().load_snapshot().await {
        warn!("Could not restore example snapshot: {:#}", e);
    }

    let state = Arc::new(AppState {
        orchestrator,
        config: config.clone(),
    });

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/resolve/medication", post(handlers::resolve_medication))
        .route("/resolve/condition", post(handlers::resolve_condition))
        .route("/resolve/batch", post(handlers::resolve_batch))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = format!("{}:{}", config.host, config.port);
    info!("Resolver listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
