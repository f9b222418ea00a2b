//! HTTP handlers module.
//!
//! Thin JSON surface over [`ResolutionOrchestrator`]. Resolution never fails
//! at this layer; the only error response is for a blank phrase.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ResolveError;
use crate::models::{
    BatchResolveRequest, BatchResolveResponse, CodeType, ErrorResponse, HealthResponse,
    ResolveRequest, ResolveResponse,
};
use crate::services::ResolutionOrchestrator;

/// Application state shared across handlers.
pub struct AppState {
    pub orchestrator: Arc<ResolutionOrchestrator>,
    pub config: Config,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

impl From<ResolveError> for HandlerError {
    fn from(err: ResolveError) -> Self {
        let status = match err {
            ResolveError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                code: Some(err.kind().code().to_string()),
                error: err.to_string(),
            }),
        )
    }
}

fn require_text(text: &str) -> Result<(), ResolveError> {
    if text.trim().is_empty() {
        return Err(ResolveError::InvalidInput("text must not be blank".to_string()));
    }
    Ok(())
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (medication_examples, condition_examples) = state.orchestrator.example_store().counts();

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "medcode-resolver".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        completion_model: state.config.completion_model.clone(),
        embedding_model: state.config.embedding_model.clone(),
        medication_examples,
        condition_examples,
        cache_entries: state.orchestrator.llm().cache().map(|c| c.len()),
        endpoints: vec![
            "/health".to_string(),
            "/resolve/medication".to_string(),
            "/resolve/condition".to_string(),
            "/resolve/batch".to_string(),
        ],
    })
}

async fn resolve_one(
    state: &AppState,
    request: ResolveRequest,
    code_type: CodeType,
) -> Result<Json<ResolveResponse>, HandlerError> {
    if let Err(e) = require_text(&request.text) {
        warn!("Rejected {} request: {}", code_type, e);
        return Err(e.into());
    }
    info!("Resolving {}: {:?}", code_type, request.text);
    let resolution = state.orchestrator.resolve(&request.text, code_type).await;
    Ok(Json(resolution.into()))
}

/// Resolve a medication mention.
pub async fn resolve_medication(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, HandlerError> {
    resolve_one(&state, request, CodeType::Medication).await
}

/// Resolve a condition name.
pub async fn resolve_condition(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, HandlerError> {
    resolve_one(&state, request, CodeType::Condition).await
}

/// Resolve several phrases of one type concurrently.
pub async fn resolve_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchResolveRequest>,
) -> Json<BatchResolveResponse> {
    info!(
        "Resolving batch of {} {} texts",
        request.texts.len(),
        request.code_type
    );

    let results: Vec<ResolveResponse> = state
        .orchestrator
        .resolve_many(&request.texts, request.code_type)
        .await
        .into_iter()
        .map(ResolveResponse::from)
        .collect();

    Json(BatchResolveResponse {
        count: results.len(),
        results,
    })
}
