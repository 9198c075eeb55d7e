use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use rampart_runtime::{BackendKind, GuardrailsOrchestrator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::types::*;

/// Messages above this size are rejected with 413
pub const MAX_MESSAGE_LENGTH: usize = 50_000;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<GuardrailsOrchestrator>,
    pub allowed_origins: Vec<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Create the Axum router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = if state.allowed_origins.is_empty() {
        // Permissive for development
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .allowed_origins
            .iter()
            .filter_map(|s| match s.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    warn!(origin = %s, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/config", get(get_config).post(update_config))
        .route("/audit/{session_id}/{request_id}", get(audit_trail))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the gateway server
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let router = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!(addr = %addr, "Starting gateway server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections...");
}

// --- Handlers ---

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.orchestrator.status().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        guardrails_backend: status.guardrails_backend,
        llm_provider: status.llm_provider,
        llm_model: status.llm_model,
        dynamic_rules: status.dynamic_rules_enabled,
    })
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.message.len() > MAX_MESSAGE_LENGTH {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Message exceeds maximum length of {} bytes", MAX_MESSAGE_LENGTH),
        ));
    }
    if req.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Message must not be empty"));
    }

    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(session_id = %session_id, profile = ?req.agent_profile, "Chat request received");
    let outcome = state
        .orchestrator
        .handle_turn(&session_id, &req.message, req.agent_profile.as_deref())
        .await;

    Ok(Json(ChatResponse::from_outcome(session_id, outcome)))
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(state.orchestrator.status().await.into())
}

async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let orchestrator = &state.orchestrator;

    if let Some(backend) = &update.guardrails_backend {
        let kind: BackendKind = backend
            .parse()
            .map_err(|e: anyhow::Error| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
        orchestrator
            .switch_backend(kind)
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;
    }

    if update.llm_provider.is_some() || update.llm_model.is_some() {
        let current = orchestrator.status().await;
        let provider = update.llm_provider.unwrap_or(current.llm_provider);
        let model = update.llm_model.unwrap_or(current.llm_model);
        orchestrator
            .switch_model(&provider, &model)
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("{:#}", e)))?;
    }

    Ok(Json(orchestrator.status().await.into()))
}

async fn audit_trail(
    State(state): State<AppState>,
    Path((session_id, request_id)): Path<(String, String)>,
) -> Json<AuditResponse> {
    let calls = state
        .orchestrator
        .proxy()
        .get_audit_trail(&session_id, &request_id);
    Json(AuditResponse {
        session_id,
        request_id,
        calls,
    })
}
