// ABOUTME: HTTP trigger surface: one endpoint per stage plus a health check
// ABOUTME: Pipeline failures map to 500 with {"ok": false, "error": ...}
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use remedy_core::{RemedyError, Stage};
use remedy_pipeline::VerificationPipeline;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<VerificationPipeline>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Remedy(#[from] RemedyError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "run failed");
        let body = Json(json!({
            "ok": false,
            "error": self.to_string(),
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cpu/fix-test", post(fix_test))
        .route("/cpu/promote-prod", post(promote_prod))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn fix_test(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    run_stage(&state, Stage::Test).await
}

async fn promote_prod(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    run_stage(&state, Stage::Prod).await
}

async fn run_stage(state: &AppState, stage: Stage) -> ApiResult<Json<Value>> {
    let result = state.pipeline.run(stage).await?;
    let meta = serde_json::to_value(&result).map_err(RemedyError::from)?;
    Ok(Json(json!({
        "ok": true,
        "stage": stage,
        "meta": meta,
    })))
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Remedy trigger server listening on {}", listener.local_addr()?);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Remedy trigger server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
    }
}
