//! Local status endpoint: `GET /status`, `POST /disconnect`, plus profile
//! listing and manual switching for scripts.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::RotatorError;
use crate::service::VpnService;
use crate::status::ConnectionSnapshot;

pub type AppState = Arc<VpnService>;

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub profile: String,
}

/// Error body for every failing route: `{ "error": "..." }`.
pub struct ApiError(RotatorError);

impl From<RotatorError> for ApiError {
    fn from(e: RotatorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RotatorError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
            RotatorError::ToolNotInstalled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/disconnect", post(disconnect_handler))
        .route("/profiles", get(profiles_handler))
        .route("/switch", post(switch_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn status_handler(State(service): State<AppState>) -> Json<ConnectionSnapshot> {
    Json(service.snapshot().await)
}

async fn disconnect_handler(State(service): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    service.disconnect().await?;
    Ok(Json(json!({ "success": true })))
}

async fn profiles_handler(State(service): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let names = service.profiles()?.into_iter().map(|p| p.name).collect();
    Ok(Json(names))
}

async fn switch_handler(
    State(service): State<AppState>,
    Json(request): Json<SwitchRequest>,
) -> Result<Json<ConnectionSnapshot>, ApiError> {
    service.switch_to(&request.profile).await?;
    Ok(Json(service.snapshot().await))
}
