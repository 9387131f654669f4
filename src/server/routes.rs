use super::ChatService;
use crate::error::PdfChatError;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: Option<String>,
}

/// Error body in the `{"detail": ...}` shape clients expect
struct ApiError(PdfChatError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            PdfChatError::NotInitialized => (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string()),
            PdfChatError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            other => {
                log::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error processing request: {}", other),
                )
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

impl From<PdfChatError> for ApiError {
    fn from(e: PdfChatError) -> Self {
        Self(e)
    }
}

/// Build the router. An empty origin list allows any origin.
pub fn router(service: Arc<ChatService>, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/pdfs", get(handle_pdfs))
        .route("/chat", post(handle_chat))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(service)
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "PDF Chat API is running!" }))
}

async fn handle_health(State(service): State<Arc<ChatService>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "agent_ready": service.is_ready(),
    }))
}

async fn handle_pdfs(
    State(service): State<Arc<ChatService>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (processed, pending) = tokio::task::spawn_blocking(move || {
        let coordinator = service.coordinator();
        Ok::<_, PdfChatError>((
            coordinator.processed_documents()?,
            coordinator.pending_documents()?,
        ))
    })
    .await
    .map_err(|e| {
        PdfChatError::Io(std::io::Error::other(format!("listing task failed: {}", e)))
    })??;

    Ok(Json(serde_json::json!({
        "processed": processed,
        "pending": pending,
    })))
}

async fn handle_chat(
    State(service): State<Arc<ChatService>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let response = service.chat(&request.message).await?;
    Ok(Json(ChatResponse {
        response,
        session_id: request.session_id,
    }))
}
