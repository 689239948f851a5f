//! HTTP front end for retrieval and answering.
//!
//! `POST /chat` runs retrieval plus answer generation. Core calls are
//! synchronous and run on the blocking pool so model loads and index swaps
//! never stall the async workers.

use crate::answer::AnswerGenerator;
use crate::error::RagError;
use crate::retrieve::{RetrievalResult, Retriever};
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    retriever: Arc<Retriever>,
    answerer: Arc<dyn AnswerGenerator>,
    default_top_k: usize,
    default_model: String,
}

impl AppState {
    pub fn new(retriever: Arc<Retriever>, answerer: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            retriever,
            answerer,
            default_top_k: 5,
            default_model: crate::vector::EmbeddingModelName::AllMiniLmL6V2.to_string(),
        }
    }

    /// Values used when a request omits `top_k` or `embed_model`.
    #[must_use]
    pub fn with_defaults(mut self, top_k: usize, model: impl Into<String>) -> Self {
        self.default_top_k = top_k;
        self.default_model = model.into();
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// Signed so that negative values reach validation instead of failing
    /// deserialization.
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub embed_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub retrieved: Vec<RetrievalResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub suggestions: Vec<String>,
}

/// Handler failure rendered as a JSON error body.
#[derive(Debug)]
pub enum ApiError {
    Rag(RagError),
    Internal(String),
}

impl From<RagError> for ApiError {
    fn from(error: RagError) -> Self {
        Self::Rag(error)
    }
}

/// HTTP status for a core error.
pub fn status_for(error: &RagError) -> StatusCode {
    match error {
        RagError::InvalidArgument { .. }
        | RagError::ModelNotFound { .. }
        | RagError::ModelMismatch { .. } => StatusCode::BAD_REQUEST,
        RagError::IndexNotBuilt { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RagError::Generation { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Rag(error) => {
                let status = status_for(&error);
                if status.is_server_error() {
                    tracing::error!(target: "http", code = error.status_code(), "{error}");
                } else {
                    tracing::debug!(target: "http", code = error.status_code(), "{error}");
                }
                let body = ErrorBody {
                    error: error.to_string(),
                    code: error.status_code().to_string(),
                    suggestions: error
                        .recovery_suggestions()
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                };
                (status, body)
            }
            ApiError::Internal(reason) => {
                tracing::error!(target: "http", "{reason}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: reason,
                        code: "INTERNAL_ERROR".to_string(),
                        suggestions: Vec::new(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "support-rag is running. POST /chat with {\"query\": \"...\"}"
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let top_k = match request.top_k {
        None => state.default_top_k,
        Some(k) if k <= 0 => {
            return Err(RagError::invalid_argument(format!("top_k must be positive, got {k}")).into());
        }
        Some(k) => usize::try_from(k)
            .map_err(|_| RagError::invalid_argument(format!("top_k {k} is out of range")))?,
    };
    let model = request.embed_model.unwrap_or(state.default_model);
    let query = request.query;

    let retriever = Arc::clone(&state.retriever);
    let answerer = Arc::clone(&state.answerer);
    let response = tokio::task::spawn_blocking(move || -> Result<ChatResponse, RagError> {
        let retrieved = retriever.retrieve(&query, &model, top_k)?;
        let answer = answerer.generate(&query, &retrieved)?;
        Ok(ChatResponse { answer, retrieved })
    })
    .await
    .map_err(|e| ApiError::Internal(format!("chat task failed: {e}")))??;

    Ok(Json(response))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(target: "http", origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Routes with CORS applied.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "http", "failed to listen for ctrl+c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!(target: "http", "received shutdown signal");
}

/// Bind `bind` and serve until Ctrl+C.
pub async fn serve(state: AppState, allowed_origins: &[String], bind: &str) -> anyhow::Result<()> {
    let app = router(state, allowed_origins);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    tracing::info!(target: "http", "listening on http://{bind}");
    eprintln!("support-rag listening on http://{bind}");
    eprintln!("Chat endpoint: http://{bind}/chat");
    eprintln!("Health check: http://{bind}/health");
    eprintln!("Press Ctrl+C to stop the server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    eprintln!("HTTP server shut down gracefully");
    Ok(())
}
