//! HTTP query surface.
//!
//! A single question-answering endpoint plus health/greeting routes:
//!
//! | Method | Path        | Description                                   |
//! |--------|-------------|-----------------------------------------------|
//! | `POST` | `/chat/ask` | Answer a question against the collection      |
//! | `GET`  | `/`         | Greeting, confirms the API is up              |
//! | `GET`  | `/health`   | Health check with the crate version           |
//!
//! # Error Contract
//!
//! `/chat/ask` never surfaces an internal failure to the transport layer:
//! every error is caught and reported as `{"error": "..."}` with HTTP 200,
//! so clients parse exactly one response shape. Callers who want real
//! status codes can wrap [`router`] with their own error layer.
//!
//! All origins, methods, and headers are permitted (CORS) to support
//! browser-based clients.

use anyhow::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::{self, EmbeddingBackend};
use crate::qa;
use crate::store;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    backend: Arc<dyn EmbeddingBackend>,
}

/// Build the serving state once at startup.
///
/// The collection must already exist: a missing collection fails here with
/// a pointer to `docqa rebuild`, instead of surfacing on the first request.
pub async fn build_state(config: &Config) -> Result<AppState> {
    let backend: Arc<dyn EmbeddingBackend> = Arc::from(embedding::create_backend(&config.embedding)?);
    let pool = store::open_collection(config).await?;
    Ok(AppState {
        config: Arc::new(config.clone()),
        pool,
        backend,
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/chat/ask", post(handle_ask))
        .layer(cors)
        .with_state(state)
}

/// Start the server and run until the process is terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let state = build_state(config).await?;
    let app = router(state);

    println!("docqa listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum AskResponse {
    Answer { answer: String },
    Error { error: String },
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Json<AskResponse> {
    match qa::answer_question(
        &state.config,
        &state.pool,
        state.backend.as_ref(),
        &request.question,
    )
    .await
    {
        Ok(answer) => Json(AskResponse::Answer { answer }),
        Err(e) => Json(AskResponse::Error {
            error: e.to_string(),
        }),
    }
}

#[derive(Serialize)]
struct RootResponse {
    message: String,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "docqa API is running".to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
