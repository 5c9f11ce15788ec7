//! REST API server for the answer pipeline
//!
//! Thin HTTP surface over `AnswerPipeline::answer`; no decision logic
//! lives here.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::pipeline::AnswerPipeline;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Anchor for relative time expressions; defaults to today (UTC).
    pub reference_date: Option<NaiveDate>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<AnswerPipeline>,
}

/// =============================
/// Endpoints
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn ask(
    State(state): State<ApiState>,
    Json(req): Json<AskRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Question must not be empty".to_string())),
        );
    }

    let reference_date = req
        .reference_date
        .unwrap_or_else(|| Utc::now().date_naive());

    info!("Received question: {}", req.question);

    match state.pipeline.answer(&req.question, reference_date).await {
        Ok(result) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "answer": result.answer_text,
                "category": result.resolved_category,
                "chunk_count": result.chunk_count,
                "sources": result
                    .chunks_used
                    .iter()
                    .map(|chunk| chunk.source.clone())
                    .collect::<Vec<_>>(),
            }))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Answer pipeline failed: {}", e))),
        ),
    }
}

pub fn create_router(pipeline: Arc<AnswerPipeline>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .layer(CorsLayer::permissive())
        .with_state(ApiState { pipeline })
}

pub async fn start_server(
    pipeline: Arc<AnswerPipeline>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
