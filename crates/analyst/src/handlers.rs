//! Request handlers for the analyze API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

use analyst_agent::{AnalysisRequest, Analyzer};
use analyst_provider::Provider;

pub struct AppState<P> {
    pub analyzer: Arc<Analyzer<P>>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            analyzer: Arc::clone(&self.analyzer),
        }
    }
}

/// POST /api/v1/analyze
///
/// The body is decoded by hand so any malformed JSON is a plain 400.
pub async fn analyze<P: Provider>(
    State(state): State<AppState<P>>,
    body: Bytes,
) -> Response {
    let req: AnalysisRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid request: {err}")).into_response()
        }
    };

    if req.query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid request: query is required".to_string(),
        )
            .into_response();
    }
    if !(0.0..=2.0).contains(&req.options.temperature) {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid request: temperature must be in [0, 2]".to_string(),
        )
            .into_response();
    }

    debug!(query = %req.query, "Received analysis request");

    match state.analyzer.analyze(req).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            error!(error = %err, "Analysis request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// GET /api/v1/health
pub async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}
