//! GUAC tool plane: GraphQL transport, typed graph operations, and the
//! function-tool surface (registry, dispatcher, known-query) exposed to
//! the LLM.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

pub mod model;
pub mod schema;
pub mod subject;
pub mod tools;

pub use tools::{ToolDescriptor, ToolRegistry};

/// GUAC tool-plane errors.
///
/// `is_transient` separates backend reachability failures (worth a retry,
/// and ultimately the graceful-apology path) from tool-level failures the
/// agent records as a failed step and keeps going.
#[derive(Error, Debug)]
pub enum GuacError {
    #[error("GUAC endpoint cannot be empty")]
    EmptyEndpoint,

    #[error("GUAC request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GUAC returned errors: {0}")]
    GraphQl(String),

    #[error("unexpected GUAC payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown functionName: {0}")]
    UnknownFunction(String),

    #[error("failed to unmarshal JSON into filter type {filter}: {source}")]
    Decode {
        filter: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    DataShape(String),
}

impl GuacError {
    /// Whether the error means the backend could not be reached or answered
    /// garbage, as opposed to a bad tool call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GuacError::Transport(_) | GuacError::GraphQl(_) | GuacError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GuacError>;

/// Shared GraphQL client for the GUAC backend. Cheap to clone; the inner
/// reqwest client carries the connection pool.
#[derive(Debug, Clone)]
pub struct GuacClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GuacClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(GuacError::EmptyEndpoint);
        }

        info!(%endpoint, "Creating GUAC client");
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }

    /// Execute one GraphQL document and return the `data` payload.
    pub(crate) async fn execute(&self, document: &str, variables: Value) -> Result<Value> {
        debug!(endpoint = %self.endpoint, "Executing GraphQL query");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            return Err(GuacError::GraphQl(format!(
                "GUAC returned HTTP {status}"
            )));
        }

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect();
                return Err(GuacError::GraphQl(messages.join("; ")));
            }
        }

        payload
            .get("data")
            .cloned()
            .ok_or_else(|| GuacError::GraphQl("response carried no data".to_string()))
    }
}
