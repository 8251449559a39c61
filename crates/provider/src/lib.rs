//! LLM provider abstraction.
//!
//! The agent loop talks to an abstract chat-completion [`Provider`]; the
//! concrete OpenAI/Azure implementation lives in [`openai`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod openai;

pub use openai::OpenAiProvider;

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("malformed provider payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider rejected request: {0}")]
    Api(String),

    #[error("provider returned no choices")]
    InvalidResponse,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// A single chat message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Function schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A function call requested by the model. `arguments` is the verbatim
/// JSON text produced by the model, not yet validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One completed chat turn. When the model both wrote text and requested a
/// call, the call wins; callers must check `function_call` first.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub function_call: Option<FunctionCall>,
    pub usage: Usage,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            function_call: None,
            usage: Usage::default(),
        }
    }

    pub fn call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            function_call: Some(FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
            usage: Usage::default(),
        }
    }
}

/// Per-call options. Unset fields fall back to the provider's configured
/// defaults (`model`) or the wire defaults (`max_tokens` 1000,
/// `temperature` 0).
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tools: Vec<Tool>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Run one chat completion over the given system and user messages.
    async fn analyze(
        &self,
        system_messages: &[String],
        user_messages: &[String],
        options: AnalyzeOptions,
    ) -> Result<LlmResponse>;
}
