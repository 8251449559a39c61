//! OpenAI and Azure OpenAI chat-completion provider.

use analyst_config::{OpenAiConfig, ProviderKind};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::{
    AnalyzeOptions, FunctionCall, LlmResponse, Message, Provider, ProviderError, Result, Usage,
};

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.0;

pub struct OpenAiProvider {
    client: Client,
    cfg: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(cfg: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            cfg,
        }
    }

    fn completion_url(&self) -> String {
        match self.cfg.provider {
            ProviderKind::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.cfg.api_endpoint.trim_end_matches('/'),
                self.cfg.deployment_name,
                self.cfg.api_version
            ),
            ProviderKind::OpenAi => format!(
                "{}/chat/completions",
                self.cfg.api_endpoint.trim_end_matches('/')
            ),
        }
    }

    fn build_request(
        &self,
        system_messages: &[String],
        user_messages: &[String],
        options: &AnalyzeOptions,
    ) -> serde_json::Value {
        let mut messages: Vec<Message> = Vec::new();
        messages.extend(system_messages.iter().map(Message::system));
        messages.extend(user_messages.iter().map(Message::user));

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.cfg.model.clone());

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        });

        if !options.tools.is_empty() {
            body["tools"] = json!(options.tools);
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<LlmResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or(ProviderError::InvalidResponse)?;
        let message = &choice["message"];

        let usage = if let Some(usage) = json["usage"].as_object() {
            Usage {
                prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: usage["total_tokens"].as_u64().unwrap_or(0) as u32,
            }
        } else {
            Usage::default()
        };

        // Arguments stay as the raw text the model produced; validation
        // against the tool schema happens at dispatch time.
        let function_call = message["tool_calls"]
            .as_array()
            .and_then(|calls| calls.first())
            .map(|call| FunctionCall {
                name: call["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: call["function"]["arguments"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
            });

        let content = if function_call.is_some() {
            String::new()
        } else {
            message["content"].as_str().unwrap_or("").to_string()
        };

        Ok(LlmResponse {
            content,
            function_call,
            usage,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn analyze(
        &self,
        system_messages: &[String],
        user_messages: &[String],
        options: AnalyzeOptions,
    ) -> Result<LlmResponse> {
        let url = self.completion_url();
        let body = self.build_request(system_messages, user_messages, &options);
        debug!(%url, tools = options.tools.len(), "Calling chat completion");

        let mut request = self.client.post(&url).json(&body);
        request = match self.cfg.provider {
            ProviderKind::Azure => request.header("api-key", self.cfg.api_key.as_str()),
            ProviderKind::OpenAi => {
                request.header("Authorization", format!("Bearer {}", self.cfg.api_key))
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let json: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let error = json["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(ProviderError::Api(error));
        }

        self.parse_response(json)
    }
}
