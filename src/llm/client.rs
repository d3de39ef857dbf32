//! Chat-completion client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (Groq by
//! default):
//! - Bearer authentication from [`Credentials`]
//! - JSON object mode for structured planner output
//! - Tool definitions and tool-result turns for the synthesizer

use crate::cli::config::LlmConfig;
use crate::errors::{PipelineError, Result};
use crate::llm::types::{ChatMessage, ChatReply, ChatRequest, ResponseFormat, ToolCall, ToolDefinition};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Default environment variable holding the API key
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";

/// Language model back-end seam shared by both stages
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run one completion
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply>;

    /// Model identifier, for logs
    fn model(&self) -> &str;
}

/// API credential for the back-end
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(PipelineError::Configuration("API key is empty".to_string()));
        }
        Ok(Self { api_key })
    }

    /// Read the key from `var`; absence is a fatal configuration error
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self { api_key: key }),
            _ => {
                tracing::error!(var, "API key is missing from environment variables");
                Err(PipelineError::Configuration(format!(
                    "{} not found. Ensure your .env file is configured.",
                    var
                )))
            }
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("api_key", &"***").finish()
    }
}

/// OpenAI-compatible chat-completion client
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    model: String,
    credentials: Credentials,
}

impl OpenAiCompatClient {
    /// Create client from configuration and credentials
    pub fn new(config: &LlmConfig, credentials: Credentials) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(PipelineError::Configuration("llm.base_url is empty".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(PipelineError::Configuration("llm.model is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(PipelineError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            credentials,
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn wire_request<'a>(&'a self, request: &'a ChatRequest) -> WireRequest<'a> {
        let has_tools = !request.tools.is_empty();
        WireRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: match request.response_format {
                ResponseFormat::Text => None,
                ResponseFormat::JsonObject => Some(WireResponseFormat { kind: "json_object" }),
            },
            tools: has_tools.then_some(request.tools.as_slice()),
            tool_choice: has_tools.then(|| if request.allow_tool_calls { "auto" } else { "none" }),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let url = self.endpoint();
        tracing::debug!(model = %self.model, messages = request.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.credentials.api_key())
            .json(&self.wire_request(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Backend(format!("Request to {} timed out", url))
                } else {
                    PipelineError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Backend(format!("HTTP {}: {}", status, error_text)));
        }

        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Backend(format!("Failed to parse completion: {}", e)))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Backend("Completion contained no choices".to_string()))?;

        Ok(ChatReply {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls,
            finish_reason: choice.finish_reason,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}
