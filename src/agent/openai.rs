// ABOUTME: OpenAI-compatible agent provider for cloud and local chat completion endpoints
// ABOUTME: Implements non-streaming, SSE streaming, and tool-calling completions over reqwest
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # `OpenAI`-Compatible Agent Provider
//!
//! Works with any endpoint that implements the `OpenAI` chat completions
//! API. The fixed model enumeration in the settings module maps onto this
//! provider's model parameter.

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{
    AgentCapabilities, AgentProvider, AgentTurn, ChatMessage, ChatRequest, ChatResponse,
    ChatStream, StreamChunk, TokenUsage, ToolCall, ToolSpec,
};
use crate::config::AgentConfig;
use crate::errors::AppError;

/// Connection timeout for the completions endpoint
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Request timeout (tool-heavy completions can be slow)
const REQUEST_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// API Request/Response Types (OpenAI-compatible format)
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ApiFunction,
}

#[derive(Debug, Clone, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for ApiMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiToolCall {
    function: ApiFunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    choices: Vec<ApiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    delta: ApiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for the `OpenAI`-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    /// Base URL for the API
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
}

impl From<&AgentConfig> for OpenAiProviderConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// `OpenAI`-compatible chat completion provider
pub struct OpenAiAgentProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiAgentProvider {
    /// Create a new provider with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: OpenAiProviderConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Build the API URL for a given endpoint
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages.iter().map(ApiMessage::from).collect()
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<ApiTool> {
        tools
            .iter()
            .map(|spec| ApiTool {
                tool_type: "function".to_owned(),
                function: ApiFunction {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    parameters: spec.parameters.clone(),
                },
            })
            .collect()
    }

    fn convert_tool_calls(tool_calls: &[ApiToolCall]) -> Vec<ToolCall> {
        tool_calls
            .iter()
            .map(|call| {
                let args: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or_default();
                ToolCall {
                    name: call.function.name.clone(),
                    args,
                }
            })
            .collect()
    }

    fn add_auth_header(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("Bearer {api_key}"))
        } else {
            request
        }
    }

    fn connect_error(&self, e: &reqwest::Error) -> AppError {
        if e.is_connect() {
            AppError::external_service(
                "agent",
                format!("Cannot connect to agent endpoint at {}", self.config.base_url),
            )
        } else {
            AppError::external_service("agent", format!("Request failed: {e}"))
        }
    }

    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> AppError {
        if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
            match status.as_u16() {
                401 => AppError::auth_invalid(format!(
                    "Agent API authentication failed: {}",
                    parsed.error.message
                )),
                400 => AppError::invalid_input(format!(
                    "Agent API validation error: {}",
                    parsed.error.message
                )),
                404 => AppError::not_found(format!("Model or endpoint: {}", parsed.error.message)),
                _ => AppError::external_service("agent", parsed.error.message),
            }
        } else {
            AppError::external_service(
                "agent",
                format!(
                    "API error ({status}): {}",
                    body.chars().take(200).collect::<String>()
                ),
            )
        }
    }

    async fn post_completion(&self, api_request: &ApiRequest) -> Result<ApiResponse, AppError> {
        let http_request = self
            .client
            .post(self.api_url("chat/completions"))
            .header("Content-Type", "application/json")
            .json(api_request);

        let response = self
            .add_auth_header(http_request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send completion request: {e}");
                self.connect_error(&e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::external_service("agent", format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::parse_error_response(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse agent response: {e}");
            AppError::external_service("agent", format!("Failed to parse response: {e}"))
        })
    }
}

#[async_trait]
impl AgentProvider for OpenAiAgentProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::STREAMING
            | AgentCapabilities::FUNCTION_CALLING
            | AgentCapabilities::SYSTEM_MESSAGES
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let api_request = ApiRequest {
            model: request.model.clone().unwrap_or_default(),
            messages: Self::convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(false),
            tools: None,
            tool_choice: None,
        };

        let api_response = self.post_completion(&api_request).await?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external_service("agent", "API returned no choices"))?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api_response.model,
            usage: api_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason,
        })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        let api_request = ApiRequest {
            model: request.model.clone().unwrap_or_default(),
            messages: Self::convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(true),
            tools: None,
            tool_choice: None,
        };

        let http_request = self
            .client
            .post(self.api_url("chat/completions"))
            .header("Content-Type", "application/json")
            .json(&api_request);

        let response = self
            .add_auth_header(http_request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send streaming request: {e}");
                self.connect_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(status, &body));
        }

        let byte_stream = response.bytes_stream();

        // Parse SSE lines of the form "data: {...}" as they arrive
        let stream = byte_stream
            .map(|chunk_result| match chunk_result {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let mut parsed = Vec::new();

                    for line in text.lines() {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        if line == "data: [DONE]" {
                            parsed.push(Ok(StreamChunk {
                                delta: String::new(),
                                is_final: true,
                                finish_reason: Some("stop".to_owned()),
                            }));
                            continue;
                        }

                        if let Some(json_str) = line.strip_prefix("data: ") {
                            match serde_json::from_str::<ApiStreamChunk>(json_str) {
                                Ok(chunk) => {
                                    if let Some(choice) = chunk.choices.into_iter().next() {
                                        parsed.push(Ok(StreamChunk {
                                            delta: choice.delta.content.unwrap_or_default(),
                                            is_final: choice.finish_reason.is_some(),
                                            finish_reason: choice.finish_reason,
                                        }));
                                    }
                                }
                                Err(e) => {
                                    warn!("Failed to parse stream chunk: {e}");
                                }
                            }
                        }
                    }

                    parsed.into_iter().next().unwrap_or_else(|| {
                        Ok(StreamChunk {
                            delta: String::new(),
                            is_final: false,
                            finish_reason: None,
                        })
                    })
                }
                Err(e) => {
                    error!("Error reading agent stream: {e}");
                    Err(AppError::external_service(
                        "agent",
                        format!("Stream read error: {e}"),
                    ))
                }
            })
            .filter(|result| {
                future::ready(
                    result
                        .as_ref()
                        .map_or(true, |chunk| !chunk.delta.is_empty() || chunk.is_final),
                )
            });

        Ok(Box::pin(stream))
    }

    async fn complete_with_tools(
        &self,
        request: &ChatRequest,
        tools: Option<Vec<ToolSpec>>,
    ) -> Result<AgentTurn, AppError> {
        let api_tools = tools.as_deref().map(Self::convert_tools);

        let api_request = ApiRequest {
            model: request.model.clone().unwrap_or_default(),
            messages: Self::convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(false),
            tools: api_tools,
            tool_choice: tools.as_ref().map(|_| "auto".to_owned()),
        };

        let api_response = self.post_completion(&api_request).await?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external_service("agent", "API returned no choices"))?;

        let tool_calls = choice.message.tool_calls.map(|calls| {
            debug!("Agent returned {} tool calls", calls.len());
            Self::convert_tool_calls(&calls)
        });

        Ok(AgentTurn {
            content: choice.message.content,
            tool_calls,
            model: api_response.model,
            usage: api_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason,
        })
    }
}
