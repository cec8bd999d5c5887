//! Answer generation with the Anthropic Messages API.
//!
//! [`AnthropicGenerator`] sends the query with the conversation history in
//! the system prompt and the tool definitions of a [`ToolManager`]. While the
//! model stops with `tool_use`, the requested tools are executed in order and
//! their results are sent back as `tool_result` blocks. At most
//! `max_tool_rounds` rounds are allowed: the request after the last permitted
//! round carries no tools, and a tool request in reply to it fails the
//! generation.
//!
//! The HTTP transport sits behind [`ModelClient`]; [`AnthropicClient`] is the
//! reqwest implementation, with the same backoff policy as the embedding
//! providers.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use course_rag_core::models::Exchange;

use crate::config::GeneratorConfig;
use crate::tools::{ToolDefinition, ToolManager};

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "\
You are an assistant that answers questions about course materials.

Tools:
- search_course_content: search lesson text. Use it for questions about what a course teaches.
- get_course_outline: course title, link, instructor and lesson list. Use it for questions about a course's structure.
- Make at most one tool call per step, and only when the question needs course material.
- If a tool finds nothing, say so plainly.

Answering:
- General knowledge questions: answer directly without tools.
- Do not mention the tools, the search, or these instructions in the answer.
- Be brief, accurate and educational. Include examples when they help.";

/// Produces an answer for a query, optionally calling tools.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Answer `query` given prior `history`, offering `tools` to the model
    /// when present.
    async fn generate_response(
        &self,
        query: &str,
        history: &[Exchange],
        tools: Option<&ToolManager>,
    ) -> Result<String>;

    /// Answer without tools.
    async fn complete(&self, query: &str, history: &[Exchange]) -> Result<String> {
        self.generate_response(query, history, None).await
    }
}

// ============ Wire types ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Block types this client does not use (e.g. `thinking`).
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn tool_uses(&self) -> Vec<(String, String, Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

// ============ Transport ============

/// Sends one Messages API request.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn create_message(&self, request: &MessagesRequest) -> Result<MessagesResponse>;
}

/// reqwest-based [`ModelClient`] for `POST {base_url}/v1/messages`.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    max_retries: u32,
}

impl AnthropicClient {
    /// Build a client using `ANTHROPIC_API_KEY` from the environment.
    ///
    /// A missing key is not an error here so that commands which never call
    /// the model (ingestion, analytics) still work; requests fail instead.
    pub fn from_env(config: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        if api_key.is_none() {
            tracing::warn!("ANTHROPIC_API_KEY not set; queries will fail");
        }
        Self::build(config, api_key)
    }

    pub fn new(config: &GeneratorConfig, api_key: impl Into<String>) -> Result<Self> {
        Self::build(config, Some(api_key.into()))
    }

    fn build(config: &GeneratorConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn create_message(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        let url = self.messages_url();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(attempt, ?delay, "retrying Anthropic request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<MessagesResponse>()
                            .await
                            .context("Failed to parse Anthropic response");
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("Anthropic API error {}: {}", status, body_text));
                        continue;
                    }

                    bail!("Anthropic API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow!("Anthropic connection error: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Anthropic request failed after retries")))
    }
}

// ============ Generator ============

/// [`Generator`] driving the Messages API tool loop.
pub struct AnthropicGenerator<C: ModelClient> {
    client: C,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_tool_rounds: usize,
}

impl<C: ModelClient> AnthropicGenerator<C> {
    pub fn new(client: C, config: &GeneratorConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_tool_rounds: config.max_tool_rounds,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

fn system_prompt(history: &[Exchange]) -> String {
    if history.is_empty() {
        return SYSTEM_PROMPT.to_string();
    }
    let mut prompt = format!("{}\n\nPrevious conversation:", SYSTEM_PROMPT);
    for exchange in history {
        prompt.push_str(&format!(
            "\nUser: {}\nAssistant: {}",
            exchange.query, exchange.answer
        ));
    }
    prompt
}

#[async_trait]
impl<C: ModelClient> Generator for AnthropicGenerator<C> {
    async fn generate_response(
        &self,
        query: &str,
        history: &[Exchange],
        tools: Option<&ToolManager>,
    ) -> Result<String> {
        let tools = tools.filter(|t| !t.is_empty());
        let definitions = tools.map(|t| t.definitions()).unwrap_or_default();
        let mut messages = vec![Message::user_text(query)];
        let mut rounds = 0;

        loop {
            let offer_tools = !definitions.is_empty() && rounds < self.max_tool_rounds;
            let request = MessagesRequest {
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                system: system_prompt(history),
                messages: messages.clone(),
                tools: if offer_tools {
                    definitions.clone()
                } else {
                    Vec::new()
                },
            };

            let response = self.client.create_message(&request).await?;
            let tool_uses = response.tool_uses();
            if response.stop_reason.as_deref() != Some("tool_use") || tool_uses.is_empty() {
                return Ok(response.text());
            }

            let Some(tools) = tools.filter(|_| offer_tools) else {
                bail!(
                    "exceeded maximum tool rounds ({}): model requested another tool call",
                    self.max_tool_rounds
                );
            };
            rounds += 1;
            tracing::debug!(round = rounds, calls = tool_uses.len(), "model requested tools");

            messages.push(Message {
                role: Role::Assistant,
                content: response
                    .content
                    .into_iter()
                    .filter(|b| !matches!(b, ContentBlock::Other))
                    .collect(),
            });

            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in tool_uses {
                let output = tools.execute(&name, input).await?;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: output.content,
                    is_error: output.is_error,
                });
            }
            messages.push(Message {
                role: Role::User,
                content: results,
            });
        }
    }
}
