//! Anthropic native backend.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy):
//! `x-api-key` authentication, the `anthropic-version` header, and SSE
//! streaming via typed `content_block_delta` / `message_stop` events.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use tollgate_core::{
    Backend, BackendError, BackendKind, ChunkReceiver, CompletionOptions, CompletionResult,
    StreamChunk, Usage, estimate_tokens,
};
use tollgate_telemetry::PricingTable;

use crate::http::{self, SseBuffer, SseLine};
use crate::openai_compat::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct AnthropicBackend {
    name: String,
    base_url: String,
    api_key: String,
    models: Vec<String>,
    pricing: Arc<PricingTable>,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, models: Vec<String>, pricing: Arc<PricingTable>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            models,
            pricing,
            client: http::build_client(REQUEST_TIMEOUT),
        }
    }

    /// Custom base URL (proxies, tests). A trailing `/v1` is accepted.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        let base = base.trim_end_matches('/');
        self.base_url = base.strip_suffix("/v1").unwrap_or(base).to_string();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn model_for(&self, options: &CompletionOptions) -> String {
        options
            .model
            .clone()
            .or_else(|| self.models.first().cloned())
            .unwrap_or_else(|| "claude-3-5-haiku-20241022".into())
    }

    fn request_body(&self, prompt: &str, options: &CompletionOptions, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model_for(options),
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "stream": stream,
        })
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn estimate_cost(&self, prompt: &str) -> f64 {
        let tokens = estimate_tokens(prompt);
        let model = self.models.first().map(String::as_str).unwrap_or_default();
        self.pricing.compute_cost("anthropic", model, tokens, tokens)
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult, BackendError> {
        let model = self.model_for(options);
        let body = self.request_body(prompt, options, false);

        debug!(backend = %self.name, model = %model, "Sending completion request");

        let response = self.request(&body).send().await.map_err(http::send_error)?;
        let response = http::check_status(&self.name, response).await?;

        let resp: AnthropicResponse = response.json().await.map_err(|e| BackendError::Api {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let text = resp.text();
        let cost = self.pricing.compute_cost(
            "anthropic",
            &model,
            resp.usage.input_tokens,
            resp.usage.output_tokens,
        );

        Ok(CompletionResult::new(
            text,
            resp.usage.input_tokens + resp.usage.output_tokens,
            cost,
            self.name.clone(),
        ))
    }

    async fn stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<ChunkReceiver, BackendError> {
        let body = self.request_body(prompt, options, true);

        debug!(backend = %self.name, model = %self.model_for(options), "Sending streaming request");

        let response = self
            .request(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(http::send_error)?;
        let response = http::check_status(&self.name, response).await?;

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = SseBuffer::default();
            let mut input_tokens = 0u32;
            let mut usage: Option<Usage> = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };
                buffer.push(&bytes);

                while let Some(line) = buffer.next_line() {
                    let data = match http::classify(&line) {
                        Some(SseLine::Event("message_stop")) => {
                            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
                            return;
                        }
                        Some(SseLine::Data(data)) if !data.is_empty() => data,
                        _ => continue,
                    };

                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    match event["type"].as_str().unwrap_or("") {
                        "message_start" => {
                            input_tokens = token_field(&event["message"]["usage"], "input_tokens");
                        }
                        "content_block_delta" => {
                            let delta = &event["delta"];
                            if delta["type"].as_str() == Some("text_delta") {
                                if let Some(text) = delta["text"].as_str() {
                                    if tx.send(Ok(StreamChunk::text(text))).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                        "message_delta" => {
                            let output = token_field(&event["usage"], "output_tokens");
                            usage = Some(Usage {
                                prompt_tokens: input_tokens,
                                completion_tokens: output,
                                total_tokens: input_tokens + output,
                            });
                        }
                        _ => {}
                    }
                }
            }

            // Stream ended without message_stop
            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
        });

        Ok(rx)
    }
}

fn token_field(usage: &serde_json::Value, field: &str) -> u32 {
    usage[field]
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

// --- Anthropic API types ---

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

impl AnthropicResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.as_str()),
                ResponseContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
