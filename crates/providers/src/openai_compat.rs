//! OpenAI-compatible backend.
//!
//! Works with OpenAI, DeepSeek, Mistral, xAI, Together AI, Google's
//! OpenAI-compatible endpoint, and the local Ollama / LM Studio servers.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Availability probing (API key for remote, `GET /models` for local)
//! - Cost estimation from the shared [`PricingTable`]

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

pub(crate) const DEFAULT_TEMPERATURE: f32 = 0.7;
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A backend speaking the `/chat/completions` protocol.
pub struct OpenAiCompatBackend {
    name: String,
    kind: BackendKind,
    base_url: String,
    api_key: String,
    models: Vec<String>,
    pricing: Arc<PricingTable>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// A paid remote service, priced from `pricing`.
    pub fn remote(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        models: Vec<String>,
        pricing: Arc<PricingTable>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: BackendKind::Remote,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            models,
            pricing,
            client: http::build_client(REQUEST_TIMEOUT),
        }
    }

    /// A free local server (no key, zero cost).
    pub fn local(name: impl Into<String>, base_url: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: BackendKind::Local,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: String::new(),
            models,
            pricing: Arc::new(PricingTable::empty()),
            client: http::build_client(REQUEST_TIMEOUT),
        }
    }

    /// Ollama's OpenAI-compatible endpoint.
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::local(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            vec!["llama2".into()],
        )
    }

    /// LM Studio serves whichever model is loaded.
    pub fn lmstudio(base_url: Option<&str>) -> Self {
        Self::local(
            "lmstudio",
            base_url.unwrap_or("http://localhost:1234/v1"),
            vec!["local-model".into()],
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    fn model_for(&self, options: &CompletionOptions) -> String {
        options
            .model
            .clone()
            .or_else(|| self.models.first().cloned())
            .unwrap_or_else(|| "default".into())
    }

    fn request_body(&self, prompt: &str, options: &CompletionOptions, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model_for(options),
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }

    fn price(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        match self.kind {
            BackendKind::Local => 0.0,
            BackendKind::Remote => {
                self.pricing
                    .compute_cost(&self.name, model, input_tokens, output_tokens)
            }
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        match self.kind {
            BackendKind::Remote => !self.api_key.is_empty(),
            BackendKind::Local => {
                let request = self
                    .client
                    .get(format!("{}/models", self.base_url))
                    .timeout(PROBE_TIMEOUT);
                match self.authorized(request).send().await {
                    Ok(response) => response.status().is_success(),
                    Err(e) => {
                        debug!(backend = %self.name, error = %e, "Local server not reachable");
                        false
                    }
                }
            }
        }
    }

    fn estimate_cost(&self, prompt: &str) -> f64 {
        let tokens = estimate_tokens(prompt);
        let model = self.models.first().map(String::as_str).unwrap_or_default();
        // Assume the answer is about as long as the prompt.
        self.price(model, tokens, tokens)
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult, BackendError> {
        let model = self.model_for(options);
        let body = self.request_body(prompt, options, false);

        debug!(backend = %self.name, model = %model, "Sending completion request");

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(http::send_error)?;
        let response = http::check_status(&self.name, response).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| BackendError::Api {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Api {
                status_code: 200,
                message: "No choices in response".into(),
            })?;
        let text = choice.message.content.unwrap_or_default();

        let (input_tokens, output_tokens) = match api_response.usage {
            Some(u) => (u.prompt_tokens, u.completion_tokens),
            None => (estimate_tokens(prompt), estimate_tokens(&text)),
        };
        let cost = self.price(&model, input_tokens, output_tokens);

        Ok(CompletionResult::new(
            text,
            input_tokens + output_tokens,
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

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Accept", "text/event-stream")
            .json(&body);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(http::send_error)?;
        let response = http::check_status(&self.name, response).await?;

        let (tx, rx) = mpsc::channel(64);
        let backend_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = SseBuffer::default();
            let mut usage = None;

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
                    let Some(SseLine::Data(data)) = http::classify(&line) else {
                        continue;
                    };

                    match parse_stream_data(data) {
                        StreamEvent::Done => {
                            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
                            return;
                        }
                        StreamEvent::Delta { text, usage: reported } => {
                            if reported.is_some() {
                                usage = reported;
                            }
                            if let Some(text) = text {
                                if tx.send(Ok(StreamChunk::text(text))).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        StreamEvent::Unparseable(e) => {
                            trace!(
                                backend = %backend_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
        });

        Ok(rx)
    }
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Done,
    /// Either half may be absent; some servers attach usage to every chunk.
    Delta {
        text: Option<String>,
        usage: Option<Usage>,
    },
    Unparseable(String),
}

fn parse_stream_data(data: &str) -> StreamEvent {
    if data == "[DONE]" {
        return StreamEvent::Done;
    }
    let parsed: StreamResponse = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(e) => return StreamEvent::Unparseable(e.to_string()),
    };
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());
    StreamEvent::Delta {
        text,
        usage: parsed.usage.map(Usage::from),
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
