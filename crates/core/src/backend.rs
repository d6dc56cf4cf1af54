//! Backend trait — the abstraction over completion services.
//!
//! A Backend knows how to send a prompt to a text-completion service and get
//! a response back, either as a complete result or as a stream of chunks.
//!
//! Implementations: OpenAI-compatible remote services, local servers
//! (Ollama, LM Studio), and test doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BackendError;

/// Whether a backend is a paid remote service or a free local server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Remote,
    Local,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" | "cloud" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown backend kind '{other}' (expected remote or local)")),
        }
    }
}

/// Per-request options.
///
/// The serialized form doubles as the cache comparison key, so field order
/// and skipping rules must stay stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Model override (defaults to the backend's first configured model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Restrict the candidate backends to one kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_backend: Option<BackendKind>,
}

impl CompletionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn force(mut self, kind: BackendKind) -> Self {
        self.force_backend = Some(kind);
        self
    }

    /// Canonical serialized form used for exact option comparison.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The outcome of one completion.
///
/// Immutable once built; the cache only ever flips `was_cached` on the copy
/// it hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub text: String,
    pub token_count: u32,
    /// Cost in USD
    pub cost: f64,
    pub backend_name: String,
    #[serde(default)]
    pub was_cached: bool,
}

impl CompletionResult {
    pub fn new(
        text: impl Into<String>,
        token_count: u32,
        cost: f64,
        backend_name: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            token_count,
            cost,
            backend_name: backend_name.into(),
            was_cached: false,
        }
    }

    /// Copy of this result marked as served from cache.
    pub fn as_cached(&self) -> Self {
        Self {
            was_cached: true,
            ..self.clone()
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial text delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (only ever on the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
            usage: None,
        }
    }

    pub fn finished(usage: Option<Usage>) -> Self {
        Self {
            content: None,
            done: true,
            usage,
        }
    }
}

/// Receiving half of a backend stream.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, BackendError>>;

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// The core Backend trait.
///
/// Every completion service implements this trait. The orchestrator calls
/// the capability methods in a fixed order (availability, estimate,
/// complete/stream) without knowing which service is behind the handle.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Remote (paid) or local (free).
    fn kind(&self) -> BackendKind;

    /// Whether the backend can currently take requests.
    async fn is_available(&self) -> bool;

    /// Projected cost in USD of completing `prompt`.
    fn estimate_cost(&self, prompt: &str) -> f64;

    /// Send a prompt and get a complete result.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<CompletionResult, BackendError>;

    /// Send a prompt and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the text as a
    /// single chunk followed by the terminal chunk.
    async fn stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<ChunkReceiver, BackendError> {
        let result = self.complete(prompt, options).await?;
        let (tx, rx) = mpsc::channel(2);
        let _ = tx.send(Ok(StreamChunk::text(result.text))).await;
        let _ = tx
            .send(Ok(StreamChunk::finished(Some(Usage {
                prompt_tokens: 0,
                completion_tokens: result.token_count,
                total_tokens: result.token_count,
            }))))
            .await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoBackend;

    #[async_trait]
    impl Backend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Local
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn estimate_cost(&self, _prompt: &str) -> f64 {
            0.0
        }

        async fn complete(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> std::result::Result<CompletionResult, BackendError> {
            Ok(CompletionResult::new(prompt, estimate_tokens(prompt), 0.0, "echo"))
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let mut rx = EchoBackend
            .stream("hello", &CompletionOptions::default())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("hello"));
        assert!(!first.done);

        let last = rx.recv().await.unwrap().unwrap();
        assert!(last.done);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn options_canonical_form_skips_unset_fields() {
        assert_eq!(CompletionOptions::default().canonical(), "{}");
        let opts = CompletionOptions::new()
            .with_model("gpt-4o-mini")
            .force(BackendKind::Local);
        assert_eq!(
            opts.canonical(),
            r#"{"model":"gpt-4o-mini","force_backend":"local"}"#
        );
    }

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("cloud".parse::<BackendKind>().unwrap(), BackendKind::Remote);
        assert_eq!("LOCAL".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert!("gpu".parse::<BackendKind>().is_err());
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn cached_copy_only_flips_flag() {
        let result = CompletionResult::new("ok", 3, 0.01, "openai");
        let cached = result.as_cached();
        assert!(cached.was_cached);
        assert_eq!(cached.text, result.text);
        assert!(!result.was_cached);
    }
}
