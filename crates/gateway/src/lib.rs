//! Tollgate request gateway.
//!
//! Puts a response cache, prompt compression, a daily spend ceiling and
//! ordered failover in front of a set of completion backends. The
//! [`RequestOrchestrator`] owns the pipeline; [`api`] exposes it over HTTP.

pub mod api;
pub mod cache;
pub mod compressor;
pub mod orchestrator;
pub mod usage;
pub mod webhook;

pub use cache::{CacheEntry, CacheSettings, CacheStats, ResponseCache, fingerprint, similarity};
pub use compressor::{compress, compression_ratio};
pub use orchestrator::{CompletionStream, RequestOrchestrator};
pub use usage::{BackendUsage, UsageStats};
pub use webhook::WebhookNotifier;
