//! The request pipeline.
//!
//! `cache lookup -> compress -> pick candidates -> for each: availability,
//! estimate, reserve budget, call -> commit spend, store in cache`.
//!
//! Budget failures stop the pipeline at once. Every other backend failure is
//! recorded and the next candidate is tried; only exhausting the list
//! surfaces an error, which aggregates every recorded failure.

use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, debug_span, info, warn};
use uuid::Uuid;

use tollgate_config::GatewayConfig;
use tollgate_core::{
    Backend, BackendFailure, ChunkReceiver, Clock, CompletionOptions, CompletionResult, Error,
    Result, SystemClock, Usage,
};
use tollgate_providers::{BackendRegistry, build_from_config};
use tollgate_telemetry::{
    AlertDispatcher, AlertThresholds, BudgetLedger, BudgetReservation, BudgetStatus, PricingTable,
};

use crate::cache::{CacheSettings, CacheStats, ResponseCache};
use crate::compressor;
use crate::usage::UsageStats;
use crate::webhook::WebhookNotifier;

const STREAM_BUFFER: usize = 32;

pub struct RequestOrchestrator {
    config: GatewayConfig,
    registry: BackendRegistry,
    cache: ResponseCache,
    ledger: Arc<BudgetLedger>,
    usage: Arc<Mutex<UsageStats>>,
}

impl RequestOrchestrator {
    /// Validate `config` and build the backend registry it describes.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let registry = build_from_config(&config, Arc::new(PricingTable::with_defaults()))?;
        Ok(Self::with_parts(config, registry, Arc::new(SystemClock)))
    }

    /// Assemble an orchestrator from an already-built registry.
    pub fn with_parts(config: GatewayConfig, registry: BackendRegistry, clock: Arc<dyn Clock>) -> Self {
        let thresholds = AlertThresholds::new(
            config.alerts.warning,
            config.alerts.urgent,
            config.alerts.critical,
        );
        let alerts = Arc::new(AlertDispatcher::with_clock(thresholds, Arc::clone(&clock)));
        if let Some(url) = &config.webhooks.url {
            alerts.subscribe(Arc::new(WebhookNotifier::new(url, config.webhooks.secret.clone())));
            debug!(url = %url, "Budget webhook subscribed");
        }

        let ledger = Arc::new(BudgetLedger::with_clock(
            config.daily_budget,
            alerts,
            Arc::clone(&clock),
        ));
        let cache = ResponseCache::with_clock(CacheSettings::from_config(&config), clock);

        Self {
            config,
            registry,
            cache,
            ledger,
            usage: Arc::new(Mutex::new(UsageStats::default())),
        }
    }

    /// Complete `prompt`, returning only the text.
    pub async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        self.complete_detailed(prompt, options).await.map(|r| r.text)
    }

    /// Complete `prompt`, returning the full result (cost, backend, cache flag).
    pub async fn complete_detailed(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult> {
        let span = debug_span!("complete", request_id = %Uuid::new_v4());
        self.run_complete(prompt, options).instrument(span).await
    }

    async fn run_complete(&self, prompt: &str, options: &CompletionOptions) -> Result<CompletionResult> {
        if let Some(hit) = self.cache.lookup(prompt, options) {
            info!(backend = %hit.backend_name, "Serving response from cache");
            self.usage.lock().record_request(true);
            return Ok(hit);
        }
        self.usage.lock().record_request(false);

        let compressed = self.compress(prompt);
        let candidates = self.candidates(options)?;
        let total = candidates.len();
        let mut failures = Vec::new();

        for (i, backend) in candidates.iter().enumerate() {
            let name = backend.name();
            let Some(reservation) = self
                .prepare(backend.as_ref(), &compressed, i + 1, total, &mut failures)
                .await?
            else {
                continue;
            };

            match backend.complete(&compressed, options).await {
                Ok(result) => {
                    reservation.commit(result.cost);
                    self.usage.lock().record_success(name, result.cost);
                    self.cache.store(prompt, options, &result);
                    info!(
                        backend = %name,
                        cost = result.cost,
                        tokens = result.token_count,
                        "Completion succeeded"
                    );
                    return Ok(result);
                }
                Err(e) => {
                    drop(reservation);
                    warn!(backend = %name, error = %e, "Backend failed, trying next");
                    self.usage.lock().record_failure(name);
                    failures.push(BackendFailure::new(name, e.to_string()));
                }
            }
        }

        Err(Error::all_unavailable(failures))
    }

    /// Stream a completion of `prompt`.
    ///
    /// A backend counts as serving once its first text chunk arrives; a
    /// stream that errors or ends before that fails over to the next
    /// candidate without spending. The estimate is committed once the
    /// backend's stream finishes cleanly, whether or not the returned stream
    /// is still being read. A mid-stream fault releases the hold instead.
    /// Streamed responses are never cached.
    pub async fn stream(&self, prompt: &str, options: &CompletionOptions) -> Result<CompletionStream> {
        let span = debug_span!("stream", request_id = %Uuid::new_v4());
        self.run_stream(prompt, options).instrument(span).await
    }

    async fn run_stream(&self, prompt: &str, options: &CompletionOptions) -> Result<CompletionStream> {
        self.usage.lock().record_request(false);

        let compressed = self.compress(prompt);
        let candidates = self.candidates(options)?;
        let total = candidates.len();
        let mut failures = Vec::new();

        for (i, backend) in candidates.iter().enumerate() {
            let name = backend.name();
            let Some(reservation) = self
                .prepare(backend.as_ref(), &compressed, i + 1, total, &mut failures)
                .await?
            else {
                continue;
            };

            let opened = match backend.stream(&compressed, options).await {
                Ok(mut rx) => match open_stream(&mut rx).await {
                    Ok(opening) => Ok((rx, opening)),
                    Err(message) => Err(message),
                },
                Err(e) => Err(e.to_string()),
            };

            match opened {
                Ok((rx, opening)) => {
                    info!(backend = %name, estimate = reservation.amount(), "Streaming started");
                    let (tx, out) = mpsc::channel(STREAM_BUFFER);
                    tokio::spawn(
                        forward(
                            name.to_string(),
                            opening,
                            rx,
                            tx,
                            reservation,
                            Arc::clone(&self.usage),
                        )
                        .in_current_span(),
                    );
                    return Ok(CompletionStream {
                        backend: name.to_string(),
                        inner: ReceiverStream::new(out),
                    });
                }
                Err(message) => {
                    drop(reservation);
                    warn!(backend = %name, error = %message, "Backend stream failed, trying next");
                    self.usage.lock().record_failure(name);
                    failures.push(BackendFailure::new(name, message));
                }
            }
        }

        Err(Error::all_unavailable(failures))
    }

    fn compress(&self, prompt: &str) -> String {
        let compressed = compressor::compress(prompt, self.config.compression_level);
        debug!(
            level = %self.config.compression_level,
            ratio = compressor::compression_ratio(prompt, &compressed),
            "Prompt compressed"
        );
        compressed
    }

    fn candidates(&self, options: &CompletionOptions) -> Result<Vec<Arc<dyn Backend>>> {
        let candidates = self.registry.candidates(options.force_backend);
        if candidates.is_empty() {
            return Err(Error::all_unavailable(Vec::new()));
        }
        Ok(candidates)
    }

    /// Availability probe and budget hold for one candidate.
    ///
    /// `Ok(None)` means the backend was skipped and the failure recorded;
    /// a budget error is returned as-is and ends the request.
    async fn prepare(
        &self,
        backend: &dyn Backend,
        compressed: &str,
        attempt: usize,
        total: usize,
        failures: &mut Vec<BackendFailure>,
    ) -> Result<Option<BudgetReservation>> {
        let name = backend.name();
        debug!(backend = %name, attempt, total, "Trying backend");

        if !backend.is_available().await {
            debug!(backend = %name, "Backend not available, skipping");
            self.usage.lock().record_failure(name);
            failures.push(BackendFailure::new(name, "not available"));
            return Ok(None);
        }

        let estimate = backend.estimate_cost(compressed);
        let reservation = self.ledger.reserve(estimate).inspect_err(|e| {
            warn!(backend = %name, estimate, error = %e, "Budget check failed");
        })?;
        Ok(Some(reservation))
    }

    pub fn budget_status(&self) -> BudgetStatus {
        self.ledger.status()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Read-only view of the configuration this orchestrator was built from.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn usage(&self) -> UsageStats {
        self.usage.lock().clone()
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    pub fn alerts(&self) -> &Arc<AlertDispatcher> {
        self.ledger.alerts()
    }
}

/// What a backend stream produced up to its first text chunk.
struct Opening {
    first: String,
    usage: Option<Usage>,
    done: bool,
}

/// Read until the first non-empty text chunk.
///
/// `Err` carries the failure message when the stream faults or ends first.
async fn open_stream(rx: &mut ChunkReceiver) -> std::result::Result<Opening, String> {
    let mut usage = None;
    while let Some(item) = rx.recv().await {
        let chunk = item.map_err(|e| e.to_string())?;
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        if let Some(first) = chunk.content.filter(|t| !t.is_empty()) {
            return Ok(Opening {
                first,
                usage,
                done: chunk.done,
            });
        }
        if chunk.done {
            return Err("stream finished without output".into());
        }
    }
    Err("stream closed without output".into())
}

/// Relay text deltas from a backend stream to the caller.
///
/// Keeps draining after the caller goes away. A clean finish commits the
/// reserved estimate before the caller's stream ends; a fault releases it.
async fn forward(
    backend: String,
    opening: Opening,
    mut rx: ChunkReceiver,
    tx: mpsc::Sender<Result<String>>,
    reservation: BudgetReservation,
    usage: Arc<Mutex<UsageStats>>,
) {
    let mut consumer = Some(tx);
    let mut reported = opening.usage;
    let mut fault = None;

    relay(&backend, &mut consumer, opening.first).await;
    if !opening.done {
        while let Some(item) = rx.recv().await {
            match item {
                Ok(chunk) => {
                    if chunk.usage.is_some() {
                        reported = chunk.usage;
                    }
                    if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                        relay(&backend, &mut consumer, text).await;
                    }
                    if chunk.done {
                        break;
                    }
                }
                Err(e) => {
                    fault = Some(e);
                    break;
                }
            }
        }
    }

    if let Some(e) = fault {
        drop(reservation);
        usage.lock().record_failure(&backend);
        warn!(backend = %backend, error = %e, "Stream interrupted, estimate released");
        if let Some(out) = &consumer {
            let _ = out
                .send(Err(Error::ProviderUnavailable {
                    provider: backend.clone(),
                    failures: vec![BackendFailure::new(&backend, e.to_string())],
                }))
                .await;
        }
        return;
    }

    if let Some(reported) = reported {
        debug!(
            backend = %backend,
            prompt_tokens = reported.prompt_tokens,
            completion_tokens = reported.completion_tokens,
            "Backend reported stream usage"
        );
    }

    let estimate = reservation.amount();
    reservation.commit(estimate);
    usage.lock().record_success(&backend, estimate);
    info!(backend = %backend, cost = estimate, "Stream finished");
}

async fn relay(backend: &str, consumer: &mut Option<mpsc::Sender<Result<String>>>, text: String) {
    if let Some(out) = consumer.as_ref() {
        if out.send(Ok(text)).await.is_err() {
            debug!(backend = %backend, "Stream consumer went away, draining");
            *consumer = None;
        }
    }
}

/// Text chunks of a streamed completion.
///
/// Ends after the last chunk. A mid-stream backend fault arrives as one
/// `Err` item before the end.
pub struct CompletionStream {
    backend: String,
    inner: ReceiverStream<Result<String>>,
}

impl CompletionStream {
    /// Name of the backend serving this stream.
    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    /// Read the whole stream into one string.
    pub async fn collect_text(mut self) -> Result<String> {
        use futures::StreamExt;

        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

impl Stream for CompletionStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("backend", &self.backend)
            .finish()
    }
}
