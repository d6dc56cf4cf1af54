//! Hand-written backends and an orchestrator builder shared by the
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};

use tollgate_config::GatewayConfig;
use tokio::sync::mpsc;
use tollgate_core::{
    Backend, BackendError, BackendKind, ChunkReceiver, CompletionOptions, CompletionResult,
    ManualClock, StreamChunk,
};
use tollgate_gateway::RequestOrchestrator;
use tollgate_providers::BackendRegistry;

pub struct MockBackend {
    name: String,
    kind: BackendKind,
    available: bool,
    reply: Result<String, BackendError>,
    cost: f64,
    estimate: f64,
    script: Option<Vec<Result<StreamChunk, BackendError>>>,
    call_count: Mutex<usize>,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    /// Always answers `text`, charging `cost` (also its estimate).
    pub fn ok(name: &str, text: &str, cost: f64) -> Self {
        Self {
            name: name.into(),
            kind: BackendKind::Remote,
            available: true,
            reply: Ok(text.into()),
            cost,
            estimate: cost,
            script: None,
            call_count: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always fails with a network error.
    pub fn failing(name: &str) -> Self {
        Self {
            reply: Err(BackendError::Network(format!("{name} refused connection"))),
            ..Self::ok(name, "", 0.0)
        }
    }

    pub fn local(mut self) -> Self {
        self.kind = BackendKind::Local;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_estimate(mut self, estimate: f64) -> Self {
        self.estimate = estimate;
        self
    }

    /// Stream exactly these items instead of the reply.
    pub fn with_stream(mut self, script: Vec<Result<StreamChunk, BackendError>>) -> Self {
        self.script = Some(script);
        self
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    fn estimate_cost(&self, _prompt: &str) -> f64 {
        self.estimate
    }

    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<CompletionResult, BackendError> {
        *self.call_count.lock().unwrap() += 1;
        self.prompts.lock().unwrap().push(prompt.to_string());
        tokio::task::yield_now().await;
        match &self.reply {
            Ok(text) => Ok(CompletionResult::new(text.clone(), 10, self.cost, &self.name)),
            Err(e) => Err(e.clone()),
        }
    }

    async fn stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<ChunkReceiver, BackendError> {
        let Some(script) = &self.script else {
            let result = self.complete(prompt, options).await?;
            let (tx, rx) = mpsc::channel(2);
            let _ = tx.send(Ok(StreamChunk::text(result.text))).await;
            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
            return Ok(rx);
        };

        *self.call_count.lock().unwrap() += 1;
        self.prompts.lock().unwrap().push(prompt.to_string());
        let (tx, rx) = mpsc::channel(script.len().max(1));
        for item in script {
            let _ = tx.send(item.clone()).await;
        }
        Ok(rx)
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0).unwrap(),
    ))
}

pub fn config(daily_budget: f64) -> GatewayConfig {
    GatewayConfig {
        daily_budget,
        ..Default::default()
    }
}

pub fn orchestrator(
    config: GatewayConfig,
    backends: &[Arc<MockBackend>],
    clock: Arc<ManualClock>,
) -> RequestOrchestrator {
    let registry = BackendRegistry::from_backends(
        backends
            .iter()
            .map(|b| Arc::clone(b) as Arc<dyn Backend>)
            .collect(),
    );
    RequestOrchestrator::with_parts(config, registry, clock)
}
