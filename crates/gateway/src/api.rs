//! HTTP surface: budget, usage and provider status plus a completion endpoint.
//!
//! Built on Axum. Every handler reads from the shared orchestrator; nothing
//! here holds state of its own.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tollgate_core::{BackendKind, CompletionOptions, Error, ErrorKind};

use crate::cache::CacheStats;
use crate::orchestrator::RequestOrchestrator;
use crate::usage::{BackendUsage, UsageStats};

type SharedOrchestrator = Arc<RequestOrchestrator>;

/// Build the router for `orchestrator`.
pub fn router(orchestrator: SharedOrchestrator) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/budget", get(budget_handler))
        .route("/api/usage", get(usage_handler))
        .route("/api/providers", get(providers_handler))
        .route("/api/complete", post(complete_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(orchestrator: SharedOrchestrator, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Tollgate API listening");
    axum::serve(listener, router(orchestrator)).await
}

// ── Responses ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BudgetResponse {
    pub daily_limit: f64,
    pub used: f64,
    pub remaining: f64,
    pub reserved: f64,
    pub percentage: f64,
    pub unlimited: bool,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    #[serde(flatten)]
    pub usage: UsageStats,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub kind: BackendKind,
    pub requests: u64,
    pub failures: u64,
    pub cost: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderListResponse {
    pub providers: Vec<ProviderEntry>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub prompt: String,
    #[serde(default)]
    pub options: CompletionOptions,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub text: String,
    pub backend: String,
    pub cost: f64,
    pub tokens: u32,
    pub cached: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn budget_handler(State(orchestrator): State<SharedOrchestrator>) -> Json<BudgetResponse> {
    let status = orchestrator.budget_status();
    Json(BudgetResponse {
        daily_limit: status.daily_limit,
        used: status.used,
        remaining: status.remaining,
        reserved: status.reserved,
        percentage: status.percentage(),
        unlimited: status.is_unlimited(),
        reset_at: status.reset_at,
    })
}

async fn usage_handler(State(orchestrator): State<SharedOrchestrator>) -> Json<UsageResponse> {
    Json(UsageResponse {
        usage: orchestrator.usage(),
        cache: orchestrator.cache_stats(),
    })
}

async fn providers_handler(
    State(orchestrator): State<SharedOrchestrator>,
) -> Json<ProviderListResponse> {
    let usage = orchestrator.usage();
    let providers: Vec<ProviderEntry> = orchestrator
        .registry()
        .iter()
        .map(|backend| {
            let counters = usage.backend(backend.name()).cloned().unwrap_or_default();
            let BackendUsage {
                requests,
                failures,
                cost,
            } = counters;
            ProviderEntry {
                name: backend.name().to_string(),
                kind: backend.kind(),
                requests,
                failures,
                cost,
            }
        })
        .collect();
    let count = providers.len();
    Json(ProviderListResponse { providers, count })
}

async fn complete_handler(
    State(orchestrator): State<SharedOrchestrator>,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, (StatusCode, Json<ErrorResponse>)> {
    if payload.prompt.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "prompt must not be empty".into(),
                kind: "bad_request".into(),
            }),
        ));
    }

    let result = orchestrator
        .complete_detailed(&payload.prompt, &payload.options)
        .await
        .map_err(error_response)?;

    Ok(Json(CompleteResponse {
        text: result.text,
        backend: result.backend_name,
        cost: result.cost,
        tokens: result.token_count,
        cached: result.was_cached,
    }))
}

fn error_response(err: Error) -> (StatusCode, Json<ErrorResponse>) {
    let (status, kind) = match err.kind() {
        ErrorKind::BudgetExceeded => (StatusCode::PAYMENT_REQUIRED, "budget_exceeded"),
        ErrorKind::ProviderUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable"),
        ErrorKind::Configuration => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
        ErrorKind::Cache => (StatusCode::INTERNAL_SERVER_ERROR, "cache"),
        ErrorKind::Serialization => (StatusCode::INTERNAL_SERVER_ERROR, "serialization"),
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: kind.into(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        let (status, body) = error_response(Error::BudgetExceeded {
            attempted: 11.0,
            limit: 10.0,
        });
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body.0.kind, "budget_exceeded");

        let (status, _) = error_response(Error::all_unavailable(vec![]));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = error_response(Error::Cache("broken".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
