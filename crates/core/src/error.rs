//! Error types for the Tollgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The gateway surfaces a
//! single tagged [`Error`]; individual backend faults are [`BackendError`]s
//! that only reach callers aggregated inside `Error::ProviderUnavailable`.

use thiserror::Error;

/// The top-level error type for all gateway operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Construction ---
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // --- Budget ---
    /// `attempted` is the projected total (`used + cost`), not the pre-spend usage.
    #[error(
        "Daily budget exceeded: ${attempted:.2} / ${limit:.2}. Enable local fallback to \
         continue with free local models, or increase your daily budget."
    )]
    BudgetExceeded { attempted: f64, limit: f64 },

    // --- Backends ---
    #[error("Provider unavailable: {provider}. {}", describe_failures(.failures))]
    ProviderUnavailable {
        provider: String,
        failures: Vec<BackendFailure>,
    },

    // --- Cache ---
    #[error("Cache error: {0}")]
    Cache(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Fieldless discriminant of [`Error`], handy for matching in callers and
/// for mapping onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    BudgetExceeded,
    ProviderUnavailable,
    Cache,
    Serialization,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Aggregate of every per-backend failure recorded during one request.
    pub fn all_unavailable(failures: Vec<BackendFailure>) -> Self {
        Self::ProviderUnavailable {
            provider: "all".into(),
            failures,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::Cache(_) => ErrorKind::Cache,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub fn is_budget_exceeded(&self) -> bool {
        self.kind() == ErrorKind::BudgetExceeded
    }
}

fn describe_failures(failures: &[BackendFailure]) -> String {
    if failures.is_empty() {
        return "No providers configured. Add at least one remote provider or enable local fallback."
            .into();
    }
    let details: Vec<String> = failures.iter().map(ToString::to_string).collect();
    format!("All providers failed. Errors: {}", details.join("; "))
}

/// One backend's contribution to an aggregated `ProviderUnavailable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub backend: String,
    pub message: String,
}

impl BackendFailure {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.backend, self.message)
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_error_reports_attempted_total_and_limit() {
        let err = Error::BudgetExceeded {
            attempted: 11.0,
            limit: 10.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("$11.00"));
        assert!(msg.contains("$10.00"));
        assert!(err.is_budget_exceeded());
    }

    #[test]
    fn unavailable_aggregates_every_failure() {
        let err = Error::all_unavailable(vec![
            BackendFailure::new("openai", "Network error: conn refused"),
            BackendFailure::new("ollama", "Backend not available: not running"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("openai: Network error: conn refused"));
        assert!(msg.contains("ollama: Backend not available"));
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn unavailable_without_failures_mentions_configuration() {
        let err = Error::all_unavailable(vec![]);
        assert!(err.to_string().contains("No providers configured"));
    }

    #[test]
    fn backend_error_displays_correctly() {
        let err = BackendError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }
}
