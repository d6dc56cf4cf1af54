//! Data model for budget status and alert thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_core::AlertLevel;

// ── Budget ────────────────────────────────────────────────────────────────

/// A point-in-time view of the daily budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Ceiling in USD (0 = unlimited).
    pub daily_limit: f64,
    /// Spent so far this period.
    pub used: f64,
    /// `daily_limit - used`; reported as 0 when the budget is unlimited.
    pub remaining: f64,
    /// Amount held by in-flight requests.
    pub reserved: f64,
    /// Next UTC midnight.
    pub reset_at: DateTime<Utc>,
}

impl BudgetStatus {
    /// Percent of the limit consumed, 0 when unlimited.
    pub fn percentage(&self) -> f64 {
        if self.daily_limit == 0.0 {
            0.0
        } else {
            self.used / self.daily_limit * 100.0
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.daily_limit == 0.0
    }
}

// ── Alerts ────────────────────────────────────────────────────────────────

/// Percent-of-limit thresholds, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub warning: f64,
    pub urgent: f64,
    pub critical: f64,
}

impl AlertThresholds {
    pub fn new(warning: f64, urgent: f64, critical: f64) -> Self {
        Self {
            warning,
            urgent,
            critical,
        }
    }

    pub fn percent_for(&self, level: AlertLevel) -> f64 {
        match level {
            AlertLevel::Warning => self.warning,
            AlertLevel::Urgent => self.urgent,
            AlertLevel::Critical => self.critical,
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self::new(50.0, 80.0, 100.0)
    }
}
