//! Budget alert vocabulary shared by the dispatcher and its listeners.
//!
//! An alert is published when cumulative spend crosses one of the configured
//! percentage thresholds for the first time in a budget period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which threshold fired. Doubles as the payload `severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Urgent,
    Critical,
}

impl AlertLevel {
    /// Highest first, the order thresholds are evaluated in.
    pub const DESCENDING: [AlertLevel; 3] = [Self::Critical, Self::Urgent, Self::Warning];

    pub fn event(self) -> AlertEvent {
        match self {
            Self::Warning => AlertEvent::Warning,
            Self::Urgent => AlertEvent::Urgent,
            Self::Critical => AlertEvent::Exceeded,
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Urgent => write!(f, "urgent"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Event name carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEvent {
    Warning,
    Urgent,
    Exceeded,
}

/// Budget figures at the moment a threshold fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlertData {
    pub daily_limit: f64,
    pub used: f64,
    pub remaining: f64,
    pub percentage: f64,
    pub reset_at: DateTime<Utc>,
}

/// The payload delivered to every alert listener (and webhook).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub event: AlertEvent,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertLevel,
    pub data: BudgetAlertData,
}

impl AlertPayload {
    pub fn new(level: AlertLevel, timestamp: DateTime<Utc>, data: BudgetAlertData) -> Self {
        Self {
            event: level.event(),
            timestamp,
            severity: level,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_maps_to_exceeded_event() {
        assert_eq!(AlertLevel::Critical.event(), AlertEvent::Exceeded);
        assert_eq!(AlertLevel::Urgent.event(), AlertEvent::Urgent);
    }

    #[test]
    fn payload_serializes_snake_case() {
        let payload = AlertPayload::new(
            AlertLevel::Critical,
            Utc::now(),
            BudgetAlertData {
                daily_limit: 10.0,
                used: 10.5,
                remaining: -0.5,
                percentage: 105.0,
                reset_at: Utc::now(),
            },
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "exceeded");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["data"]["daily_limit"], 10.0);
    }
}
