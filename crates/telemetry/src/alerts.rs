//! Budget threshold alerts with typed, failure-isolated fan-out.
//!
//! The dispatcher decides *whether* a threshold fired (at most once per
//! budget period, highest crossed threshold wins) and then hands the payload
//! to every subscribed listener. A listener that errors or panics is logged
//! and skipped; it never blocks the others and never reaches the caller.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{info, warn};

use chrono::{DateTime, Utc};
use tollgate_core::{AlertLevel, AlertPayload, BudgetAlertData, Clock, SystemClock};

use crate::model::AlertThresholds;

/// Handle returned by [`AlertDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Errors a listener may report. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Receives every fired alert.
pub trait AlertListener: Send + Sync {
    fn on_alert(&self, alert: &AlertPayload) -> Result<(), ListenerError>;
}

impl<F> AlertListener for F
where
    F: Fn(&AlertPayload) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_alert(&self, alert: &AlertPayload) -> Result<(), ListenerError> {
        self(alert)
    }
}

#[derive(Default)]
struct DispatcherState {
    fired: HashSet<AlertLevel>,
    listeners: Vec<(ListenerId, Arc<dyn AlertListener>)>,
    next_id: u64,
}

pub struct AlertDispatcher {
    thresholds: AlertThresholds,
    clock: Arc<dyn Clock>,
    state: Mutex<DispatcherState>,
}

impl AlertDispatcher {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self::with_clock(thresholds, Arc::new(SystemClock))
    }

    pub fn with_clock(thresholds: AlertThresholds, clock: Arc<dyn Clock>) -> Self {
        Self {
            thresholds,
            clock,
            state: Mutex::new(DispatcherState::default()),
        }
    }

    pub fn thresholds(&self) -> AlertThresholds {
        self.thresholds
    }

    /// Evaluate spend against the thresholds and fire at most one alert.
    ///
    /// Returns the payload that was dispatched, if any.
    pub fn check_budget(
        &self,
        limit: f64,
        used: f64,
        reset_at: DateTime<Utc>,
    ) -> Option<AlertPayload> {
        if limit == 0.0 {
            return None;
        }

        let percentage = used / limit * 100.0;

        let (payload, listeners) = {
            let mut state = self.state.lock();
            let level = AlertLevel::DESCENDING.into_iter().find(|level| {
                percentage >= self.thresholds.percent_for(*level) && !state.fired.contains(level)
            })?;
            state.fired.insert(level);

            let payload = AlertPayload::new(
                level,
                self.clock.now(),
                BudgetAlertData {
                    daily_limit: limit,
                    used,
                    remaining: limit - used,
                    percentage,
                    reset_at,
                },
            );
            let listeners: Vec<Arc<dyn AlertListener>> =
                state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (payload, listeners)
        };

        info!(
            level = %payload.severity,
            used,
            limit,
            percentage,
            "Budget threshold crossed"
        );
        Self::dispatch(&payload, &listeners);
        Some(payload)
    }

    fn dispatch(payload: &AlertPayload, listeners: &[Arc<dyn AlertListener>]) {
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_alert(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Alert listener failed"),
                Err(_) => warn!("Alert listener panicked"),
            }
        }
    }

    /// Forget which thresholds fired (called when the budget period rolls over).
    pub fn reset(&self) {
        self.state.lock().fired.clear();
    }

    /// Thresholds that already fired this period.
    pub fn fired(&self) -> Vec<AlertLevel> {
        let state = self.state.lock();
        AlertLevel::DESCENDING
            .into_iter()
            .filter(|level| state.fired.contains(level))
            .collect()
    }

    pub fn subscribe(&self, listener: Arc<dyn AlertListener>) -> ListenerId {
        let mut state = self.state.lock();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(lid, _)| *lid != id);
        state.listeners.len() < before
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new(AlertThresholds::default())
    }
}
