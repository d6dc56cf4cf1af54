//! Daily spending ledger.
//!
//! Tracks spend against a daily USD ceiling that resets at UTC midnight.
//! The reset is lazy: whichever operation first observes `now >= reset_at`
//! zeroes the period and re-arms the alert thresholds.
//!
//! Two gating styles are offered. `check_budget` + `record_spending` is the
//! plain check-then-act pair (concurrent callers can jointly overshoot).
//! `reserve` holds the estimate until the returned [`BudgetReservation`] is
//! committed or dropped, so concurrent reservations never exceed the limit.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use tollgate_core::{Clock, Error, Result, SystemClock};

use crate::alerts::AlertDispatcher;
use crate::model::BudgetStatus;

/// First UTC midnight strictly after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(1)
}

#[derive(Debug)]
struct LedgerState {
    used: f64,
    reserved: f64,
    reset_at: DateTime<Utc>,
    /// Bumped on every reset so stale reservations can be recognised.
    period: u64,
}

pub struct BudgetLedger {
    daily_limit: f64,
    clock: Arc<dyn Clock>,
    alerts: Arc<AlertDispatcher>,
    state: Mutex<LedgerState>,
}

impl BudgetLedger {
    pub fn new(daily_limit: f64, alerts: Arc<AlertDispatcher>) -> Self {
        Self::with_clock(daily_limit, alerts, Arc::new(SystemClock))
    }

    pub fn with_clock(daily_limit: f64, alerts: Arc<AlertDispatcher>, clock: Arc<dyn Clock>) -> Self {
        let reset_at = next_utc_midnight(clock.now());
        Self {
            daily_limit,
            clock,
            alerts,
            state: Mutex::new(LedgerState {
                used: 0.0,
                reserved: 0.0,
                reset_at,
                period: 0,
            }),
        }
    }

    pub fn daily_limit(&self) -> f64 {
        self.daily_limit
    }

    pub fn is_unlimited(&self) -> bool {
        self.daily_limit == 0.0
    }

    pub fn alerts(&self) -> &Arc<AlertDispatcher> {
        &self.alerts
    }

    /// Start a new period if the current one is over.
    fn roll_over(&self, state: &mut LedgerState) {
        let now = self.clock.now();
        if now < state.reset_at {
            return;
        }
        info!(
            spent = state.used,
            limit = self.daily_limit,
            "Daily budget period ended, resetting"
        );
        state.used = 0.0;
        state.reserved = 0.0;
        state.reset_at = next_utc_midnight(now);
        state.period += 1;
        self.alerts.reset();
    }

    /// Would spending `cost` stay within the limit? Never mutates spend.
    pub fn check_budget(&self, cost: f64) -> Result<()> {
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        if self.is_unlimited() {
            return Ok(());
        }
        let attempted = state.used + cost;
        if attempted > self.daily_limit {
            return Err(Error::BudgetExceeded {
                attempted,
                limit: self.daily_limit,
            });
        }
        Ok(())
    }

    /// Add `cost` to the period's spend and evaluate alert thresholds.
    pub fn record_spending(&self, cost: f64) {
        self.spend(cost, None);
    }

    fn spend(&self, cost: f64, release: Option<(f64, u64)>) {
        let cost = cost.max(0.0);
        let (used, reset_at) = {
            let mut state = self.state.lock();
            self.roll_over(&mut state);
            if let Some((amount, period)) = release {
                if state.period == period {
                    state.reserved = (state.reserved - amount).max(0.0);
                }
            }
            state.used += cost;
            (state.used, state.reset_at)
        };
        debug!(cost, used, limit = self.daily_limit, "Spending recorded");
        self.alerts.check_budget(self.daily_limit, used, reset_at);
    }

    fn release(&self, amount: f64, period: u64) {
        let mut state = self.state.lock();
        if state.period == period {
            state.reserved = (state.reserved - amount).max(0.0);
        }
    }

    /// Hold `estimate` against the limit until the reservation settles.
    ///
    /// Fails with `BudgetExceeded` when `used + reserved + estimate` would
    /// pass the limit; `attempted` then includes the outstanding holds.
    pub fn reserve(self: &Arc<Self>, estimate: f64) -> Result<BudgetReservation> {
        let estimate = estimate.max(0.0);
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        if !self.is_unlimited() {
            let attempted = state.used + state.reserved + estimate;
            if attempted > self.daily_limit {
                return Err(Error::BudgetExceeded {
                    attempted,
                    limit: self.daily_limit,
                });
            }
        }
        state.reserved += estimate;
        Ok(BudgetReservation {
            ledger: Arc::clone(self),
            amount: estimate,
            period: state.period,
            settled: false,
        })
    }

    pub fn status(&self) -> BudgetStatus {
        let mut state = self.state.lock();
        self.roll_over(&mut state);
        BudgetStatus {
            daily_limit: self.daily_limit,
            used: state.used,
            remaining: if self.is_unlimited() {
                0.0
            } else {
                self.daily_limit - state.used
            },
            reserved: state.reserved,
            reset_at: state.reset_at,
        }
    }
}

/// A hold on part of the daily budget.
///
/// `commit` records the real cost and releases the hold in one step.
/// Dropping an uncommitted reservation releases it without spending.
#[must_use = "dropping a reservation releases it without recording spend"]
pub struct BudgetReservation {
    ledger: Arc<BudgetLedger>,
    amount: f64,
    period: u64,
    settled: bool,
}

impl BudgetReservation {
    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn commit(mut self, actual: f64) {
        self.settled = true;
        self.ledger.spend(actual, Some((self.amount, self.period)));
    }
}

impl Drop for BudgetReservation {
    fn drop(&mut self) {
        if !self.settled {
            self.ledger.release(self.amount, self.period);
        }
    }
}

impl std::fmt::Debug for BudgetReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetReservation")
            .field("amount", &self.amount)
            .field("period", &self.period)
            .finish()
    }
}
