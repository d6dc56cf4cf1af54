//! Spend tracking for Tollgate.
//!
//! The [`BudgetLedger`] enforces a daily USD ceiling that resets at UTC
//! midnight, the [`AlertDispatcher`] turns threshold crossings into typed
//! alerts for its listeners, and the [`PricingTable`] turns token counts
//! into cost.

pub mod alerts;
pub mod ledger;
pub mod model;
pub mod pricing;

pub use alerts::{AlertDispatcher, AlertListener, ListenerError, ListenerId};
pub use ledger::{BudgetLedger, BudgetReservation, next_utc_midnight};
pub use model::{AlertThresholds, BudgetStatus};
pub use pricing::{ModelPricing, PricingTable};
