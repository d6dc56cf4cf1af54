//! # Tollgate Core
//!
//! Domain types, traits, and error definitions for the Tollgate request
//! gateway. This crate has **no I/O**; it defines the vocabulary that the
//! config, telemetry, providers and gateway crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the gateway talks to is defined as a trait here
//! (`Backend`, `Clock`). Implementations live in their respective crates,
//! which keeps the orchestration pipeline testable with plain mock structs.

pub mod alert;
pub mod backend;
pub mod clock;
pub mod error;

// Re-export key types at crate root for ergonomics
pub use alert::{AlertEvent, AlertLevel, AlertPayload, BudgetAlertData};
pub use backend::{
    Backend, BackendKind, ChunkReceiver, CompletionOptions, CompletionResult, StreamChunk, Usage,
    estimate_tokens,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BackendError, BackendFailure, Error, ErrorKind, Result};
