//! rsvp-reconcile
//!
//! The notification loop: fetch pending records, fan each one out to every
//! recipient, acknowledge only what every recipient received.
//!
//! Rules enforced by [`ReconcileEngine::tick`]:
//! - Records are processed in store order (`created_at`, then `id`).
//! - A record is acknowledged only after every recipient reported
//!   `Delivered`. The first incomplete delivery halts the tick unless the
//!   [`RetryPolicy`] dead-letters it.
//! - Flag-mode stores are acknowledged per record, cursor-mode stores once
//!   per tick with the delivered prefix. A cursor never passes a
//!   dead-lettered record: in cursor mode a dead letter ends the prefix.
//! - Any transient store failure aborts the tick; the next tick starts from
//!   whatever state the store holds.

mod engine;
mod policy;
mod types;

pub use engine::ReconcileEngine;
pub use policy::{AttemptLedger, FailureDecision, RetryPolicy};
pub use types::{TickOutcome, TickPhase, TickReport, TickStage};
