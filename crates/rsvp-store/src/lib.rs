//! rsvp-store
//!
//! Record store boundary for the notifier.
//!
//! The reconcile engine only ever sees [`RecordStore`] ("what is pending",
//! "mark these processed") and the command surface only sees
//! [`GuestDirectory`] ("who is attending"). Two backends implement both:
//!
//! - [`PgGuestStore`]: direct Postgres access; acknowledgment is the per-row
//!   `notified` flag, applied one record at a time.
//! - [`HttpGuestStore`]: remote guest API; "pending" means created after a
//!   persisted [`NotifyCursor`](rsvp_schemas::NotifyCursor), acknowledged in
//!   batches.
//!
//! Failures are typed as [`StoreError`] so retry policy is a function of the
//! error kind, not of where it was raised.

pub mod cursor;
pub mod http;
pub mod pg;

use std::fmt;

use async_trait::async_trait;
use rsvp_schemas::GuestRecord;

pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use http::{HttpGuestStore, API_KEY_HEADER};
pub use pg::PgGuestStore;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure of a store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient I/O, network, timeout or pool exhaustion. Retry next tick.
    Unavailable(String),
    /// The store refused the request as structurally invalid. Retrying the
    /// same request will not help.
    Rejected(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "store_unavailable",
            StoreError::Rejected(_) => "store_rejected",
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Rejected(msg) => write!(f, "store rejected request: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

/// How a backend wants acknowledgments delivered by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge each record right after its delivery succeeded.
    PerRecord,
    /// Acknowledge the contiguous run of delivered records once, at the end
    /// of the tick (advances a cursor).
    Batch,
}

/// Pending-record source and acknowledgment sink used by the reconcile engine.
///
/// Implementations must be `Send + Sync` so one instance can be shared
/// between the scheduler task and the command handler.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend identifier for logs (e.g. `"postgres"`).
    fn backend_name(&self) -> &'static str;

    fn ack_mode(&self) -> AckMode;

    /// Records not yet acknowledged, ascending by `created_at` then `id`.
    async fn fetch_pending(&self) -> Result<Vec<GuestRecord>, StoreError>;

    /// Mark `records` processed.
    ///
    /// Must be idempotent: acknowledging an already-acknowledged record, or
    /// an overlapping set, is not an error and changes nothing.
    async fn acknowledge(&self, records: &[GuestRecord]) -> Result<(), StoreError>;
}

/// Read-only view used by the `guests` command.
#[async_trait]
pub trait GuestDirectory: Send + Sync {
    /// Guests with `attending = true`, ascending by `created_at`.
    async fn list_attending(&self) -> Result<Vec<GuestRecord>, StoreError>;
}
