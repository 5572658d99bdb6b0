//! Shared record types for the RSVP notifier.
//!
//! Every crate that touches a guest record (store adapters, delivery,
//! reconcile engine, daemon) speaks these types. No IO lives here.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GuestRecord
// ---------------------------------------------------------------------------

/// One RSVP submission as held by the guest-list store.
///
/// `notified` is the per-record acknowledgment flag: it flips false -> true
/// exactly once, after every configured recipient confirmed delivery, and is
/// never reset by this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub partner: Option<String>,
    #[serde(default)]
    pub wishes: Option<String>,
    #[serde(default = "default_attending")]
    pub attending: bool,
    /// Insertion timestamp; non-decreasing in insertion order.
    #[serde(rename = "created", alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub notified: bool,
}

fn default_attending() -> bool {
    true
}

impl GuestRecord {
    /// Partner name trimmed; `None` when absent or blank.
    pub fn partner_trimmed(&self) -> Option<&str> {
        non_blank(self.partner.as_deref())
    }

    /// Wishes text trimmed; `None` when absent or blank.
    pub fn wishes_trimmed(&self) -> Option<&str> {
        non_blank(self.wishes.as_deref())
    }

    /// Processing order key: `created_at`, then `id` to break ties.
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

/// Sort records into processing order (ascending `created_at`, then `id`).
pub fn sort_for_processing(records: &mut [GuestRecord]) {
    records.sort_by_key(GuestRecord::order_key);
}

// ---------------------------------------------------------------------------
// NewGuest
// ---------------------------------------------------------------------------

/// Insert payload for a guest row. Used by the CLI and the test harnesses;
/// the production submission path lives outside this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGuest {
    pub name: String,
    pub partner: Option<String>,
    pub wishes: Option<String>,
    pub attending: bool,
}

impl NewGuest {
    pub fn attending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            partner: None,
            wishes: None,
            attending: true,
        }
    }

    pub fn with_partner(mut self, partner: &str) -> Self {
        self.partner = Some(partner.to_string());
        self
    }

    pub fn with_wishes(mut self, wishes: &str) -> Self {
        self.wishes = Some(wishes.to_string());
        self
    }

    pub fn declined(mut self) -> Self {
        self.attending = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

/// Which fixed channel a recipient stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Bride,
    Admin,
}

impl RecipientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientRole::Bride => "bride",
            RecipientRole::Admin => "admin",
        }
    }
}

/// A notification destination fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub role: RecipientRole,
    /// Messaging-platform chat identifier.
    pub chat_id: i64,
}

impl Recipient {
    pub fn bride(chat_id: i64) -> Self {
        Self {
            role: RecipientRole::Bride,
            chat_id,
        }
    }

    pub fn admin(chat_id: i64) -> Self {
        Self {
            role: RecipientRole::Admin,
            chat_id,
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.role.as_str(), self.chat_id)
    }
}

// ---------------------------------------------------------------------------
// NotifyCursor
// ---------------------------------------------------------------------------

/// High-water mark for the cursor-based store variant.
///
/// Holds the `created_at` of the last record whose batch was fully processed.
/// Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyCursor {
    pub last_created_at: DateTime<Utc>,
}

impl Default for NotifyCursor {
    fn default() -> Self {
        Self::epoch()
    }
}

impl NotifyCursor {
    /// Initial cursor: the Unix epoch, so every record counts as new.
    pub fn epoch() -> Self {
        Self {
            last_created_at: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
        }
    }

    pub fn at(ts: DateTime<Utc>) -> Self {
        Self { last_created_at: ts }
    }

    /// Cursor advanced to `ts`, or unchanged when `ts` is older.
    pub fn advanced_to(self, ts: DateTime<Utc>) -> Self {
        if ts > self.last_created_at {
            Self::at(ts)
        } else {
            self
        }
    }
}
