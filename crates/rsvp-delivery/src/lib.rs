//! rsvp-delivery
//!
//! Outbound side of the notifier: turns a [`GuestRecord`] into one message
//! and pushes it to every configured [`Recipient`].
//!
//! Layering:
//! - [`MessageSender`]: "send this text to this chat", one platform call.
//! - [`FanoutChannel`]: the [`DeliveryChannel`] used in production; formats
//!   once, sends to each recipient independently, never short-circuits, and
//!   reports one [`DeliveryOutcome`] per recipient.
//! - [`telegram::TelegramClient`]: the Bot API `MessageSender`.

pub mod format;
pub mod telegram;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rsvp_schemas::{GuestRecord, Recipient};

pub use telegram::TelegramClient;

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Failure of a single send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network or transport failure (connect, reset, TLS).
    Transport(String),
    /// The platform answered with an application-level error.
    Api { code: Option<i64>, description: String },
    /// The call exceeded its time bound.
    Timeout(Duration),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Transport(msg) => write!(f, "transport error: {msg}"),
            DeliveryError::Api {
                code: Some(c),
                description,
            } => write!(f, "messaging api error code={c}: {description}"),
            DeliveryError::Api {
                code: None,
                description,
            } => write!(f, "messaging api error: {description}"),
            DeliveryError::Timeout(d) => write!(f, "timed out after {}ms", d.as_millis()),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Result of delivering one record to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientResult {
    pub recipient: Recipient,
    pub outcome: DeliveryOutcome,
}

/// Per-recipient results for one record, in recipient order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyReport {
    pub record_id: i64,
    pub results: Vec<RecipientResult>,
}

impl NotifyReport {
    /// True only when every recipient confirmed delivery. An empty recipient
    /// list never counts as delivered.
    pub fn all_delivered(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.outcome.is_delivered())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Recipient, &str)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            DeliveryOutcome::Failed { reason } => Some((&r.recipient, reason.as_str())),
            DeliveryOutcome::Delivered => None,
        })
    }

    pub fn delivered_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.is_delivered())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One outbound message to one chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn platform_name(&self) -> &'static str;

    async fn send_text(&self, chat_id: i64, html: &str) -> Result<(), DeliveryError>;
}

/// Delivers a record's notification to a fixed recipient list.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Attempt every recipient; a failure for one must not prevent the rest.
    async fn notify(&self, record: &GuestRecord, recipients: &[Recipient]) -> NotifyReport;
}

// ---------------------------------------------------------------------------
// FanoutChannel
// ---------------------------------------------------------------------------

/// Formats a record once and sends it to each recipient in order.
///
/// Every send is bounded by `send_timeout`; an elapsed timeout is reported as
/// `Failed` for that recipient only. Messages already sent are never recalled.
pub struct FanoutChannel<S> {
    sender: S,
    send_timeout: Duration,
}

impl<S: MessageSender> FanoutChannel<S> {
    pub fn new(sender: S, send_timeout: Duration) -> Self {
        Self {
            sender,
            send_timeout,
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }
}

#[async_trait]
impl<S: MessageSender> DeliveryChannel for FanoutChannel<S> {
    async fn notify(&self, record: &GuestRecord, recipients: &[Recipient]) -> NotifyReport {
        let text = format::notification_text(record);
        let mut results = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let sent = tokio::time::timeout(
                self.send_timeout,
                self.sender.send_text(recipient.chat_id, &text),
            )
            .await
            .unwrap_or(Err(DeliveryError::Timeout(self.send_timeout)));

            let outcome = match sent {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(e) => {
                    tracing::warn!(
                        record_id = record.id,
                        recipient = %recipient,
                        platform = self.sender.platform_name(),
                        reason = %e,
                        "delivery failed"
                    );
                    DeliveryOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            results.push(RecipientResult {
                recipient: *recipient,
                outcome,
            });
        }

        NotifyReport {
            record_id: record.id,
            results,
        }
    }
}
