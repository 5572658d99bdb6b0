//! In-process fakes for the notifier's two IO seams.
//!
//! - [`MemoryGuestStore`]: a [`RecordStore`] + [`GuestDirectory`] over a
//!   `Vec`, in either flag mode or cursor mode, with scripted store faults.
//! - [`ScriptedSender`]: a [`MessageSender`] that logs every message and
//!   fails sends to chosen chats on demand. Wrap it in
//!   [`rsvp_delivery::FanoutChannel`] so real formatting is exercised.
//!
//! No network, no database, deterministic timestamps.

mod sender;
mod store;

pub use sender::{ScriptedSender, SentMessage};
pub use store::{MemoryGuestStore, StoreMode};

use std::sync::Arc;
use std::time::Duration;

use rsvp_delivery::FanoutChannel;

/// Fan-out channel over a scripted sender plus a handle to that sender.
pub fn scripted_channel() -> (Arc<FanoutChannel<ScriptedSender>>, ScriptedSender) {
    let sender = ScriptedSender::new();
    let channel = Arc::new(FanoutChannel::new(sender.clone(), Duration::from_secs(1)));
    (channel, sender)
}

// Re-exported so scenario tests only need this crate for the seams.
pub use rsvp_delivery::{DeliveryChannel, MessageSender};
pub use rsvp_store::{GuestDirectory, RecordStore};
