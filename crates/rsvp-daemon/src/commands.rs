//! Inbound chat commands over Telegram long polling.
//!
//! Only two commands exist: `/start` (static help) and `/guests` (attending
//! summary). Anything else, including plain text, is ignored. Commands may
//! carry a `@botname` suffix as sent by group chats.
//!
//! The command path reads through [`GuestDirectory`] only, so it never waits
//! on the reconcile loop.

use std::sync::Arc;
use std::time::Duration;

use rsvp_delivery::{format, telegram::Update, DeliveryError, TelegramClient};
use rsvp_store::GuestDirectory;
use tokio::sync::watch;

/// Server-side long-poll window for `getUpdates`.
pub const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Back-off after a failed `getUpdates` call.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Guests,
}

/// Parse the leading token of a message. `None` for non-commands and for
/// commands this bot does not handle.
pub fn parse_command(text: &str) -> Option<Command> {
    let token = text.split_whitespace().next()?;
    let name = token.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    match name {
        "start" => Some(Command::Start),
        "guests" => Some(Command::Guests),
        _ => None,
    }
}

/// Reply text for `cmd`. Store failures produce a generic notice, never an
/// error to the caller.
pub async fn reply_for(
    cmd: Command,
    directory: &dyn GuestDirectory,
    call_timeout: Duration,
) -> String {
    match cmd {
        Command::Start => format::START_TEXT.to_string(),
        Command::Guests => {
            let listed = tokio::time::timeout(call_timeout, directory.list_attending()).await;
            match listed {
                Ok(Ok(attending)) => format::guest_summary(&attending),
                Ok(Err(e)) => {
                    tracing::warn!(reason = %e, "guest list unavailable");
                    format::STORE_FAILURE_TEXT.to_string()
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = call_timeout.as_millis() as u64,
                        "guest list timed out"
                    );
                    format::STORE_FAILURE_TEXT.to_string()
                }
            }
        }
    }
}

/// Long-polling command handler.
pub struct CommandLoop {
    client: TelegramClient,
    directory: Arc<dyn GuestDirectory>,
    call_timeout: Duration,
    poll_timeout: Duration,
}

impl CommandLoop {
    pub fn new(
        client: TelegramClient,
        directory: Arc<dyn GuestDirectory>,
        call_timeout: Duration,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            client,
            directory,
            call_timeout,
            poll_timeout,
        }
    }

    /// Fetch one batch of updates starting at `offset`, answer every command
    /// in it, and return the offset for the next call.
    pub async fn poll_once(&self, offset: Option<i64>) -> Result<Option<i64>, DeliveryError> {
        let updates = self.client.get_updates(offset, self.poll_timeout).await?;
        let mut next = offset;
        for update in updates {
            next = Some(update.update_id + 1);
            self.handle(update).await;
        }
        Ok(next)
    }

    async fn handle(&self, update: Update) {
        let Some(msg) = update.message else {
            return;
        };
        let Some(cmd) = msg.text.as_deref().and_then(parse_command) else {
            return;
        };

        let reply = reply_for(cmd, self.directory.as_ref(), self.call_timeout).await;
        if let Err(e) = self.client.send_message(msg.chat.id, &reply).await {
            tracing::warn!(chat_id = msg.chat.id, command = ?cmd, reason = %e, "reply failed");
        } else {
            tracing::debug!(chat_id = msg.chat.id, command = ?cmd, "command answered");
        }
    }

    /// Poll until `shutdown` flips to `true`. Poll errors are logged and
    /// retried after a short back-off.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut offset = None;
        loop {
            tokio::select! {
                polled = self.poll_once(offset) => match polled {
                    Ok(next) => offset = next,
                    Err(e) => {
                        tracing::warn!(reason = %e, "getUpdates failed");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("command loop stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_suffixed_commands() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/guests"), Some(Command::Guests));
        assert_eq!(parse_command("/guests@wedding_bot"), Some(Command::Guests));
        assert_eq!(parse_command("  /start extra words"), Some(Command::Start));
    }

    #[test]
    fn ignores_text_and_unknown_commands() {
        assert_eq!(parse_command("guests"), None);
        assert_eq!(parse_command("/help"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("hello /guests"), None);
    }
}
