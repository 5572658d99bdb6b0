use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use rsvp_delivery::{DeliveryError, MessageSender};
use tokio::sync::Mutex;

/// One message accepted by [`ScriptedSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Default)]
struct Script {
    sent: Vec<SentMessage>,
    attempts: Vec<i64>,
    fail_next: HashMap<i64, u32>,
    fail_always: HashSet<i64>,
    fail_matching: Vec<(i64, String)>,
}

/// Messaging platform stand-in.
///
/// Clones share state, so a test can keep one handle while the channel owns
/// another. Failed sends are recorded in [`attempts`](Self::attempts) but not
/// in [`sent`](Self::sent).
#[derive(Clone, Default)]
pub struct ScriptedSender {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends to `chat_id`.
    pub async fn fail_next(&self, chat_id: i64, n: u32) {
        *self.script.lock().await.fail_next.entry(chat_id).or_insert(0) += n;
    }

    /// Fail every send to `chat_id` until [`heal`](Self::heal).
    pub async fn fail_always(&self, chat_id: i64) {
        self.script.lock().await.fail_always.insert(chat_id);
    }

    /// Fail every send to `chat_id` whose text contains `needle`, so one
    /// record can be made to fail while others in the same tick succeed.
    pub async fn fail_matching(&self, chat_id: i64, needle: &str) {
        self.script
            .lock()
            .await
            .fail_matching
            .push((chat_id, needle.to_string()));
    }

    /// Clear every scripted failure for `chat_id`.
    pub async fn heal(&self, chat_id: i64) {
        let mut s = self.script.lock().await;
        s.fail_always.remove(&chat_id);
        s.fail_next.remove(&chat_id);
        s.fail_matching.retain(|(c, _)| *c != chat_id);
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.script.lock().await.sent.clone()
    }

    pub async fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.script
            .lock()
            .await
            .sent
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Every chat id a send was attempted for, successful or not.
    pub async fn attempts(&self) -> Vec<i64> {
        self.script.lock().await.attempts.clone()
    }
}

#[async_trait]
impl MessageSender for ScriptedSender {
    fn platform_name(&self) -> &'static str {
        "scripted"
    }

    async fn send_text(&self, chat_id: i64, html: &str) -> Result<(), DeliveryError> {
        let mut s = self.script.lock().await;
        s.attempts.push(chat_id);

        if s.fail_always.contains(&chat_id) {
            return Err(DeliveryError::Transport(format!("chat {chat_id} unreachable")));
        }
        if s
            .fail_matching
            .iter()
            .any(|(c, needle)| *c == chat_id && html.contains(needle.as_str()))
        {
            return Err(DeliveryError::Api {
                code: Some(400),
                description: "scripted rejection".to_string(),
            });
        }
        if let Some(left) = s.fail_next.get_mut(&chat_id) {
            if *left > 0 {
                *left -= 1;
                return Err(DeliveryError::Api {
                    code: Some(500),
                    description: "scripted failure".to_string(),
                });
            }
        }

        s.sent.push(SentMessage {
            chat_id,
            text: html.to_string(),
        });
        Ok(())
    }
}
