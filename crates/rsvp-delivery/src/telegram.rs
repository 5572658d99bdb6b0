//! Telegram Bot API client.
//!
//! Only the two calls the notifier needs: `sendMessage` (outbound
//! notifications and command replies) and `getUpdates` (long polling for
//! inbound commands).
//!
//! The bot token is part of every request URL. It is never logged:
//! transport errors are stripped of their URL before they are surfaced.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{DeliveryError, MessageSender};

/// Bot API client. Cheap to clone (shares the connection pool).
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    request_timeout: Duration,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl TelegramClient {
    pub fn new(token: String, request_timeout: Duration) -> Self {
        Self::new_with_base_url(token, "https://api.telegram.org".to_string(), request_timeout)
    }

    pub fn new_with_base_url(token: String, base_url: String, request_timeout: Duration) -> Self {
        Self {
            // No client-wide timeout: long polls set their own, longer, bound.
            http: reqwest::Client::new(),
            base_url,
            token,
            request_timeout,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url.trim_end_matches('/'),
            self.token,
            method
        )
    }

    /// `sendMessage` with HTML parse mode.
    pub async fn send_message(&self, chat_id: i64, html: &str) -> Result<(), DeliveryError> {
        let body = SendMessage {
            chat_id,
            text: html,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let _: serde_json::Value = self
            .call("sendMessage", &body, self.request_timeout)
            .await?;
        Ok(())
    }

    /// `getUpdates` long poll. Blocks server-side for up to `poll_timeout`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, DeliveryError> {
        let body = GetUpdates {
            offset,
            timeout: poll_timeout.as_secs(),
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &body, poll_timeout + self.request_timeout)
            .await
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, DeliveryError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let resp = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = resp.status();
        let envelope: ApiResponse<T> = resp.json().await.map_err(|e| DeliveryError::Api {
            code: Some(i64::from(status.as_u16())),
            description: format!("undecodable response: {}", e.without_url()),
        })?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(DeliveryError::Api {
                code: error_code.or(Some(i64::from(status.as_u16()))),
                description: description.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

#[async_trait]
impl MessageSender for TelegramClient {
    fn platform_name(&self) -> &'static str {
        "telegram"
    }

    async fn send_text(&self, chat_id: i64, html: &str) -> Result<(), DeliveryError> {
        self.send_message(chat_id, html).await
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout(timeout)
    } else {
        DeliveryError::Transport(err.without_url().to_string())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

/// One inbound update. Only text messages are of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}
