//! Remote guest API backend (cursor variant).
//!
//! Endpoints consumed (all authenticated with [`API_KEY_HEADER`]):
//! - `GET  {base}/api/guests?after=<RFC 3339>`: records created after the cursor
//! - `GET  {base}/api/guests?attending=yes`: confirmed guests
//! - `POST {base}/api/guests/mark_notified` with `{"ids": [..]}`
//!
//! Acknowledgment order: the server-side mark comes first, the local cursor
//! second. A crash between the two re-delivers the batch on restart (never
//! loses it). Records the server already reports as `notified` are skipped,
//! which keeps a lost cursor file from turning into a re-notification storm.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::StatusCode;
use rsvp_schemas::{sort_for_processing, GuestRecord, NotifyCursor};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cursor::CursorStore;
use crate::{AckMode, GuestDirectory, RecordStore, StoreError};

/// Header carrying the shared static key.
pub const API_KEY_HEADER: &str = "X-API-Key";

pub struct HttpGuestStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    cursor_store: Arc<dyn CursorStore>,
    cursor: RwLock<NotifyCursor>,
}

impl std::fmt::Debug for HttpGuestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGuestStore")
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl HttpGuestStore {
    /// Build the adapter and load the persisted cursor.
    ///
    /// Fails if the cursor exists but cannot be read; starting from the epoch
    /// in that case would re-notify the whole guest list.
    pub async fn open(
        base_url: String,
        api_key: String,
        cursor_store: Arc<dyn CursorStore>,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StoreError::Rejected(format!("http client build failed: {e}")))?;
        let cursor = cursor_store.load().await?;
        tracing::info!(cursor = %cursor.last_created_at, "remote guest store opened");

        Ok(Self {
            http,
            base_url,
            api_key,
            cursor_store,
            cursor: RwLock::new(cursor),
        })
    }

    pub async fn cursor(&self) -> NotifyCursor {
        *self.cursor.read().await
    }

    fn guests_url(&self) -> String {
        format!("{}/api/guests", self.base_url.trim_end_matches('/'))
    }

    fn mark_notified_url(&self) -> String {
        format!("{}/api/guests/mark_notified", self.base_url.trim_end_matches('/'))
    }

    async fn get_guests(&self, query: &[(&str, &str)]) -> Result<Vec<GuestRecord>, StoreError> {
        let resp = self
            .http
            .get(self.guests_url())
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(classify_transport)?;

        let resp = check_status(resp).await?;
        let body: GuestsBody = resp
            .json()
            .await
            .map_err(|e| StoreError::Rejected(format!("guest list decode failed: {e}")))?;

        Ok(body.into_records())
    }
}

#[async_trait]
impl RecordStore for HttpGuestStore {
    fn backend_name(&self) -> &'static str {
        "remote_api"
    }

    fn ack_mode(&self) -> AckMode {
        AckMode::Batch
    }

    async fn fetch_pending(&self) -> Result<Vec<GuestRecord>, StoreError> {
        let cursor = self.cursor().await;
        let after = cursor
            .last_created_at
            .to_rfc3339_opts(SecondsFormat::AutoSi, true);

        let mut records = self.get_guests(&[("after", after.as_str())]).await?;
        records.retain(|r| r.created_at > cursor.last_created_at && !r.notified);
        sort_for_processing(&mut records);
        Ok(records)
    }

    async fn acknowledge(&self, records: &[GuestRecord]) -> Result<(), StoreError> {
        let Some(last) = records.iter().map(|r| r.created_at).max() else {
            return Ok(());
        };

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let resp = self
            .http
            .post(self.mark_notified_url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&MarkNotifiedBody { ids: &ids })
            .send()
            .await
            .map_err(classify_transport)?;
        check_status(resp).await?;

        let next = self.cursor().await.advanced_to(last);
        self.cursor_store.save(next).await?;
        *self.cursor.write().await = next;

        tracing::debug!(ids = ?ids, cursor = %next.last_created_at, "batch acknowledged");
        Ok(())
    }
}

#[async_trait]
impl GuestDirectory for HttpGuestStore {
    async fn list_attending(&self) -> Result<Vec<GuestRecord>, StoreError> {
        let mut records = self.get_guests(&[("attending", "yes")]).await?;
        records.retain(|r| r.attending);
        sort_for_processing(&mut records);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MarkNotifiedBody<'a> {
    ids: &'a [i64],
}

/// The API returns either a bare array or `{"guests": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GuestsBody {
    List(Vec<GuestRecord>),
    Wrapped { guests: Vec<GuestRecord> },
}

impl GuestsBody {
    fn into_records(self) -> Vec<GuestRecord> {
        match self {
            GuestsBody::List(v) => v,
            GuestsBody::Wrapped { guests } => guests,
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn classify_transport(err: reqwest::Error) -> StoreError {
    if err.is_builder() {
        StoreError::Rejected(format!("invalid request: {err}"))
    } else {
        StoreError::Unavailable(format!("guest api request failed: {err}"))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let msg = format!("guest api status={} body={}", status.as_u16(), truncate(&body, 200));
    if is_transient_status(status) {
        Err(StoreError::Unavailable(msg))
    } else {
        Err(StoreError::Rejected(msg))
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn wrapped_and_bare_bodies_decode() {
        let bare = r#"[{"id":1,"name":"A","created":"2025-06-01T10:00:00Z"}]"#;
        let wrapped = r#"{"guests":[{"id":2,"name":"B","created":"2025-06-01T10:00:00Z"}]}"#;
        let a: GuestsBody = serde_json::from_str(bare).unwrap();
        let b: GuestsBody = serde_json::from_str(wrapped).unwrap();
        assert_eq!(a.into_records()[0].id, 1);
        assert_eq!(b.into_records()[0].id, 2);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("привет", 3), "при");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
