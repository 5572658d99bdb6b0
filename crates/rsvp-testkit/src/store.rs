use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rsvp_schemas::{sort_for_processing, GuestRecord, NewGuest};
use rsvp_store::{AckMode, CursorStore, GuestDirectory, RecordStore, StoreError};
use tokio::sync::Mutex;

/// Which acknowledgment variant the fake emulates.
#[derive(Clone)]
pub enum StoreMode {
    /// Per-record `notified` flag, acknowledged one record at a time.
    Flag,
    /// Cursor over `created_at`, acknowledged in batches. Pending is decided
    /// by the cursor alone, so a lost cursor re-exposes everything. The cursor
    /// lives in the given store so restarts can be simulated by sharing it.
    Cursor(Arc<dyn CursorStore>),
}

#[derive(Default)]
struct Inner {
    rows: Vec<GuestRecord>,
    next_id: i64,
    fetch_faults: VecDeque<StoreError>,
    ack_faults: VecDeque<StoreError>,
    ack_calls: Vec<Vec<i64>>,
    fetch_calls: u32,
}

/// In-memory guest table implementing both store traits.
///
/// Ids start at 1; each insert is stamped one second after the previous one
/// so `created_at` is strictly increasing unless [`insert_at`] is used.
///
/// [`insert_at`]: MemoryGuestStore::insert_at
pub struct MemoryGuestStore {
    mode: StoreMode,
    base: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl MemoryGuestStore {
    pub fn flag() -> Self {
        Self::with_mode(StoreMode::Flag)
    }

    pub fn cursor(cursor: Arc<dyn CursorStore>) -> Self {
        Self::with_mode(StoreMode::Cursor(cursor))
    }

    pub fn with_mode(mode: StoreMode) -> Self {
        Self {
            mode,
            base: Utc
                .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
                .single()
                .unwrap_or_default(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Insert with the next sequential timestamp. Returns the stored record.
    pub async fn insert(&self, guest: NewGuest) -> GuestRecord {
        let mut inner = self.inner.lock().await;
        let created_at = self.base + Duration::seconds(inner.next_id);
        push_row(&mut inner, guest, created_at)
    }

    /// Insert with an explicit timestamp (for tie scenarios).
    pub async fn insert_at(&self, guest: NewGuest, created_at: DateTime<Utc>) -> GuestRecord {
        let mut inner = self.inner.lock().await;
        push_row(&mut inner, guest, created_at)
    }

    pub async fn record(&self, id: i64) -> Option<GuestRecord> {
        let inner = self.inner.lock().await;
        inner.rows.iter().find(|r| r.id == id).cloned()
    }

    pub async fn is_notified(&self, id: i64) -> bool {
        self.record(id).await.map(|r| r.notified).unwrap_or(false)
    }

    /// Ids passed to each `acknowledge` call, in call order.
    pub async fn ack_calls(&self) -> Vec<Vec<i64>> {
        self.inner.lock().await.ack_calls.clone()
    }

    pub async fn fetch_calls(&self) -> u32 {
        self.inner.lock().await.fetch_calls
    }

    /// Fail the next `fetch_pending` call with `err`. Queued faults are
    /// consumed in order.
    pub async fn fail_next_fetch(&self, err: StoreError) {
        self.inner.lock().await.fetch_faults.push_back(err);
    }

    /// Fail the next `acknowledge` call with `err`. The failed call is still
    /// logged in [`ack_calls`](Self::ack_calls) but changes nothing.
    pub async fn fail_next_ack(&self, err: StoreError) {
        self.inner.lock().await.ack_faults.push_back(err);
    }
}

fn push_row(inner: &mut Inner, guest: NewGuest, created_at: DateTime<Utc>) -> GuestRecord {
    inner.next_id += 1;
    let row = GuestRecord {
        id: inner.next_id,
        name: guest.name,
        partner: guest.partner,
        wishes: guest.wishes,
        attending: guest.attending,
        created_at,
        notified: false,
    };
    inner.rows.push(row.clone());
    row
}

#[async_trait]
impl RecordStore for MemoryGuestStore {
    fn backend_name(&self) -> &'static str {
        match self.mode {
            StoreMode::Flag => "memory_flag",
            StoreMode::Cursor(_) => "memory_cursor",
        }
    }

    fn ack_mode(&self) -> AckMode {
        match self.mode {
            StoreMode::Flag => AckMode::PerRecord,
            StoreMode::Cursor(_) => AckMode::Batch,
        }
    }

    async fn fetch_pending(&self) -> Result<Vec<GuestRecord>, StoreError> {
        let after = match &self.mode {
            StoreMode::Flag => None,
            StoreMode::Cursor(c) => Some(c.load().await?.last_created_at),
        };

        let mut inner = self.inner.lock().await;
        inner.fetch_calls += 1;
        if let Some(err) = inner.fetch_faults.pop_front() {
            return Err(err);
        }

        let mut pending: Vec<GuestRecord> = inner
            .rows
            .iter()
            .filter(|r| match after {
                Some(ts) => r.created_at > ts,
                None => !r.notified,
            })
            .cloned()
            .collect();
        sort_for_processing(&mut pending);
        Ok(pending)
    }

    async fn acknowledge(&self, records: &[GuestRecord]) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.lock().await;
            inner.ack_calls.push(records.iter().map(|r| r.id).collect());
            if let Some(err) = inner.ack_faults.pop_front() {
                return Err(err);
            }
            for row in inner.rows.iter_mut() {
                if records.iter().any(|r| r.id == row.id) {
                    row.notified = true;
                }
            }
        }

        if let StoreMode::Cursor(c) = &self.mode {
            if let Some(max) = records.iter().map(|r| r.created_at).max() {
                let current = c.load().await?;
                c.save(current.advanced_to(max)).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GuestDirectory for MemoryGuestStore {
    async fn list_attending(&self) -> Result<Vec<GuestRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut attending: Vec<GuestRecord> =
            inner.rows.iter().filter(|r| r.attending).cloned().collect();
        sort_for_processing(&mut attending);
        Ok(attending)
    }
}
