//! Scenario: a restart resumes from the persisted cursor.
//!
//! # Invariants under test
//!
//! 1. With no cursor file, every record counts as new (epoch default).
//! 2. After a tick, the cursor file holds the last acknowledged timestamp.
//! 3. A fresh engine over a fresh store reading the same cursor file
//!    delivers only records created after it; nothing is re-notified.
//! 4. A corrupt cursor file aborts the tick instead of resetting to epoch.

use std::sync::Arc;
use std::time::Duration;

use rsvp_reconcile::{ReconcileEngine, TickOutcome};
use rsvp_schemas::{NewGuest, NotifyCursor, Recipient};
use rsvp_store::{CursorStore, FileCursorStore};
use rsvp_testkit::{scripted_channel, MemoryGuestStore};

const BRIDE: i64 = 100;
const ADMIN: i64 = 200;

fn recipients() -> Vec<Recipient> {
    vec![Recipient::bride(BRIDE), Recipient::admin(ADMIN)]
}

/// Same inserts produce the same ids and timestamps in every fresh store.
async fn seed(store: &MemoryGuestStore, names: &[&str]) {
    for n in names {
        store.insert(NewGuest::attending(n)).await;
    }
}

#[tokio::test]
async fn restart_delivers_only_records_after_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rsvp_cursor.json");

    // First process lifetime.
    let store = Arc::new(MemoryGuestStore::cursor(Arc::new(FileCursorStore::new(
        &path,
    ))));
    seed(&store, &["Anna", "Boris"]).await;
    let (channel, sender) = scripted_channel();
    let mut engine =
        ReconcileEngine::new(store.clone(), channel, recipients(), Duration::from_secs(5));

    let first = engine.tick().await;
    assert_eq!(first.acknowledged, vec![1, 2]);
    assert_eq!(sender.sent().await.len(), 4);
    let boris = store.record(2).await.unwrap();
    let persisted = FileCursorStore::new(&path).load().await.unwrap();
    assert_eq!(persisted, NotifyCursor::at(boris.created_at));
    drop(engine);

    // Second lifetime: new store contents include a new guest.
    let store = Arc::new(MemoryGuestStore::cursor(Arc::new(FileCursorStore::new(
        &path,
    ))));
    seed(&store, &["Anna", "Boris", "Clara"]).await;
    let (channel, sender) = scripted_channel();
    let mut engine =
        ReconcileEngine::new(store.clone(), channel, recipients(), Duration::from_secs(5));

    let second = engine.tick().await;
    assert_eq!(second.fetched, 1);
    assert_eq!(second.acknowledged, vec![3]);
    let sent = sender.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.text.contains("Clara")));
}

#[tokio::test]
async fn corrupt_cursor_aborts_instead_of_resetting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rsvp_cursor.json");
    std::fs::write(&path, b"{not json").unwrap();

    let store = Arc::new(MemoryGuestStore::cursor(Arc::new(FileCursorStore::new(
        &path,
    ))));
    seed(&store, &["Anna"]).await;
    let (channel, sender) = scripted_channel();
    let mut engine =
        ReconcileEngine::new(store.clone(), channel, recipients(), Duration::from_secs(5));

    let report = engine.tick().await;

    match &report.outcome {
        TickOutcome::Aborted { kind, .. } => assert_eq!(*kind, "store_rejected"),
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(sender.attempts().await.is_empty());
}
