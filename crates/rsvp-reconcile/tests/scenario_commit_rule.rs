//! Scenario: a record is acknowledged only after every recipient got it.
//!
//! # Invariants under test
//!
//! 1. With both recipients reachable, a pending record is delivered to both
//!    and its `notified` flag flips to true in the same tick.
//! 2. The delivered text carries guest name, attendance, partner and
//!    wishes (blank wishes render as `None`).
//! 3. One failing recipient leaves the record unacknowledged, the other
//!    recipient is still attempted, and no later record is touched.
//! 4. A record that keeps failing is retried on later ticks until it is
//!    acknowledged (at-least-once); duplicates go only to recipients that
//!    already succeeded.
//! 5. Acknowledging an already acknowledged record is unobservable.
//!
//! All tests are in-process over the testkit fakes.

use std::sync::Arc;
use std::time::Duration;

use rsvp_reconcile::{ReconcileEngine, TickOutcome};
use rsvp_schemas::{NewGuest, Recipient};
use rsvp_testkit::{scripted_channel, MemoryGuestStore, RecordStore};

const BRIDE: i64 = 100;
const ADMIN: i64 = 200;

fn recipients() -> Vec<Recipient> {
    vec![Recipient::bride(BRIDE), Recipient::admin(ADMIN)]
}

// ---------------------------------------------------------------------------
// 1 + 2. Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anna_reaches_both_recipients_and_is_acknowledged() {
    let store = Arc::new(MemoryGuestStore::flag());
    let (channel, sender) = scripted_channel();
    let anna = store
        .insert(
            NewGuest::attending("Anna")
                .with_partner("Ivan")
                .with_wishes(""),
        )
        .await;

    let mut engine =
        ReconcileEngine::new(store.clone(), channel, recipients(), Duration::from_secs(5));
    let report = engine.tick().await;

    assert_eq!(report.outcome, TickOutcome::Completed);
    assert_eq!(report.acknowledged, vec![anna.id]);
    assert!(store.is_notified(anna.id).await);

    for chat in [BRIDE, ADMIN] {
        let msgs = sender.sent_to(chat).await;
        assert_eq!(msgs.len(), 1, "chat {chat} should get exactly one message");
        for needle in [
            "Guest: Anna",
            "Attending: Yes",
            "Partner: Ivan",
            "Wishes: None",
        ] {
            assert!(msgs[0].contains(needle), "missing {needle:?} in {}", msgs[0]);
        }
    }

    let again = engine.tick().await;
    assert_eq!(again.outcome, TickOutcome::Idle);
    assert_eq!(sender.sent().await.len(), 2, "nothing re-sent after ack");
}

// ---------------------------------------------------------------------------
// 3. No premature acknowledgment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_failing_recipient_blocks_ack_and_later_records() {
    let store = Arc::new(MemoryGuestStore::flag());
    let (channel, sender) = scripted_channel();
    let r = store.insert(NewGuest::attending("Anna")).await;
    let later = store.insert(NewGuest::attending("Boris")).await;
    sender.fail_always(ADMIN).await;

    let mut engine =
        ReconcileEngine::new(store.clone(), channel, recipients(), Duration::from_secs(5));
    let report = engine.tick().await;

    assert_eq!(report.outcome, TickOutcome::DeliveryHalted { record_id: r.id });
    assert!(report.acknowledged.is_empty());
    assert_eq!(report.delivery_failures, 1);
    assert!(!store.is_notified(r.id).await);
    assert!(!store.is_notified(later.id).await);
    assert!(store.ack_calls().await.is_empty());

    // Each recipient attempted once for Anna; Boris never attempted.
    assert_eq!(sender.attempts().await, vec![BRIDE, ADMIN]);
    assert!(sender
        .sent()
        .await
        .iter()
        .all(|m| !m.text.contains("Boris")));
}

// ---------------------------------------------------------------------------
// 4. At-least-once under transient failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_failure_is_retried_until_acknowledged() {
    let store = Arc::new(MemoryGuestStore::flag());
    let (channel, sender) = scripted_channel();
    let anna = store.insert(NewGuest::attending("Anna")).await;
    sender.fail_next(BRIDE, 2).await;

    let mut engine =
        ReconcileEngine::new(store.clone(), channel, recipients(), Duration::from_secs(5));

    for _ in 0..2 {
        let report = engine.tick().await;
        assert_eq!(
            report.outcome,
            TickOutcome::DeliveryHalted { record_id: anna.id }
        );
        assert!(!store.is_notified(anna.id).await);
    }

    let report = engine.tick().await;
    assert_eq!(report.acknowledged, vec![anna.id]);
    assert!(store.is_notified(anna.id).await);

    assert_eq!(sender.sent_to(BRIDE).await.len(), 1);
    // Admin succeeded every time: duplicates are the cost of at-least-once.
    assert_eq!(sender.sent_to(ADMIN).await.len(), 3);
}

// ---------------------------------------------------------------------------
// 5. Idempotent acknowledge
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_acknowledge_changes_nothing() {
    let store = Arc::new(MemoryGuestStore::flag());
    let (channel, sender) = scripted_channel();
    let anna = store.insert(NewGuest::attending("Anna")).await;

    let mut engine =
        ReconcileEngine::new(store.clone(), channel, recipients(), Duration::from_secs(5));
    engine.tick().await;

    let acked = store.record(anna.id).await.unwrap();
    store.acknowledge(&[acked.clone()]).await.unwrap();
    store.acknowledge(&[acked.clone(), acked]).await.unwrap();

    assert!(store.is_notified(anna.id).await);
    assert!(store.fetch_pending().await.unwrap().is_empty());
    assert_eq!(engine.tick().await.outcome, TickOutcome::Idle);
    assert_eq!(sender.sent().await.len(), 2);
}
