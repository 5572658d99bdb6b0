//! Scenario: records are processed and acknowledged in creation order.
//!
//! # Invariants under test
//!
//! 1. t1 < t2 < t3 are acknowledged in that order, one call per record.
//! 2. A tick that fails at t2 acknowledges only t1; t3 is not attempted.
//! 3. Pending A and B where B's first recipient fails: A is acknowledged,
//!    B is not, B's second recipient is still attempted, and the next tick
//!    re-delivers B only.
//! 4. Equal timestamps are processed in id order.

use std::sync::Arc;
use std::time::Duration;

use rsvp_reconcile::{ReconcileEngine, TickOutcome};
use rsvp_schemas::{NewGuest, Recipient};
use rsvp_testkit::{scripted_channel, MemoryGuestStore};

const BRIDE: i64 = 100;
const ADMIN: i64 = 200;

fn engine(
    store: &Arc<MemoryGuestStore>,
    channel: Arc<rsvp_delivery::FanoutChannel<rsvp_testkit::ScriptedSender>>,
) -> ReconcileEngine {
    ReconcileEngine::new(
        store.clone(),
        channel,
        vec![Recipient::bride(BRIDE), Recipient::admin(ADMIN)],
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn failure_at_t2_acknowledges_only_t1() {
    let store = Arc::new(MemoryGuestStore::flag());
    let (channel, sender) = scripted_channel();
    let t1 = store.insert(NewGuest::attending("Anna")).await;
    let t2 = store.insert(NewGuest::attending("Boris")).await;
    let t3 = store.insert(NewGuest::attending("Clara")).await;
    sender.fail_matching(BRIDE, "Boris").await;

    let mut engine = engine(&store, channel);
    let first = engine.tick().await;

    assert_eq!(first.acknowledged, vec![t1.id]);
    assert_eq!(first.outcome, TickOutcome::DeliveryHalted { record_id: t2.id });
    assert!(!store.is_notified(t3.id).await);
    assert!(sender.sent().await.iter().all(|m| !m.text.contains("Clara")));

    sender.heal(BRIDE).await;
    let second = engine.tick().await;

    assert_eq!(second.acknowledged, vec![t2.id, t3.id]);
    assert_eq!(second.outcome, TickOutcome::Completed);
    assert_eq!(
        store.ack_calls().await,
        vec![vec![t1.id], vec![t2.id], vec![t3.id]]
    );
}

#[tokio::test]
async fn partial_failure_retries_only_the_failed_record() {
    let store = Arc::new(MemoryGuestStore::flag());
    let (channel, sender) = scripted_channel();
    let a = store.insert(NewGuest::attending("Anna")).await;
    let b = store.insert(NewGuest::attending("Boris")).await;
    sender.fail_matching(BRIDE, "Boris").await;

    let mut engine = engine(&store, channel);
    let first = engine.tick().await;

    assert!(store.is_notified(a.id).await);
    assert!(!store.is_notified(b.id).await);
    assert_eq!(first.acknowledged, vec![a.id]);
    // No short-circuit: admin still got Boris.
    assert_eq!(sender.attempts().await, vec![BRIDE, ADMIN, BRIDE, ADMIN]);

    sender.heal(BRIDE).await;
    let second = engine.tick().await;

    assert_eq!(second.fetched, 1);
    assert_eq!(second.acknowledged, vec![b.id]);
    assert_eq!(sender.sent_to(BRIDE).await.len(), 2);
    let admin = sender.sent_to(ADMIN).await;
    assert_eq!(admin.iter().filter(|t| t.contains("Anna")).count(), 1);
    assert_eq!(admin.iter().filter(|t| t.contains("Boris")).count(), 2);
}

#[tokio::test]
async fn equal_timestamps_fall_back_to_id_order() {
    let store = Arc::new(MemoryGuestStore::flag());
    let (channel, _sender) = scripted_channel();
    let ts = store.insert(NewGuest::attending("Anna")).await.created_at;
    let b = store.insert_at(NewGuest::attending("Boris"), ts).await;
    let c = store.insert_at(NewGuest::attending("Clara"), ts).await;

    let report = engine(&store, channel).tick().await;

    assert_eq!(report.acknowledged, vec![1, b.id, c.id]);
}
