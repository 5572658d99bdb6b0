use std::sync::Arc;
use std::time::Duration;

use rsvp_delivery::{DeliveryChannel, DeliveryOutcome, NotifyReport, RecipientResult};
use rsvp_schemas::{GuestRecord, Recipient};
use rsvp_store::{AckMode, RecordStore, StoreError};
use tokio::sync::watch;

use crate::policy::{AttemptLedger, FailureDecision, RetryPolicy};
use crate::types::{TickOutcome, TickPhase, TickReport, TickStage};

/// Poll -> deliver -> acknowledge state machine.
///
/// One engine owns all acknowledgment for its store. `tick` takes
/// `&mut self`, so two ticks on the same engine can never overlap.
pub struct ReconcileEngine {
    store: Arc<dyn RecordStore>,
    channel: Arc<dyn DeliveryChannel>,
    recipients: Vec<Recipient>,
    call_timeout: Duration,
    policy: RetryPolicy,
    ledger: AttemptLedger,
    phase: watch::Sender<TickPhase>,
}

impl ReconcileEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn DeliveryChannel>,
        recipients: Vec<Recipient>,
        call_timeout: Duration,
    ) -> Self {
        let (phase, _) = watch::channel(TickPhase::Idle);
        Self {
            store,
            channel,
            recipients,
            call_timeout,
            policy: RetryPolicy::default(),
            ledger: AttemptLedger::default(),
            phase,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Live view of the current phase; readers never block a tick.
    pub fn subscribe_phase(&self) -> watch::Receiver<TickPhase> {
        self.phase.subscribe()
    }

    pub fn dead_letters(&self) -> Vec<i64> {
        self.ledger.dead_letters()
    }

    /// Run one tick. Never panics and never returns an error: every store or
    /// delivery failure is folded into the report.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::new();

        self.set_phase(TickPhase::Fetching);
        let pending = match self.fetch().await {
            Ok(records) => records,
            Err(e) => {
                self.abort(&mut report, TickStage::Fetch, e);
                return self.finish(report);
            }
        };

        let mode = self.store.ack_mode();
        let (pending, barrier) = self.without_dead_letters(mode, pending);
        report.fetched = pending.len();
        if pending.is_empty() {
            if let Some(record_id) = barrier {
                report.outcome = TickOutcome::CursorBlocked { record_id };
            }
            return self.finish(report);
        }

        let mut batch: Vec<GuestRecord> = Vec::new();
        report.outcome = match barrier {
            Some(record_id) => TickOutcome::CursorBlocked { record_id },
            None => TickOutcome::Completed,
        };

        for record in pending {
            self.set_phase(TickPhase::Delivering {
                record_id: record.id,
            });
            let delivery = self.deliver(&record).await;

            if !delivery.all_delivered() {
                report.delivery_failures += 1;
                let attempts = self.ledger.record_failure(record.id);
                match self.policy.decide(attempts) {
                    FailureDecision::HaltTick => {
                        tracing::warn!(
                            record_id = record.id,
                            attempts,
                            delivered = delivery.delivered_count(),
                            "delivery incomplete; halting tick"
                        );
                        report.outcome = TickOutcome::DeliveryHalted {
                            record_id: record.id,
                        };
                        break;
                    }
                    FailureDecision::DeadLetter => {
                        tracing::error!(
                            record_id = record.id,
                            attempts,
                            "delivery attempts exhausted; record dead-lettered"
                        );
                        self.ledger.dead_letter(record.id);
                        report.dead_lettered.push(record.id);
                        if mode == AckMode::Batch {
                            // The cursor must stay below this record.
                            report.outcome = TickOutcome::CursorBlocked {
                                record_id: record.id,
                            };
                            break;
                        }
                        continue;
                    }
                }
            }

            self.ledger.clear(record.id);
            match mode {
                AckMode::Batch => batch.push(record),
                AckMode::PerRecord => {
                    self.set_phase(TickPhase::Acknowledging);
                    match self.acknowledge(std::slice::from_ref(&record)).await {
                        Ok(()) => report.acknowledged.push(record.id),
                        Err(e @ StoreError::Rejected(_)) => {
                            self.reject(&mut report, &[record], &e);
                        }
                        Err(e) => {
                            self.abort(&mut report, TickStage::Acknowledge, e);
                            return self.finish(report);
                        }
                    }
                }
            }
        }

        if !batch.is_empty() {
            self.set_phase(TickPhase::Acknowledging);
            match self.acknowledge(&batch).await {
                Ok(()) => report.acknowledged.extend(batch.iter().map(|r| r.id)),
                Err(e @ StoreError::Rejected(_)) => {
                    self.reject(&mut report, &batch, &e);
                    if let Some(first) = batch.first() {
                        report.outcome = TickOutcome::CursorBlocked {
                            record_id: first.id,
                        };
                    }
                }
                Err(e) => self.abort(&mut report, TickStage::Acknowledge, e),
            }
        }

        self.finish(report)
    }

    /// Drops dead-lettered records from a fetch. Flag-mode stores skip them
    /// individually. Cursor-mode stores stop at the first one, since acking
    /// anything later would move the cursor past it; its id is returned.
    fn without_dead_letters(
        &self,
        mode: AckMode,
        pending: Vec<GuestRecord>,
    ) -> (Vec<GuestRecord>, Option<i64>) {
        match mode {
            AckMode::PerRecord => (
                pending
                    .into_iter()
                    .filter(|r| !self.ledger.is_dead(r.id))
                    .collect(),
                None,
            ),
            AckMode::Batch => {
                let mut live = Vec::with_capacity(pending.len());
                for r in pending {
                    if self.ledger.is_dead(r.id) {
                        return (live, Some(r.id));
                    }
                    live.push(r);
                }
                (live, None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Bounded calls
    // -----------------------------------------------------------------------

    async fn fetch(&self) -> Result<Vec<GuestRecord>, StoreError> {
        tokio::time::timeout(self.call_timeout, self.store.fetch_pending())
            .await
            .unwrap_or_else(|_| Err(self.timed_out("fetch_pending")))
    }

    async fn acknowledge(&self, records: &[GuestRecord]) -> Result<(), StoreError> {
        tokio::time::timeout(self.call_timeout, self.store.acknowledge(records))
            .await
            .unwrap_or_else(|_| Err(self.timed_out("acknowledge")))
    }

    /// The whole fan-out is bounded by one call timeout per recipient. On
    /// expiry every recipient counts as failed.
    async fn deliver(&self, record: &GuestRecord) -> NotifyReport {
        let factor = u32::try_from(self.recipients.len().max(1)).unwrap_or(u32::MAX);
        let bound = self.call_timeout.saturating_mul(factor);
        match tokio::time::timeout(bound, self.channel.notify(record, &self.recipients)).await {
            Ok(report) => report,
            Err(_) => NotifyReport {
                record_id: record.id,
                results: self
                    .recipients
                    .iter()
                    .map(|r| RecipientResult {
                        recipient: *r,
                        outcome: DeliveryOutcome::Failed {
                            reason: format!("notify timed out after {}ms", bound.as_millis()),
                        },
                    })
                    .collect(),
            },
        }
    }

    fn timed_out(&self, call: &str) -> StoreError {
        StoreError::Unavailable(format!(
            "{call} timed out after {}ms",
            self.call_timeout.as_millis()
        ))
    }

    // -----------------------------------------------------------------------
    // Report bookkeeping
    // -----------------------------------------------------------------------

    fn abort(&self, report: &mut TickReport, stage: TickStage, err: StoreError) {
        tracing::warn!(
            backend = self.store.backend_name(),
            stage = ?stage,
            reason = %err,
            "store call failed; tick aborted"
        );
        report.outcome = TickOutcome::Aborted {
            stage,
            kind: err.kind(),
            reason: err.to_string(),
        };
    }

    /// A rejected acknowledgment cannot succeed on retry. The records were
    /// delivered, so they are dead-lettered rather than re-sent every tick.
    fn reject(&mut self, report: &mut TickReport, records: &[GuestRecord], err: &StoreError) {
        for r in records {
            tracing::error!(
                record_id = r.id,
                backend = self.store.backend_name(),
                reason = %err,
                "acknowledgment rejected; record dead-lettered"
            );
            self.ledger.dead_letter(r.id);
            report.dead_lettered.push(r.id);
        }
    }

    fn set_phase(&self, phase: TickPhase) {
        self.phase.send_replace(phase);
    }

    fn finish(&self, report: TickReport) -> TickReport {
        self.set_phase(TickPhase::Idle);
        match &report.outcome {
            TickOutcome::Idle => tracing::debug!("tick idle"),
            TickOutcome::Aborted { .. } => {}
            _ if report.acknowledged.is_empty() && report.dead_lettered.is_empty() => {
                tracing::debug!(fetched = report.fetched, "tick made no progress")
            }
            _ => tracing::info!(
                fetched = report.fetched,
                acknowledged = report.acknowledged.len(),
                dead_lettered = report.dead_lettered.len(),
                "tick finished"
            ),
        }
        report
    }
}
