use serde::Serialize;

/// Where the engine is inside a tick. Ticks run strictly
/// `Idle -> Fetching -> Delivering -> Acknowledging -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TickPhase {
    Idle,
    Fetching,
    Delivering { record_id: i64 },
    Acknowledging,
}

/// Store call that aborted a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStage {
    Fetch,
    Acknowledge,
}

/// How a tick ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Nothing pending.
    Idle,
    /// Every fetched record was acknowledged or dead-lettered.
    Completed,
    /// A recipient failed for `record_id`; later records were not attempted.
    DeliveryHalted { record_id: i64 },
    /// Cursor-mode only: `record_id` is dead-lettered, so nothing at or after
    /// it is acknowledged until the process restarts.
    CursorBlocked { record_id: i64 },
    /// A store call failed; nothing after it was attempted.
    Aborted {
        stage: TickStage,
        kind: &'static str,
        reason: String,
    },
}

/// Summary of one tick, in processing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Records taken up this tick. Dead letters, and in cursor mode
    /// everything behind the first one, are excluded.
    pub fetched: usize,
    /// Ids acknowledged in this tick, in acknowledgment order.
    pub acknowledged: Vec<i64>,
    /// Ids newly dead-lettered in this tick.
    pub dead_lettered: Vec<i64>,
    /// Records with at least one failed recipient.
    pub delivery_failures: u32,
    #[serde(flatten)]
    pub outcome: TickOutcome,
}

impl TickReport {
    pub(crate) fn new() -> Self {
        Self {
            fetched: 0,
            acknowledged: Vec::new(),
            dead_lettered: Vec::new(),
            delivery_failures: 0,
            outcome: TickOutcome::Idle,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, TickOutcome::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_outcome_inline() {
        let report = TickReport {
            fetched: 3,
            acknowledged: vec![1],
            dead_lettered: vec![],
            delivery_failures: 1,
            outcome: TickOutcome::DeliveryHalted { record_id: 2 },
        };
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["outcome"], "delivery_halted");
        assert_eq!(v["record_id"], 2);
        assert_eq!(v["acknowledged"], serde_json::json!([1]));
    }

    #[test]
    fn cursor_blocked_carries_the_record() {
        let v = serde_json::to_value(TickOutcome::CursorBlocked { record_id: 4 }).unwrap();
        assert_eq!(v, serde_json::json!({"outcome": "cursor_blocked", "record_id": 4}));
    }

    #[test]
    fn phase_is_tagged() {
        let v = serde_json::to_value(TickPhase::Delivering { record_id: 9 }).unwrap();
        assert_eq!(v, serde_json::json!({"phase": "delivering", "record_id": 9}));
    }
}
