//! Retry policy for records whose delivery fails.
//!
//! # Invariants
//!
//! - **Pure**: [`RetryPolicy::decide`] depends only on the attempt count.
//! - **Block by default**: without a configured bound a failing record halts
//!   every tick until it succeeds (head-of-line blocking).
//! - **Dead letters are sticky**: once dead-lettered, a record is never
//!   handed to the delivery channel again by this engine instance.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Halt the tick on any failure; retry the same record next tick.
    #[default]
    BlockOnFailure,
    /// Halt on failure until `max_attempts` consecutive failures, then log
    /// the record as a dead letter and move past it.
    SkipAfter { max_attempts: u32 },
}

/// What to do with a record that just failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    HaltTick,
    DeadLetter,
}

impl RetryPolicy {
    /// `None` (or zero) keeps the blocking behaviour.
    pub fn from_max_attempts(max: Option<u32>) -> Self {
        match max {
            Some(n) if n > 0 => RetryPolicy::SkipAfter { max_attempts: n },
            _ => RetryPolicy::BlockOnFailure,
        }
    }

    /// `attempts` counts failures so far, including the one being decided.
    pub fn decide(&self, attempts: u32) -> FailureDecision {
        match self {
            RetryPolicy::BlockOnFailure => FailureDecision::HaltTick,
            RetryPolicy::SkipAfter { max_attempts } if attempts >= *max_attempts => {
                FailureDecision::DeadLetter
            }
            RetryPolicy::SkipAfter { .. } => FailureDecision::HaltTick,
        }
    }
}

/// Consecutive delivery failures per record, plus the dead-letter set.
#[derive(Debug, Default)]
pub struct AttemptLedger {
    attempts: HashMap<i64, u32>,
    dead: BTreeSet<i64>,
}

impl AttemptLedger {
    /// Count one more failure for `id`; returns the new total.
    pub fn record_failure(&mut self, id: i64) -> u32 {
        let n = self.attempts.entry(id).or_insert(0);
        *n += 1;
        *n
    }

    pub fn clear(&mut self, id: i64) {
        self.attempts.remove(&id);
    }

    pub fn attempts(&self, id: i64) -> u32 {
        self.attempts.get(&id).copied().unwrap_or(0)
    }

    pub fn dead_letter(&mut self, id: i64) {
        self.attempts.remove(&id);
        self.dead.insert(id);
    }

    pub fn is_dead(&self, id: i64) -> bool {
        self.dead.contains(&id)
    }

    pub fn dead_letters(&self) -> Vec<i64> {
        self.dead.iter().copied().collect()
    }
}
