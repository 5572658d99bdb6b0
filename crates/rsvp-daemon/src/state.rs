//! Shared runtime state for rsvp-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The reconcile loop is
//! the only writer of tick statistics; readers never wait on a tick in
//! flight because the engine itself is owned by the loop task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rsvp_reconcile::{ReconcileEngine, RetryPolicy, TickOutcome, TickPhase, TickReport};
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Tick(TickReport),
    Status(StatusSnapshot),
    LogLine { level: String, msg: String },
}

impl BusMsg {
    /// SSE `event:` field for this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Tick(_) => "tick",
            BusMsg::Status(_) => "status",
            BusMsg::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Returned by GET /v1/status and carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// Store backend in use ("postgres" | "remote_api" | test fakes).
    pub backend: String,
    pub policy: RetryPolicy,
    pub phase: TickPhase,
    pub ticks_total: u64,
    pub ticks_aborted: u64,
    pub records_acknowledged: u64,
    pub delivery_failures: u64,
    pub dead_letters: Vec<i64>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_tick: Option<TickReport>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub status: RwLock<StatusSnapshot>,
    /// Live phase published by the engine.
    pub phase: watch::Receiver<TickPhase>,
}

impl AppState {
    pub fn new(backend: &str, policy: RetryPolicy, phase: watch::Receiver<TickPhase>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        Self {
            bus,
            build: BuildInfo {
                service: "rsvp-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: RwLock::new(StatusSnapshot {
                daemon_uptime_secs: uptime_secs(),
                backend: backend.to_string(),
                policy,
                phase: TickPhase::Idle,
                ticks_total: 0,
                ticks_aborted: 0,
                records_acknowledged: 0,
                delivery_failures: 0,
                dead_letters: Vec::new(),
                last_tick_at: None,
                last_tick: None,
            }),
            phase,
        }
    }

    /// Current status with live uptime and phase filled in.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let mut snap = self.status.read().await.clone();
        snap.daemon_uptime_secs = uptime_secs();
        snap.phase = *self.phase.borrow();
        snap
    }

    /// Fold one finished tick into the counters and publish it on the bus.
    pub async fn record_tick(&self, report: &TickReport, dead_letters: Vec<i64>) {
        {
            let mut s = self.status.write().await;
            s.ticks_total += 1;
            if report.is_aborted() {
                s.ticks_aborted += 1;
            }
            s.records_acknowledged += report.acknowledged.len() as u64;
            s.delivery_failures += u64::from(report.delivery_failures);
            s.dead_letters = dead_letters;
            s.last_tick_at = Some(Utc::now());
            s.last_tick = Some(report.clone());
        }
        let _ = self.bus.send(BusMsg::Tick(report.clone()));

        if let TickOutcome::Aborted { reason, .. } = &report.outcome {
            let _ = self.bus.send(BusMsg::LogLine {
                level: "WARN".to_string(),
                msg: format!("tick aborted: {reason}"),
            });
        }
        if !report.dead_lettered.is_empty() {
            let _ = self.bus.send(BusMsg::LogLine {
                level: "ERROR".to_string(),
                msg: format!("dead-lettered records: {:?}", report.dead_lettered),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn the periodic reconcile loop.
///
/// - The first tick fires immediately, then every `interval`.
/// - The task owns the engine, so ticks run strictly one after another; a
///   firing that comes due while a tick is still running is skipped.
/// - A tick never ends the loop. Only `shutdown` flipping to `true` (or its
///   sender being dropped) does, and only between ticks.
pub fn spawn_reconcile_loop(
    state: Arc<AppState>,
    mut engine: ReconcileEngine,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = engine.tick().await;
                    state.record_tick(&report, engine.dead_letters()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("reconcile loop stopping");
                        break;
                    }
                }
            }
        }
    })
}
