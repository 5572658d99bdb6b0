//! Read-only HTTP surface. Acknowledgment state changes only inside the
//! reconcile loop; nothing here can trigger a tick or touch the store.
//!
//! Layers (CORS, request tracing) are added by `main.rs`, so tests drive the
//! bare router with `oneshot`.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    api_types::HealthResponse,
    state::{AppState, BusMsg, StatusSnapshot},
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

async fn health(State(st): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: st.build.service,
        version: st.build.version,
    })
}

/// Current counters. The same snapshot is echoed to stream subscribers.
async fn status(State(st): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    let snap = st.snapshot().await;
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    Json(snap)
}

async fn stream(
    State(st): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Lagged subscribers drop the missed messages and keep streaming.
    let events = BroadcastStream::new(st.bus.subscribe()).filter_map(|msg| async move {
        let msg = msg.ok()?;
        let data = serde_json::to_string(&msg).ok()?;
        Some(Ok(Event::default().event(msg.event_name()).data(data)))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
