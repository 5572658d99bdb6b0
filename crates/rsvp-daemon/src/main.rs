//! rsvp-daemon entry point.
//!
//! Thin on purpose: resolve config, open the store, start the reconcile loop
//! and the command loop, serve the status surface, and stop everything on
//! Ctrl-C. Route handlers live in `routes.rs`; shared state in `state.rs`.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use rsvp_config::NotifierConfig;
use rsvp_daemon::{commands, routes, state, wiring};
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cfg = NotifierConfig::from_env().context("configuration")?;
    info!(config = ?cfg, "configuration resolved");

    let stores = wiring::open_stores(&cfg).await?;
    let client = wiring::telegram_client(&cfg);
    let engine = wiring::build_engine(&cfg, &stores, client.clone());

    let shared = Arc::new(state::AppState::new(
        stores.backend,
        engine.policy(),
        engine.subscribe_phase(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    let reconcile = state::spawn_reconcile_loop(
        Arc::clone(&shared),
        engine,
        cfg.poll_interval,
        shutdown_rx.clone(),
    );
    let command_loop = commands::CommandLoop::new(
        client,
        stores.directory.clone(),
        cfg.call_timeout,
        commands::LONG_POLL_TIMEOUT,
    );
    let commands_task = tokio::spawn(command_loop.run(shutdown_rx.clone()));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = cfg.daemon_addr;
    info!(
        backend = stores.backend,
        interval_secs = cfg.poll_interval.as_secs(),
        "rsvp-daemon listening on http://{}",
        addr
    );

    tokio::spawn(wait_for_ctrl_c(shutdown_tx));

    let mut server_shutdown = shutdown_rx;
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("server crashed")?;

    let _ = reconcile.await;
    let _ = commands_task.await;
    info!("rsvp-daemon stopped");
    Ok(())
}

/// Wait for Ctrl-C, then flip the shared shutdown flag.
async fn wait_for_ctrl_c(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(reason = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
