//! Command handlers for the `rsvp` operator CLI.
//!
//! `db` subcommands talk to Postgres directly through `DATABASE_URL`. The
//! rest resolve the full notifier configuration and go through the same
//! store backend the daemon would use.

use anyhow::{Context, Result};
use rsvp_config::NotifierConfig;
use rsvp_daemon::wiring;
use rsvp_schemas::{GuestRecord, NewGuest};

// ---------------------------------------------------------------------------
// db
// ---------------------------------------------------------------------------

pub async fn db_status() -> Result<()> {
    let pool = rsvp_db::connect_from_env().await?;
    let s = rsvp_db::status(&pool).await?;
    println!("db_ok={} has_guests_table={}", s.ok, s.has_guests_table);
    if s.has_guests_table {
        let n = rsvp_db::count_unnotified(&pool).await?;
        println!("unnotified={n}");
    }
    Ok(())
}

pub async fn db_migrate() -> Result<()> {
    let pool = rsvp_db::connect_from_env().await?;
    rsvp_db::migrate(&pool).await?;
    println!("migrations_applied=true");
    Ok(())
}

pub async fn db_add_guest(guest: NewGuest) -> Result<()> {
    let pool = rsvp_db::connect_from_env().await?;
    let row = rsvp_db::insert_guest(&pool, &guest).await?;
    println!("guest_id={} created={}", row.id, row.created_at.to_rfc3339());
    Ok(())
}

// ---------------------------------------------------------------------------
// store-backed
// ---------------------------------------------------------------------------

fn load_config() -> Result<NotifierConfig> {
    NotifierConfig::from_env().context("configuration")
}

/// Print the same summary the `/guests` chat command would send.
pub async fn guests() -> Result<()> {
    let cfg = load_config()?;
    let stores = wiring::open_stores(&cfg).await?;
    let attending = stores
        .directory
        .list_attending()
        .await
        .context("list attending guests")?;
    println!("{}", rsvp_delivery::format::guest_summary(&attending));
    Ok(())
}

pub async fn pending() -> Result<()> {
    let cfg = load_config()?;
    let stores = wiring::open_stores(&cfg).await?;
    let pending = stores
        .records
        .fetch_pending()
        .await
        .context("fetch pending records")?;
    println!("backend={} pending={}", stores.backend, pending.len());
    for r in &pending {
        println!("{}", pending_line(r));
    }
    Ok(())
}

/// Run exactly one reconcile tick and print its report as JSON.
pub async fn tick() -> Result<()> {
    let cfg = load_config()?;
    let stores = wiring::open_stores(&cfg).await?;
    let client = wiring::telegram_client(&cfg);
    let mut engine = wiring::build_engine(&cfg, &stores, client);

    let report = engine.tick().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_aborted() {
        anyhow::bail!("tick aborted");
    }
    Ok(())
}

fn pending_line(r: &GuestRecord) -> String {
    format!(
        "id={} created={} attending={} name={}",
        r.id,
        r.created_at.to_rfc3339(),
        r.attending,
        r.name.trim()
    )
}
