//! Postgres access for the guest list.
//!
//! Thin query layer: every function takes a `&PgPool`, returns
//! `anyhow::Result` with context, and leaves classification of failures
//! (transient vs structural) to the store adapter that calls it.

use std::time::Duration;

use anyhow::{Context, Result};
use rsvp_schemas::{GuestRecord, NewGuest};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

pub const ENV_DB_URL: &str = "DATABASE_URL";

/// Connection string for the ignored integration tests. Kept separate from
/// `DATABASE_URL` so a test run never touches a live guest list.
pub const ENV_TEST_DB_URL: &str = "RSVP_TEST_DATABASE_URL";

/// Connect to Postgres using DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, Duration::from_secs(10)).await
}

/// Connect with a bounded pool-acquire timeout.
///
/// The pool is shared by the reconcile engine and the read-only command
/// handler, so a small fixed size is enough.
pub async fn connect(url: &str, acquire_timeout: Duration) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations (creates the `guests` table when absent).
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_guests_table: bool,
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='guests'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_guests_table: exists,
    })
}

const GUEST_COLUMNS: &str = "id, name, partner, wishes, attending, notified, created";

fn guest_from_row(row: &PgRow) -> Result<GuestRecord> {
    Ok(GuestRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        partner: row.try_get("partner")?,
        wishes: row.try_get("wishes")?,
        attending: row.try_get("attending")?,
        created_at: row.try_get("created")?,
        notified: row.try_get("notified")?,
    })
}

/// Insert a guest row. `notified` starts false and `created` is assigned by
/// the database clock.
pub async fn insert_guest(pool: &PgPool, guest: &NewGuest) -> Result<GuestRecord> {
    let row = sqlx::query(&format!(
        r#"
        insert into guests (name, partner, wishes, attending)
        values ($1, $2, $3, $4)
        returning {GUEST_COLUMNS}
        "#
    ))
    .bind(&guest.name)
    .bind(&guest.partner)
    .bind(&guest.wishes)
    .bind(guest.attending)
    .fetch_one(pool)
    .await
    .context("insert_guest failed")?;

    guest_from_row(&row)
}

pub async fn fetch_guest(pool: &PgPool, id: i64) -> Result<Option<GuestRecord>> {
    let row = sqlx::query(&format!("select {GUEST_COLUMNS} from guests where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_guest failed")?;

    row.as_ref().map(guest_from_row).transpose()
}

/// Rows whose notification has not been acknowledged, in insertion order.
pub async fn fetch_unnotified(pool: &PgPool) -> Result<Vec<GuestRecord>> {
    let rows = sqlx::query(&format!(
        r#"
        select {GUEST_COLUMNS}
        from guests
        where notified = false
        order by created asc, id asc
        "#
    ))
    .fetch_all(pool)
    .await
    .context("fetch_unnotified failed")?;

    rows.iter().map(guest_from_row).collect()
}

/// Confirmed guests, in insertion order.
pub async fn fetch_attending(pool: &PgPool) -> Result<Vec<GuestRecord>> {
    let rows = sqlx::query(&format!(
        r#"
        select {GUEST_COLUMNS}
        from guests
        where attending = true
        order by created asc, id asc
        "#
    ))
    .fetch_all(pool)
    .await
    .context("fetch_attending failed")?;

    rows.iter().map(guest_from_row).collect()
}

/// Flip `notified` to true for the given ids.
///
/// Idempotent: rows already notified are left untouched and unknown ids are
/// ignored. Returns the number of rows that actually transitioned.
pub async fn mark_notified(pool: &PgPool, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let res = sqlx::query(
        r#"
        update guests
        set notified = true
        where id = any($1)
          and notified = false
        "#,
    )
    .bind(ids)
    .execute(pool)
    .await
    .context("mark_notified failed")?;

    let n = res.rows_affected();
    tracing::debug!(requested = ids.len(), transitioned = n, "mark_notified");
    Ok(n)
}

pub async fn count_unnotified(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*)::bigint from guests where notified = false")
            .fetch_one(pool)
            .await
            .context("count_unnotified failed")?;
    Ok(n)
}
