//! Postgres backend (flag variant).

use async_trait::async_trait;
use rsvp_schemas::{sort_for_processing, GuestRecord};
use sqlx::PgPool;

use crate::{AckMode, GuestDirectory, RecordStore, StoreError};

/// Guest store backed directly by the `guests` table.
#[derive(Debug, Clone)]
pub struct PgGuestStore {
    pool: PgPool,
}

impl PgGuestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgGuestStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn ack_mode(&self) -> AckMode {
        AckMode::PerRecord
    }

    async fn fetch_pending(&self) -> Result<Vec<GuestRecord>, StoreError> {
        let mut rows = rsvp_db::fetch_unnotified(&self.pool)
            .await
            .map_err(classify_db_error)?;
        // The query already orders; re-sort so the contract does not depend on it.
        sort_for_processing(&mut rows);
        Ok(rows)
    }

    async fn acknowledge(&self, records: &[GuestRecord]) -> Result<(), StoreError> {
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        rsvp_db::mark_notified(&self.pool, &ids)
            .await
            .map_err(classify_db_error)?;
        Ok(())
    }
}

#[async_trait]
impl GuestDirectory for PgGuestStore {
    async fn list_attending(&self) -> Result<Vec<GuestRecord>, StoreError> {
        rsvp_db::fetch_attending(&self.pool)
            .await
            .map_err(classify_db_error)
    }
}

/// Map an `rsvp-db` failure onto the store taxonomy.
///
/// - connection / pool / I/O problems -> `Unavailable`
/// - SQLSTATE classes 08 (connection), 40 (rollback), 53 (resources),
///   57 (operator intervention) -> `Unavailable`
/// - any other database error, or a row that fails to decode -> `Rejected`
pub fn classify_db_error(err: anyhow::Error) -> StoreError {
    let msg = format!("{err:#}");
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => {
            let transient = db_err
                .code()
                .map(|c| is_transient_sqlstate(&c))
                .unwrap_or(false);
            if transient {
                StoreError::Unavailable(msg)
            } else {
                StoreError::Rejected(msg)
            }
        }
        Some(sqlx::Error::ColumnDecode { .. })
        | Some(sqlx::Error::ColumnNotFound(_))
        | Some(sqlx::Error::Decode(_))
        | Some(sqlx::Error::TypeNotFound { .. }) => StoreError::Rejected(msg),
        _ => StoreError::Unavailable(msg),
    }
}

fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("08") | Some("40") | Some("53") | Some("57"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn pool_timeout_is_unavailable() {
        let err = Err::<(), _>(sqlx::Error::PoolTimedOut)
            .context("fetch_unnotified failed")
            .unwrap_err();
        assert!(classify_db_error(err).is_transient());
    }

    #[test]
    fn column_not_found_is_rejected() {
        let err = anyhow::Error::new(sqlx::Error::ColumnNotFound("created".to_string()));
        assert!(matches!(classify_db_error(err), StoreError::Rejected(_)));
    }

    #[test]
    fn non_sqlx_error_defaults_to_unavailable() {
        let err = anyhow::anyhow!("something odd");
        assert!(classify_db_error(err).is_transient());
    }

    #[test]
    fn sqlstate_classes() {
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("40001"));
        assert!(is_transient_sqlstate("57P01"));
        assert!(!is_transient_sqlstate("23505"));
        assert!(!is_transient_sqlstate("42P01"));
    }
}
