//! Turns a resolved [`NotifierConfig`] into live components.
//!
//! Shared by the daemon binary and the operator CLI so both pick the store
//! backend the same way.

use std::sync::Arc;

use anyhow::Context;
use rsvp_config::{NotifierConfig, StoreBackend};
use rsvp_delivery::{FanoutChannel, TelegramClient};
use rsvp_reconcile::{ReconcileEngine, RetryPolicy};
use rsvp_store::{FileCursorStore, GuestDirectory, HttpGuestStore, PgGuestStore, RecordStore};

/// The selected backend seen through both of its roles.
#[derive(Clone)]
pub struct Stores {
    pub backend: &'static str,
    pub records: Arc<dyn RecordStore>,
    pub directory: Arc<dyn GuestDirectory>,
}

pub async fn open_stores(cfg: &NotifierConfig) -> anyhow::Result<Stores> {
    let backend = cfg.backend.kind();
    match &cfg.backend {
        StoreBackend::Postgres { database_url } => {
            let pool = rsvp_db::connect(database_url, cfg.call_timeout).await?;
            rsvp_db::migrate(&pool).await?;
            let store = Arc::new(PgGuestStore::new(pool));
            Ok(Stores {
                backend,
                records: store.clone(),
                directory: store,
            })
        }
        StoreBackend::RemoteApi {
            base_url,
            api_key,
            cursor_path,
        } => {
            let cursor = Arc::new(FileCursorStore::new(cursor_path.clone()));
            let store = HttpGuestStore::open(
                base_url.clone(),
                api_key.clone(),
                cursor,
                cfg.call_timeout,
            )
            .await
            .with_context(|| format!("open remote guest store at {base_url}"))?;
            let store = Arc::new(store);
            Ok(Stores {
                backend,
                records: store.clone(),
                directory: store,
            })
        }
    }
}

pub fn telegram_client(cfg: &NotifierConfig) -> TelegramClient {
    TelegramClient::new_with_base_url(
        cfg.bot_token.clone(),
        cfg.telegram_api_url.clone(),
        cfg.call_timeout,
    )
}

pub fn build_engine(
    cfg: &NotifierConfig,
    stores: &Stores,
    client: TelegramClient,
) -> ReconcileEngine {
    let channel = Arc::new(FanoutChannel::new(client, cfg.call_timeout));
    ReconcileEngine::new(
        stores.records.clone(),
        channel,
        cfg.recipients(),
        cfg.call_timeout,
    )
    .with_policy(RetryPolicy::from_max_attempts(cfg.max_delivery_attempts))
}
