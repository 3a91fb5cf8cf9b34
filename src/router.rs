use crate::db::SqliteStore;
use crate::handlers::insights::funnel_handler;
use crate::handlers::sync::{backfill_handler, cron_sync_handler, manual_sync_handler};
use crate::service::SyncHandle;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct PulseState {
    pub sync: SyncHandle,
    pub store: SqliteStore,
    pub pulse_key: Arc<str>,
    pub cron_secret: Option<Arc<str>>,
}

impl PulseState {
    pub fn new(
        sync: SyncHandle,
        store: SqliteStore,
        pulse_key: Arc<str>,
        cron_secret: Option<Arc<str>>,
    ) -> Self {
        Self {
            sync,
            store,
            pulse_key,
            cron_secret: cron_secret.filter(|s| !s.trim().is_empty()),
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn pulse_router(state: PulseState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/cron/sync", post(cron_sync_handler))
        .route("/sync/manual", post(manual_sync_handler))
        .route("/sync/backfill/{connection_id}", post(backfill_handler))
        .route("/api/channels/{channel_id}/funnel", get(funnel_handler))
        .with_state(state)
}
