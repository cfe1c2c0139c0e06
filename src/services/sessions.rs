use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use crate::db::queries;
use crate::state::AppState;

const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Deletes dialogs idle for longer than `ttl_minutes`. Returns how many were removed.
pub fn reap_idle_sessions(state: &AppState, now: NaiveDateTime, ttl_minutes: i64) -> anyhow::Result<usize> {
    let cutoff = now - chrono::Duration::minutes(ttl_minutes);
    let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
    queries::expire_stale_sessions(&db, &cutoff)
}

/// Background task, only spawned when a session TTL is configured.
pub async fn run_reaper(state: Arc<AppState>, ttl_minutes: i64) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        match reap_idle_sessions(&state, Local::now().naive_local(), ttl_minutes) {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, ttl_minutes, "reaped idle booking sessions"),
            Err(e) => tracing::warn!(error = %e, "session reaper failed"),
        }
    }
}
