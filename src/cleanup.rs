//! Scheduled cleanup of dead refresh token records.
//!
//! Correctness never depends on this sweep: the revoked/expired check on
//! presentation is authoritative. The sweep only reclaims space. Revoked
//! records are kept for a grace period so replay detection still fires.

use crate::db::Database;
use crate::jwt::unix_now;
use std::time::Duration;
use tracing::{error, info};

/// How long revoked records are retained before deletion.
const REVOKED_RETENTION_SECS: i64 = 30 * 24 * 60 * 60;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    match db.refresh_tokens().delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired refresh tokens: {}", e),
    }

    let Ok(now) = unix_now() else {
        error!("Skipping revoked-token sweep: clock error");
        return;
    };
    let cutoff = now as i64 - REVOKED_RETENTION_SECS;
    match db.refresh_tokens().delete_revoked_before(cutoff).await {
        Ok(count) if count > 0 => info!("Cleaned up {} old revoked refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up revoked refresh tokens: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
