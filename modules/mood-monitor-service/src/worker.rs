//! Background worker for search collection.
//!
//! Every tick runs the scheduler over due searches, then drops expired tweets.

use crate::deps::Deps;
use crate::scheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub async fn run_worker(
    deps: Deps,
    tick_secs: u64,
    due_limit: usize,
    last_tick_at: Arc<Mutex<Option<String>>>,
) {
    log::info!(
        "[MOOD_MONITOR] Worker started (tick interval: {}s, due limit: {})",
        tick_secs,
        due_limit
    );

    loop {
        tokio::time::sleep(Duration::from_secs(tick_secs)).await;
        let now = chrono::Utc::now();

        match scheduler::run_due(&deps, now, due_limit).await {
            Ok(report) => {
                if report.due > 0 {
                    log::info!(
                        "[MOOD_MONITOR] Tick complete: {} due, {} succeeded, {} failed",
                        report.due,
                        report.succeeded,
                        report.failed
                    );
                }
                *last_tick_at.lock().await = Some(now.to_rfc3339());
            }
            Err(e) => {
                log::error!("[MOOD_MONITOR] Tick error: {}", e);
            }
        }

        match deps.db.purge_expired(now) {
            Ok(0) => {}
            Ok(n) => log::info!("[MOOD_MONITOR] Purged {} expired tweets", n),
            Err(e) => log::warn!("[MOOD_MONITOR] Purge failed: {}", e),
        }
    }
}
