use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::db::{KillSwitchStore, StoreError};
use crate::models::kill_switch_event::{EventErrorEntry, EventOutcome};

pub const STALE_EVENT_ERROR: &str = "execution abandoned before completion";

/// Every five minutes, on the minute
const REAPER_SCHEDULE: &str = "0 */5 * * * *";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReaperStats {
    pub found: usize,
    pub reaped: usize,
}

/// Background job that fails kill switch events left IN_PROGRESS
///
/// An event still running after `max_age` belongs to a process that died
/// mid-execution. Each one is moved to FAILED with the abandonment recorded
/// and its execution time measured from initiation. The terminal update is
/// guarded, so an event that finished in the meantime is left alone.
pub async fn reap_stale_events(
    store: &dyn KillSwitchStore,
    max_age: Duration,
) -> Result<ReaperStats, StoreError> {
    let now = Utc::now();
    let stale = store.find_stale_events(now - max_age).await?;

    let mut stats = ReaperStats {
        found: stale.len(),
        reaped: 0,
    };

    for event in stale {
        let mut errors = event.errors.0.clone();
        errors.push(EventErrorEntry::general(STALE_EVENT_ERROR));
        let outcome = EventOutcome::failed(
            now,
            (now - event.initiated_at).num_milliseconds(),
            errors,
        );

        match store.complete_event(event.id, &outcome).await {
            Ok(true) => {
                tracing::warn!(
                    event_id = %event.id,
                    initiated_at = %event.initiated_at,
                    "Abandoned kill switch event marked as failed"
                );
                stats.reaped += 1;
            }
            Ok(false) => {
                tracing::debug!(event_id = %event.id, "Event finished before it could be reaped");
            }
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "Failed to reap stale event");
            }
        }
    }

    if stats.found > 0 {
        tracing::info!(?stats, "Stale event sweep completed");
    }

    Ok(stats)
}

/// Starts the background scheduler running the stale event reaper
pub async fn start_scheduler(
    store: Arc<dyn KillSwitchStore>,
    max_age: Duration,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create scheduler: {:?}", e))?;

    let job = Job::new_async(REAPER_SCHEDULE, move |_uuid, _lock| {
        let store = Arc::clone(&store);
        Box::pin(async move {
            if let Err(e) = reap_stale_events(store.as_ref(), max_age).await {
                tracing::error!(error = %e, "Stale event sweep failed");
            }
        })
    })
    .map_err(|e| anyhow::anyhow!("invalid reaper schedule: {:?}", e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow::anyhow!("failed to schedule reaper: {:?}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start scheduler: {:?}", e))?;

    tracing::info!(
        schedule = REAPER_SCHEDULE,
        max_age_minutes = max_age.num_minutes(),
        "Stale event reaper scheduled"
    );

    Ok(scheduler)
}
