use chrono::Utc;
use futures::future::join_all;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    actions::FamilyOutcome, KillSwitchError, KillSwitchParams, KillSwitchResult, KillSwitchService,
};
use crate::models::{
    kill_switch_action::{ActionStatus, ActionType},
    kill_switch_event::{EventErrorEntry, EventOutcome, EventStatus},
};

/// Rolls family statuses up into the event status. SKIPPED counts as success.
pub fn aggregate_status(statuses: &[ActionStatus]) -> EventStatus {
    let failed = statuses
        .iter()
        .filter(|status| **status == ActionStatus::Failed)
        .count();

    if failed == 0 {
        EventStatus::Completed
    } else if failed == statuses.len() {
        EventStatus::Failed
    } else {
        EventStatus::PartialFailure
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

impl KillSwitchService {
    /// Runs a kill switch invocation to completion.
    ///
    /// The event row is written IN_PROGRESS before any side effect. Family
    /// failures are recorded and reflected in the returned status; only a
    /// failure to create the event, resolve targets or persist the outcome
    /// is returned as an error, after the event is forced to FAILED.
    ///
    /// The work runs on its own task: dropping the returned future does not
    /// cancel it, and the event still reaches a terminal status.
    #[tracing::instrument(
        skip(self, params),
        fields(scope = %params.scope, reason = %params.reason, triggered_by = %params.triggered_by)
    )]
    pub async fn execute(&self, params: KillSwitchParams) -> Result<KillSwitchResult, KillSwitchError> {
        let started = Instant::now();
        let service = self.clone();

        let supervisor = tokio::spawn(
            async move {
                let event_id = Arc::new(OnceLock::<Uuid>::new());
                let run = tokio::spawn({
                    let service = service.clone();
                    let event_id = Arc::clone(&event_id);
                    async move { service.run(params, started, &event_id).await }.in_current_span()
                });

                match run.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(error = %e, "Kill switch task aborted");
                        if let Some(&id) = event_id.get() {
                            service
                                .force_fail(id, started, format!("execution aborted: {}", e))
                                .await;
                        }
                        Err(KillSwitchError::Aborted(e.to_string()))
                    }
                }
            }
            .in_current_span(),
        );

        supervisor
            .await
            .map_err(|e| KillSwitchError::Aborted(e.to_string()))?
    }

    async fn run(
        &self,
        params: KillSwitchParams,
        started: Instant,
        event_id: &OnceLock<Uuid>,
    ) -> Result<KillSwitchResult, KillSwitchError> {
        let initiated_at = Utc::now();

        let event = self.store.create_event(params.event_data(initiated_at)).await?;
        let _ = event_id.set(event.id);
        tracing::info!(event_id = %event.id, "Kill switch initiated");

        let targets = match self.resolve_targets(&params).await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "Target resolution failed");
                self.force_fail(event.id, started, format!("target resolution failed: {}", e))
                    .await;
                return Err(e.into());
            }
        };

        tracing::info!(
            event_id = %event.id,
            sessions = targets.sessions.len(),
            users = targets.user_ids.len(),
            "Targets resolved"
        );

        let event = Arc::new(event);
        let targets = Arc::new(targets);

        // One task per family so a panic stays inside that family
        let handles = ActionType::ALL.iter().map(|&action_type| {
            let service = self.clone();
            let event = Arc::clone(&event);
            let targets = Arc::clone(&targets);
            tokio::spawn(async move { service.run_family(action_type, &event, &targets).await })
        });

        let outcomes: Vec<FamilyOutcome> = join_all(handles)
            .await
            .into_iter()
            .zip(ActionType::ALL.iter())
            .map(|(joined, &action_type)| {
                joined.unwrap_or_else(|e| {
                    tracing::error!(
                        event_id = %event.id,
                        action_type = %action_type,
                        error = %e,
                        "Action task aborted"
                    );
                    FamilyOutcome::failed(action_type, "action task aborted")
                })
            })
            .collect();

        let statuses: Vec<ActionStatus> = outcomes.iter().map(|o| o.status).collect();
        let status = aggregate_status(&statuses);

        let affected = |action_type: ActionType| {
            outcomes
                .iter()
                .find(|o| o.action_type == action_type)
                .map_or(0, |o| o.affected)
        };
        let sessions_terminated = affected(ActionType::TerminateSession);
        let tokens_revoked = affected(ActionType::RevokeTokens);
        let cache_purged = outcomes.iter().any(|o| {
            o.action_type == ActionType::PurgeCache
                && o.status == ActionStatus::Completed
                && !o.degraded
        });

        let errors: Vec<EventErrorEntry> = outcomes
            .iter()
            .filter(|o| o.is_failure())
            .map(|o| {
                EventErrorEntry::for_action(
                    o.action_type,
                    o.error.clone().unwrap_or_else(|| "action failed".to_string()),
                )
            })
            .collect();

        let execution_time_ms = elapsed_ms(started);
        let sla_breached = execution_time_ms > self.execution_target_ms;
        if sla_breached {
            tracing::warn!(
                event_id = %event.id,
                duration_ms = execution_time_ms,
                target_ms = self.execution_target_ms,
                "Kill switch exceeded execution time target"
            );
        }

        let outcome = EventOutcome {
            status,
            completed_at: Utc::now(),
            execution_time_ms,
            sessions_terminated: i32::try_from(sessions_terminated).unwrap_or(i32::MAX),
            tokens_revoked: i32::try_from(tokens_revoked).unwrap_or(i32::MAX),
            cache_purged,
            errors: errors.clone(),
        };

        match self.store.complete_event(event.id, &outcome).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(event_id = %event.id, "Event was already terminal, outcome not recorded");
            }
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "Failed to record kill switch outcome");
                self.force_fail(event.id, started, format!("failed to record outcome: {}", e))
                    .await;
                return Err(e.into());
            }
        }

        tracing::info!(
            event_id = %event.id,
            status = %status,
            duration_ms = execution_time_ms,
            sessions_terminated,
            tokens_revoked,
            "Kill switch finished"
        );

        Ok(KillSwitchResult {
            event_id: event.id,
            status,
            execution_time_ms,
            sessions_terminated,
            tokens_revoked,
            cache_purged,
            sla_breached,
            errors,
        })
    }

    /// Moves the event to FAILED with the error captured. Runs on the path
    /// that is already returning an error, so its own failure is only logged.
    async fn force_fail(&self, event_id: Uuid, started: Instant, message: String) {
        let outcome = EventOutcome::failed(
            Utc::now(),
            elapsed_ms(started),
            vec![EventErrorEntry::general(message)],
        );

        if let Err(e) = self.store.complete_event(event_id, &outcome).await {
            tracing::error!(event_id = %event_id, error = %e, "Failed to mark event as failed");
        }
    }
}
