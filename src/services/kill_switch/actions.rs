use chrono::Utc;
use futures::future::join_all;

use super::{block_store::BlockCacheEntry, keys, templates, KillSwitchError, KillSwitchService, ResolvedTargets};
use crate::models::{
    access_revocation::CreateRevocationData,
    kill_switch_action::{ActionStatus, ActionType, CreateKillSwitchActionData, TargetType},
    kill_switch_event::{KillSwitchEvent, KillSwitchScope},
    WorkspaceSession,
};
use crate::services::{
    edge_cache::EdgeCacheError,
    session_transport::{SessionMessage, TransportError},
    workspace_provider::WorkspaceProviderError,
};

/// Settled result of one action family
#[derive(Debug, Clone)]
pub struct FamilyOutcome {
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub affected: u32,
    pub error: Option<String>,
    /// Completed without a side effect whose collaborator is not configured
    pub degraded: bool,
}

impl FamilyOutcome {
    pub fn failed(action_type: ActionType, error: impl Into<String>) -> Self {
        Self {
            action_type,
            status: ActionStatus::Failed,
            affected: 0,
            error: Some(error.into()),
            degraded: false,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == ActionStatus::Failed
    }
}

/// Per-family tally. Failures fail the action; warnings are recorded on a
/// COMPLETED action.
#[derive(Debug, Default)]
struct FamilyReport {
    affected: u32,
    failures: Vec<String>,
    warnings: Vec<String>,
    degraded: bool,
}

impl FamilyReport {
    fn error_message(&self) -> Option<String> {
        if !self.failures.is_empty() {
            let mut parts = self.failures.clone();
            parts.extend(self.warnings.iter().map(|w| format!("non-fatal: {}", w)));
            return Some(parts.join("; "));
        }
        if !self.warnings.is_empty() {
            let parts: Vec<String> = self
                .warnings
                .iter()
                .map(|w| format!("non-fatal: {}", w))
                .collect();
            return Some(parts.join("; "));
        }
        None
    }
}

struct TargetDescriptor {
    target: String,
    target_type: TargetType,
    has_work: bool,
}

fn describe_target(
    action_type: ActionType,
    event: &KillSwitchEvent,
    targets: &ResolvedTargets,
) -> TargetDescriptor {
    let joined_users = targets.user_ids.join(",");
    let (target, target_type, has_work) = match action_type {
        ActionType::TerminateSession => (
            targets.session_ids().collect::<Vec<_>>().join(","),
            TargetType::Session,
            !targets.sessions.is_empty(),
        ),
        ActionType::RevokeTokens | ActionType::BlockReconnection | ActionType::NotifyUser => {
            (joined_users, TargetType::User, !targets.user_ids.is_empty())
        }
        ActionType::PurgeCache => (
            "all_caches".to_string(),
            TargetType::Cache,
            !targets.is_empty() || tenant_scope(event).is_some(),
        ),
        ActionType::NotifyAdmin => match tenant_scope(event) {
            Some(tenant_id) => (tenant_id.to_string(), TargetType::Tenant, true),
            None => (String::new(), TargetType::Tenant, false),
        },
    };

    if has_work {
        TargetDescriptor {
            target,
            target_type,
            has_work,
        }
    } else {
        TargetDescriptor {
            target: "none".to_string(),
            target_type: TargetType::Unscoped,
            has_work,
        }
    }
}

/// The tenant of a tenant-scoped event
fn tenant_scope(event: &KillSwitchEvent) -> Option<&str> {
    match event.scope {
        KillSwitchScope::Tenant => event.tenant_id.as_deref(),
        _ => None,
    }
}

impl KillSwitchService {
    /// Runs one action family against its own action row. Never returns an
    /// error: every failure is folded into the outcome.
    pub(super) async fn run_family(
        &self,
        action_type: ActionType,
        event: &KillSwitchEvent,
        targets: &ResolvedTargets,
    ) -> FamilyOutcome {
        let descriptor = describe_target(action_type, event, targets);

        let action = match self
            .store
            .create_action(CreateKillSwitchActionData {
                kill_switch_event_id: event.id,
                action_type,
                target: descriptor.target.clone(),
                target_type: descriptor.target_type,
                started_at: Utc::now(),
            })
            .await
        {
            Ok(action) => action,
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    action_type = %action_type,
                    error = %e,
                    "Failed to record kill switch action"
                );
                return FamilyOutcome::failed(action_type, format!("failed to record action: {}", e));
            }
        };

        let outcome = if descriptor.has_work {
            let report = match action_type {
                ActionType::TerminateSession => self.terminate_sessions(targets).await,
                ActionType::RevokeTokens => self.revoke_tokens(targets).await,
                ActionType::PurgeCache => self.purge_caches(event, targets).await,
                ActionType::BlockReconnection => self.block_reconnection(event, targets).await,
                ActionType::NotifyUser => self.notify_users(event, targets).await,
                ActionType::NotifyAdmin => self.notify_admins(event).await,
            };

            let status = if report.failures.is_empty() {
                ActionStatus::Completed
            } else {
                ActionStatus::Failed
            };

            FamilyOutcome {
                action_type,
                status,
                affected: report.affected,
                error: report.error_message(),
                degraded: report.degraded,
            }
        } else {
            FamilyOutcome {
                action_type,
                status: ActionStatus::Skipped,
                affected: 0,
                error: None,
                degraded: false,
            }
        };

        match outcome.status {
            ActionStatus::Failed => tracing::error!(
                event_id = %event.id,
                action_type = %action_type,
                affected = outcome.affected,
                error = ?outcome.error,
                "Kill switch action failed"
            ),
            status => tracing::info!(
                event_id = %event.id,
                action_type = %action_type,
                status = %status,
                affected = outcome.affected,
                "Kill switch action finished"
            ),
        }

        if let Err(e) = self
            .store
            .finish_action(action.id, outcome.status, Utc::now(), outcome.error.clone())
            .await
        {
            tracing::error!(
                event_id = %event.id,
                action_id = %action.id,
                error = %e,
                "Failed to record kill switch action outcome"
            );
        }

        outcome
    }

    async fn terminate_sessions(&self, targets: &ResolvedTargets) -> FamilyReport {
        let results = join_all(targets.sessions.iter().map(|s| self.terminate_session(s))).await;

        let mut report = FamilyReport::default();
        for (session, result) in targets.sessions.iter().zip(results) {
            match result {
                Ok(warnings) => {
                    report.affected += 1;
                    report.warnings.extend(warnings);
                }
                Err(e) => report
                    .failures
                    .push(format!("session {}: {}", session.id, e)),
            }
        }
        report
    }

    /// Provider termination and the live push are best-effort; the session
    /// row update is what must succeed.
    async fn terminate_session(
        &self,
        session: &WorkspaceSession,
    ) -> Result<Vec<String>, KillSwitchError> {
        let mut warnings = Vec::new();

        if let Some(workspace_id) = &session.workspace_id {
            match self.workspaces.terminate_workspace(workspace_id).await {
                Ok(()) => {}
                Err(WorkspaceProviderError::NotConfigured) => {
                    tracing::debug!(session_id = %session.id, "Workspace provider not configured");
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.id,
                        workspace_id = %workspace_id,
                        error = %e,
                        "Workspace termination failed, continuing"
                    );
                    warnings.push(format!("workspace {}: {}", workspace_id, e));
                }
            }
        }

        match self
            .transport
            .send_to_session(&session.id, &SessionMessage::access_revoked())
            .await
        {
            Ok(()) => {}
            Err(TransportError::NotConfigured) => {
                tracing::debug!(session_id = %session.id, "Realtime gateway not configured");
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Termination push failed, continuing"
                );
                warnings.push(format!("push to session {}: {}", session.id, e));
            }
        }

        self.store
            .mark_session_terminated(&session.id, Utc::now())
            .await?;

        Ok(warnings)
    }

    async fn revoke_tokens(&self, targets: &ResolvedTargets) -> FamilyReport {
        let results = join_all(targets.user_ids().map(|u| self.revoke_user_tokens(u))).await;

        let mut report = FamilyReport::default();
        for (user_id, result) in targets.user_ids().zip(results) {
            match result {
                Ok(token_count) => {
                    tracing::debug!(user_id = %user_id, token_count, "Refresh tokens revoked");
                    report.affected += 1;
                }
                Err(e) => report.failures.push(format!("user {}: {}", user_id, e)),
            }
        }
        report
    }

    async fn revoke_user_tokens(&self, user_id: &str) -> Result<u64, KillSwitchError> {
        let revoked = self.store.revoke_refresh_tokens(user_id, Utc::now()).await?;

        self.cache.delete(&keys::user_sessions(user_id)).await?;
        self.cache
            .delete_pattern(&keys::session_tokens(user_id))
            .await?;
        self.cache
            .set_ex(&keys::revoked_flag(user_id), "1", keys::REVOKED_FLAG_TTL)
            .await?;

        Ok(revoked)
    }

    async fn purge_caches(&self, event: &KillSwitchEvent, targets: &ResolvedTargets) -> FamilyReport {
        let patterns = keys::purge_patterns(targets.session_ids(), targets.user_ids());

        let cache_purges = join_all(patterns.iter().map(|p| self.cache.delete_pattern(p)));
        let tenant_invalidation = async {
            match tenant_scope(event) {
                Some(tenant_id) => Some((
                    format!("tenant {}", tenant_id),
                    self.edge_cache.invalidate_tenant_cache(tenant_id).await,
                )),
                None => None,
            }
        };
        let session_invalidations = join_all(
            targets
                .session_ids()
                .map(|id| self.edge_cache.invalidate_session_cache(id)),
        );

        let (purged, tenant_result, session_results) =
            tokio::join!(cache_purges, tenant_invalidation, session_invalidations);

        let mut report = FamilyReport::default();
        for (pattern, result) in patterns.iter().zip(purged) {
            match result {
                Ok(count) => {
                    let count = u32::try_from(count).unwrap_or(u32::MAX);
                    report.affected = report.affected.saturating_add(count);
                }
                Err(e) => report.failures.push(format!("cache {}: {}", pattern, e)),
            }
        }

        let edge_results = tenant_result.into_iter().chain(
            targets
                .session_ids()
                .zip(session_results)
                .map(|(session_id, result)| (format!("session {}", session_id), result)),
        );
        for (scope, result) in edge_results {
            match result {
                Ok(()) => {}
                Err(EdgeCacheError::NotConfigured) => report.degraded = true,
                Err(e) => report
                    .failures
                    .push(format!("edge cache for {}: {}", scope, e)),
            }
        }
        if report.degraded {
            tracing::debug!(event_id = %event.id, "Edge cache not configured, CDN paths not invalidated");
            report
                .warnings
                .push("edge cache not configured, CDN paths not invalidated".to_string());
        }
        report
    }

    async fn block_reconnection(
        &self,
        event: &KillSwitchEvent,
        targets: &ResolvedTargets,
    ) -> FamilyReport {
        let results = join_all(
            targets
                .user_ids()
                .map(|u| self.block_user(event, targets, u)),
        )
        .await;

        let mut report = FamilyReport::default();
        for (user_id, result) in targets.user_ids().zip(results) {
            match result {
                Ok(warning) => {
                    report.affected += 1;
                    report.warnings.extend(warning);
                }
                Err(e) => report.failures.push(format!("user {}: {}", user_id, e)),
            }
        }
        report
    }

    /// The durable revocation must be written; the block cache entry is a
    /// fast path only.
    async fn block_user(
        &self,
        event: &KillSwitchEvent,
        targets: &ResolvedTargets,
        user_id: &str,
    ) -> Result<Option<String>, KillSwitchError> {
        let now = Utc::now();

        let revocation = self
            .store
            .create_revocation(CreateRevocationData {
                tenant_id: targets.tenant_id.clone(),
                user_id: user_id.to_string(),
                revoked_by: event.triggered_by.clone(),
                reason: event.trigger_reason.to_string(),
                scope: event.scope.to_string(),
                kill_switch_event_id: Some(event.id),
                created_at: now,
                expires_at: None,
            })
            .await?;

        let entry = BlockCacheEntry {
            event_id: event.id,
            blocked_at: now,
            reason: event.trigger_reason.to_string(),
        };

        let cached = match serde_json::to_string(&entry) {
            Ok(value) => self
                .cache
                .set_ex(&keys::blocked(user_id), &value, keys::BLOCK_ENTRY_TTL)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match cached {
            Ok(()) => {
                tracing::info!(
                    user_id = %user_id,
                    revocation_id = %revocation.id,
                    "Reconnection blocked"
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    revocation_id = %revocation.id,
                    error = %e,
                    "Block cache write failed, durable revocation stands"
                );
                Ok(Some(format!("block cache for user {}: {}", user_id, e)))
            }
        }
    }

    /// Best-effort: individual delivery failures never fail the action
    async fn notify_users(&self, event: &KillSwitchEvent, targets: &ResolvedTargets) -> FamilyReport {
        let results = join_all(targets.user_ids().map(|user_id| {
            self.store
                .create_notification(templates::user_revocation_notice(event, user_id))
        }))
        .await;

        let mut report = FamilyReport::default();
        for (user_id, result) in targets.user_ids().zip(results) {
            match result {
                Ok(_) => report.affected += 1,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "User notification failed");
                    report
                        .warnings
                        .push(format!("notify user {}: {}", user_id, e));
                }
            }
        }
        report
    }

    async fn notify_admins(&self, event: &KillSwitchEvent) -> FamilyReport {
        let mut report = FamilyReport::default();
        let Some(tenant_id) = tenant_scope(event) else {
            return report;
        };

        let admin_ids = match self.store.tenant_admin_ids(tenant_id).await {
            Ok(ids) => ids,
            Err(e) => {
                report
                    .failures
                    .push(format!("tenant admins for {}: {}", tenant_id, e));
                return report;
            }
        };

        if admin_ids.is_empty() {
            tracing::warn!(tenant_id = %tenant_id, "Tenant has no administrators to notify");
        }

        let results = join_all(admin_ids.iter().map(|admin_id| {
            self.store
                .create_notification(templates::admin_alert(event, tenant_id, admin_id))
        }))
        .await;

        for (admin_id, result) in admin_ids.iter().zip(results) {
            match result {
                Ok(_) => report.affected += 1,
                Err(e) => {
                    tracing::warn!(admin_id = %admin_id, error = %e, "Admin notification failed");
                    report
                        .warnings
                        .push(format!("notify admin {}: {}", admin_id, e));
                }
            }
        }
        report
    }
}
