use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    access_revocation::{AccessRevocation, CreateRevocationData, ReinstateData},
    kill_switch_action::{ActionStatus, CreateKillSwitchActionData, KillSwitchAction},
    kill_switch_event::{CreateKillSwitchEventData, EventFilter, EventOutcome, KillSwitchEvent},
    notification::{CreateNotificationData, Notification},
    refresh_token::RefreshToken,
    tenant_member::TenantMember,
    workspace_session::WorkspaceSession,
};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Durable store port. The single source of truth for kill switch events,
/// their actions and access revocations, plus the platform records the kill
/// switch reads or updates.
#[async_trait]
pub trait KillSwitchStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn create_event(
        &self,
        data: CreateKillSwitchEventData,
    ) -> Result<KillSwitchEvent, StoreError>;

    /// Returns false when the event was already terminal.
    async fn complete_event(&self, id: Uuid, outcome: &EventOutcome) -> Result<bool, StoreError>;

    async fn find_event(&self, id: Uuid) -> Result<Option<KillSwitchEvent>, StoreError>;

    async fn list_events(
        &self,
        filter: &EventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<KillSwitchEvent>, StoreError>;

    async fn count_events(&self, filter: &EventFilter) -> Result<i64, StoreError>;

    async fn find_stale_events(
        &self,
        initiated_before: DateTime<Utc>,
    ) -> Result<Vec<KillSwitchEvent>, StoreError>;

    async fn create_action(
        &self,
        data: CreateKillSwitchActionData,
    ) -> Result<KillSwitchAction, StoreError>;

    async fn finish_action(
        &self,
        id: Uuid,
        status: ActionStatus,
        completed_at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Result<(), StoreError>;

    async fn list_actions(&self, event_id: Uuid) -> Result<Vec<KillSwitchAction>, StoreError>;

    async fn find_session(&self, id: &str) -> Result<Option<WorkspaceSession>, StoreError>;

    async fn running_sessions_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<WorkspaceSession>, StoreError>;

    async fn running_sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<WorkspaceSession>, StoreError>;

    async fn running_sessions(&self) -> Result<Vec<WorkspaceSession>, StoreError>;

    async fn mark_session_terminated(
        &self,
        id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn revoke_refresh_tokens(
        &self,
        user_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn create_revocation(
        &self,
        data: CreateRevocationData,
    ) -> Result<AccessRevocation, StoreError>;

    async fn find_revocation_in_force(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessRevocation>, StoreError>;

    async fn reinstate_revocations(
        &self,
        user_id: &str,
        data: &ReinstateData,
    ) -> Result<u64, StoreError>;

    async fn revocation_history(&self, user_id: &str)
        -> Result<Vec<AccessRevocation>, StoreError>;

    async fn create_notification(
        &self,
        data: CreateNotificationData,
    ) -> Result<Notification, StoreError>;

    async fn tenant_admin_ids(&self, tenant_id: &str) -> Result<Vec<String>, StoreError>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgKillSwitchStore {
    pool: PgPool,
}

impl PgKillSwitchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl KillSwitchStore for PgKillSwitchStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_event(
        &self,
        data: CreateKillSwitchEventData,
    ) -> Result<KillSwitchEvent, StoreError> {
        Ok(KillSwitchEvent::create(&self.pool, data).await?)
    }

    async fn complete_event(&self, id: Uuid, outcome: &EventOutcome) -> Result<bool, StoreError> {
        Ok(KillSwitchEvent::complete(&self.pool, id, outcome).await?)
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<KillSwitchEvent>, StoreError> {
        Ok(KillSwitchEvent::find_by_id(&self.pool, id).await?)
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<KillSwitchEvent>, StoreError> {
        Ok(KillSwitchEvent::list(&self.pool, filter, limit, offset).await?)
    }

    async fn count_events(&self, filter: &EventFilter) -> Result<i64, StoreError> {
        Ok(KillSwitchEvent::count(&self.pool, filter).await?)
    }

    async fn find_stale_events(
        &self,
        initiated_before: DateTime<Utc>,
    ) -> Result<Vec<KillSwitchEvent>, StoreError> {
        Ok(KillSwitchEvent::find_stale(&self.pool, initiated_before).await?)
    }

    async fn create_action(
        &self,
        data: CreateKillSwitchActionData,
    ) -> Result<KillSwitchAction, StoreError> {
        Ok(KillSwitchAction::create(&self.pool, data).await?)
    }

    async fn finish_action(
        &self,
        id: Uuid,
        status: ActionStatus,
        completed_at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        Ok(KillSwitchAction::finish(&self.pool, id, status, completed_at, error_message).await?)
    }

    async fn list_actions(&self, event_id: Uuid) -> Result<Vec<KillSwitchAction>, StoreError> {
        Ok(KillSwitchAction::list_by_event(&self.pool, event_id).await?)
    }

    async fn find_session(&self, id: &str) -> Result<Option<WorkspaceSession>, StoreError> {
        Ok(WorkspaceSession::find_by_id(&self.pool, id).await?)
    }

    async fn running_sessions_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<WorkspaceSession>, StoreError> {
        Ok(WorkspaceSession::list_running_by_tenant(&self.pool, tenant_id).await?)
    }

    async fn running_sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<WorkspaceSession>, StoreError> {
        Ok(WorkspaceSession::list_running_by_user(&self.pool, user_id).await?)
    }

    async fn running_sessions(&self) -> Result<Vec<WorkspaceSession>, StoreError> {
        Ok(WorkspaceSession::list_running(&self.pool).await?)
    }

    async fn mark_session_terminated(
        &self,
        id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        WorkspaceSession::mark_terminated(&self.pool, id, ended_at)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => StoreError::NotFound(format!("session {}", id)),
                other => StoreError::Database(other),
            })
    }

    async fn revoke_refresh_tokens(
        &self,
        user_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(RefreshToken::revoke_all_for_user(&self.pool, user_id, revoked_at).await?)
    }

    async fn create_revocation(
        &self,
        data: CreateRevocationData,
    ) -> Result<AccessRevocation, StoreError> {
        Ok(AccessRevocation::create(&self.pool, data).await?)
    }

    async fn find_revocation_in_force(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessRevocation>, StoreError> {
        Ok(AccessRevocation::find_in_force(&self.pool, user_id, now).await?)
    }

    async fn reinstate_revocations(
        &self,
        user_id: &str,
        data: &ReinstateData,
    ) -> Result<u64, StoreError> {
        Ok(AccessRevocation::reinstate_all(&self.pool, user_id, data).await?)
    }

    async fn revocation_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<AccessRevocation>, StoreError> {
        Ok(AccessRevocation::list_by_user(&self.pool, user_id).await?)
    }

    async fn create_notification(
        &self,
        data: CreateNotificationData,
    ) -> Result<Notification, StoreError> {
        Ok(Notification::create(&self.pool, data).await?)
    }

    async fn tenant_admin_ids(&self, tenant_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(TenantMember::list_admin_user_ids(&self.pool, tenant_id).await?)
    }
}
