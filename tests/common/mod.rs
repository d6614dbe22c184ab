#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::types::Json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use killswitch::db::{KillSwitchStore, StoreError};
use killswitch::models::{
    access_revocation::{CreateRevocationData, ReinstateData},
    kill_switch_action::{ActionStatus, ActionType, CreateKillSwitchActionData},
    kill_switch_event::{
        CreateKillSwitchEventData, EventFilter, EventOutcome, EventStatus, KillSwitchScope,
        TriggerReason,
    },
    notification::CreateNotificationData,
    workspace_session::{STATUS_RUNNING, STATUS_TERMINATED},
    AccessRevocation, KillSwitchAction, KillSwitchEvent, Notification, WorkspaceSession,
};
use killswitch::services::{
    cache::{CacheError, CacheStore, MemoryCache},
    edge_cache::{EdgeCacheError, EdgeCacheInvalidator},
    kill_switch::KillSwitchService,
    session_transport::{SessionMessage, SessionTransport, TransportError},
    workspace_provider::{
        ConnectionToken, WorkspaceProvider, WorkspaceProviderError, WorkspaceSize,
        WorkspaceStatus,
    },
};

#[derive(Default)]
struct StoreState {
    events: Vec<KillSwitchEvent>,
    actions: Vec<KillSwitchAction>,
    sessions: Vec<WorkspaceSession>,
    refresh_tokens: Vec<(String, Option<DateTime<Utc>>)>,
    revocations: Vec<AccessRevocation>,
    notifications: Vec<Notification>,
    tenant_members: Vec<(String, String, String)>,
}

/// In-memory durable store with per-operation failure injection
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// Makes `op` fail. Per-target operations use `op:target`, e.g.
    /// `mark_session:s2`; a bare `op` fails every target.
    pub fn fail(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    /// Makes `op` panic instead of returning
    pub fn panic_on(&self, op: &str) {
        self.panicking.lock().unwrap().insert(op.to_string());
    }

    fn check(&self, op: &str, target: Option<&str>) -> Result<(), StoreError> {
        let panics = self.panicking.lock().unwrap().contains(op);
        if panics {
            panic!("injected {} panic", op);
        }

        let failing = self.failing.lock().unwrap();
        let targeted = target.map_or(false, |t| failing.contains(&format!("{}:{}", op, t)));
        if failing.contains(op) || targeted {
            return Err(StoreError::Unavailable(format!("injected {} failure", op)));
        }
        Ok(())
    }

    pub fn add_session(
        &self,
        id: &str,
        tenant_id: &str,
        user_id: &str,
        workspace_id: Option<&str>,
        pod_id: Option<&str>,
    ) {
        self.state.lock().unwrap().sessions.push(WorkspaceSession {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            workspace_id: workspace_id.map(str::to_string),
            status: STATUS_RUNNING.to_string(),
            config: pod_id.map(|pod| json!({ "podId": pod, "image": "desktop:latest" })),
            started_at: Utc::now(),
            ended_at: None,
        });
    }

    pub fn add_refresh_token(&self, user_id: &str) {
        self.state
            .lock()
            .unwrap()
            .refresh_tokens
            .push((user_id.to_string(), None));
    }

    pub fn add_tenant_member(&self, tenant_id: &str, user_id: &str, role: &str) {
        self.state.lock().unwrap().tenant_members.push((
            tenant_id.to_string(),
            user_id.to_string(),
            role.to_string(),
        ));
    }

    pub fn insert_event(&self, event: KillSwitchEvent) {
        self.state.lock().unwrap().events.push(event);
    }

    pub fn insert_revocation(&self, revocation: AccessRevocation) {
        self.state.lock().unwrap().revocations.push(revocation);
    }

    pub fn events(&self) -> Vec<KillSwitchEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn event(&self, id: Uuid) -> KillSwitchEvent {
        self.events()
            .into_iter()
            .find(|e| e.id == id)
            .expect("event exists")
    }

    pub fn actions_for(&self, event_id: Uuid) -> Vec<KillSwitchAction> {
        self.state
            .lock()
            .unwrap()
            .actions
            .iter()
            .filter(|a| a.kill_switch_event_id == event_id)
            .cloned()
            .collect()
    }

    pub fn action(&self, event_id: Uuid, action_type: ActionType) -> KillSwitchAction {
        self.actions_for(event_id)
            .into_iter()
            .find(|a| a.action_type == action_type)
            .expect("action exists")
    }

    pub fn session(&self, id: &str) -> WorkspaceSession {
        self.state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .expect("session exists")
    }

    pub fn unrevoked_tokens(&self, user_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .refresh_tokens
            .iter()
            .filter(|(user, revoked_at)| user == user_id && revoked_at.is_none())
            .count()
    }

    pub fn revocations_for(&self, user_id: &str) -> Vec<AccessRevocation> {
        self.state
            .lock()
            .unwrap()
            .revocations
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl KillSwitchStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check("ping", None)
    }

    async fn create_event(
        &self,
        data: CreateKillSwitchEventData,
    ) -> Result<KillSwitchEvent, StoreError> {
        self.check("create_event", None)?;

        let event = KillSwitchEvent {
            id: Uuid::new_v4(),
            scope: data.scope,
            tenant_id: data.tenant_id,
            user_id: data.user_id,
            pod_id: data.pod_id,
            session_id: data.session_id,
            triggered_by: data.triggered_by,
            trigger_reason: data.trigger_reason,
            trigger_details: data.trigger_details,
            status: EventStatus::InProgress,
            initiated_at: data.initiated_at,
            completed_at: None,
            execution_time_ms: None,
            sessions_terminated: 0,
            tokens_revoked: 0,
            cache_purged: false,
            errors: Json(Vec::new()),
        };
        self.state.lock().unwrap().events.push(event.clone());
        Ok(event)
    }

    async fn complete_event(&self, id: Uuid, outcome: &EventOutcome) -> Result<bool, StoreError> {
        self.check("complete_event", None)?;

        let mut state = self.state.lock().unwrap();
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("event {}", id)))?;

        if !event.status.can_transition_to(outcome.status) {
            return Ok(false);
        }

        event.status = outcome.status;
        event.completed_at = Some(outcome.completed_at);
        event.execution_time_ms = Some(outcome.execution_time_ms);
        event.sessions_terminated = outcome.sessions_terminated;
        event.tokens_revoked = outcome.tokens_revoked;
        event.cache_purged = outcome.cache_purged;
        event.errors = Json(outcome.errors.clone());
        Ok(true)
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<KillSwitchEvent>, StoreError> {
        self.check("find_event", None)?;
        Ok(self.events().into_iter().find(|e| e.id == id))
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<KillSwitchEvent>, StoreError> {
        self.check("list_events", None)?;

        let mut events: Vec<KillSwitchEvent> = self
            .events()
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        events.sort_by(|a, b| b.initiated_at.cmp(&a.initiated_at));
        Ok(events
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_events(&self, filter: &EventFilter) -> Result<i64, StoreError> {
        self.check("count_events", None)?;
        Ok(self.events().iter().filter(|e| filter.matches(e)).count() as i64)
    }

    async fn find_stale_events(
        &self,
        initiated_before: DateTime<Utc>,
    ) -> Result<Vec<KillSwitchEvent>, StoreError> {
        self.check("find_stale_events", None)?;
        Ok(self
            .events()
            .into_iter()
            .filter(|e| e.status == EventStatus::InProgress && e.initiated_at < initiated_before)
            .collect())
    }

    async fn create_action(
        &self,
        data: CreateKillSwitchActionData,
    ) -> Result<KillSwitchAction, StoreError> {
        self.check("create_action", Some(data.action_type.as_str()))?;

        let mut state = self.state.lock().unwrap();
        let duplicate = state.actions.iter().any(|a| {
            a.kill_switch_event_id == data.kill_switch_event_id && a.action_type == data.action_type
        });
        if duplicate {
            return Err(StoreError::Unavailable("duplicate action".to_string()));
        }

        let action = KillSwitchAction {
            id: Uuid::new_v4(),
            kill_switch_event_id: data.kill_switch_event_id,
            action_type: data.action_type,
            target: data.target,
            target_type: data.target_type,
            status: ActionStatus::InProgress,
            started_at: Some(data.started_at),
            completed_at: None,
            error_message: None,
        };
        state.actions.push(action.clone());
        Ok(action)
    }

    async fn finish_action(
        &self,
        id: Uuid,
        status: ActionStatus,
        completed_at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        self.check("finish_action", None)?;

        let mut state = self.state.lock().unwrap();
        let action = state
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("action {}", id)))?;
        action.status = status;
        action.completed_at = Some(completed_at);
        action.error_message = error_message;
        Ok(())
    }

    async fn list_actions(&self, event_id: Uuid) -> Result<Vec<KillSwitchAction>, StoreError> {
        self.check("list_actions", None)?;
        Ok(self.actions_for(event_id))
    }

    async fn find_session(&self, id: &str) -> Result<Option<WorkspaceSession>, StoreError> {
        self.check("find_session", None)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn running_sessions_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<WorkspaceSession>, StoreError> {
        Ok(self
            .running_sessions()
            .await?
            .into_iter()
            .filter(|s| s.tenant_id == tenant_id)
            .collect())
    }

    async fn running_sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<WorkspaceSession>, StoreError> {
        Ok(self
            .running_sessions()
            .await?
            .into_iter()
            .filter(|s| s.user_id == user_id)
            .collect())
    }

    async fn running_sessions(&self) -> Result<Vec<WorkspaceSession>, StoreError> {
        self.check("running_sessions", None)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.is_running())
            .cloned()
            .collect())
    }

    async fn mark_session_terminated(
        &self,
        id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check("mark_session", Some(id))?;

        let mut state = self.state.lock().unwrap();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", id)))?;
        session.status = STATUS_TERMINATED.to_string();
        session.ended_at.get_or_insert(ended_at);
        Ok(())
    }

    async fn revoke_refresh_tokens(
        &self,
        user_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check("revoke_tokens", Some(user_id))?;

        let mut state = self.state.lock().unwrap();
        let mut revoked = 0;
        for (user, token_revoked_at) in state.refresh_tokens.iter_mut() {
            if user == user_id && token_revoked_at.is_none() {
                *token_revoked_at = Some(revoked_at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn create_revocation(
        &self,
        data: CreateRevocationData,
    ) -> Result<AccessRevocation, StoreError> {
        self.check("create_revocation", Some(&data.user_id))?;

        let revocation = AccessRevocation {
            id: Uuid::new_v4(),
            tenant_id: data.tenant_id,
            user_id: data.user_id,
            revoked_by: data.revoked_by,
            reason: data.reason,
            scope: data.scope,
            is_active: true,
            kill_switch_event_id: data.kill_switch_event_id,
            created_at: data.created_at,
            expires_at: data.expires_at,
            reinstated_by: None,
            reinstated_at: None,
            reinstate_reason: None,
        };
        self.state
            .lock()
            .unwrap()
            .revocations
            .push(revocation.clone());
        Ok(revocation)
    }

    async fn find_revocation_in_force(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessRevocation>, StoreError> {
        self.check("find_revocation", None)?;
        Ok(self
            .revocations_for(user_id)
            .into_iter()
            .filter(|r| r.is_in_force(now))
            .max_by_key(|r| r.created_at))
    }

    async fn reinstate_revocations(
        &self,
        user_id: &str,
        data: &ReinstateData,
    ) -> Result<u64, StoreError> {
        self.check("reinstate", None)?;

        let mut state = self.state.lock().unwrap();
        let mut lifted = 0;
        for revocation in state.revocations.iter_mut() {
            if revocation.user_id == user_id && revocation.is_active {
                revocation.is_active = false;
                revocation.reinstated_by = Some(data.reinstated_by.clone());
                revocation.reinstated_at = Some(data.reinstated_at);
                revocation.reinstate_reason = Some(data.reason.clone());
                lifted += 1;
            }
        }
        Ok(lifted)
    }

    async fn revocation_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<AccessRevocation>, StoreError> {
        self.check("revocation_history", None)?;
        let mut history = self.revocations_for(user_id);
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }

    async fn create_notification(
        &self,
        data: CreateNotificationData,
    ) -> Result<Notification, StoreError> {
        self.check("create_notification", Some(&data.user_id))?;

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            tenant_id: data.tenant_id,
            notification_type: data.notification_type,
            title: data.title,
            message: data.message,
            metadata: data.metadata,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn tenant_admin_ids(&self, tenant_id: &str) -> Result<Vec<String>, StoreError> {
        self.check("tenant_admins", None)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .tenant_members
            .iter()
            .filter(|(tenant, _, role)| tenant == tenant_id && (role == "ADMIN" || role == "OWNER"))
            .map(|(_, user, _)| user.clone())
            .collect())
    }
}

/// Memory cache whose reads or writes can be switched to fail
#[derive(Default)]
pub struct FlakyCache {
    pub inner: MemoryCache,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyCache {
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected cache failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check(&self.fail_writes)?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check(&self.fail_writes)?;
        self.inner.delete(key).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.check(&self.fail_reads)?;
        self.inner.scan(pattern).await
    }
}

#[derive(Default)]
pub struct FakeWorkspaceProvider {
    pub terminated: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeWorkspaceProvider {
    pub fn fail_for(&self, workspace_id: &str) {
        self.failing.lock().unwrap().insert(workspace_id.to_string());
    }

    /// Every termination call waits this long before answering
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn terminated(&self) -> Vec<String> {
        let mut ids = self.terminated.lock().unwrap().clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl WorkspaceProvider for FakeWorkspaceProvider {
    async fn terminate_workspace(&self, workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(workspace_id) {
            return Err(WorkspaceProviderError::ApiError {
                status: reqwest::StatusCode::BAD_GATEWAY,
                message: "provider unavailable".to_string(),
            });
        }
        self.terminated
            .lock()
            .unwrap()
            .push(workspace_id.to_string());
        Ok(())
    }

    async fn pause_workspace(&self, _workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        Ok(())
    }

    async fn resume_workspace(&self, _workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        Ok(())
    }

    async fn get_workspace_status(
        &self,
        workspace_id: &str,
    ) -> Result<WorkspaceStatus, WorkspaceProviderError> {
        Ok(WorkspaceStatus {
            workspace_id: workspace_id.to_string(),
            state: "RUNNING".to_string(),
        })
    }

    async fn resize_workspace(
        &self,
        _workspace_id: &str,
        _size: WorkspaceSize,
    ) -> Result<(), WorkspaceProviderError> {
        Ok(())
    }

    async fn get_connection_token(
        &self,
        _workspace_id: &str,
        _user_id: &str,
    ) -> Result<ConnectionToken, WorkspaceProviderError> {
        Ok(ConnectionToken {
            token: "token".to_string(),
            expires_at: Utc::now(),
        })
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub sent: Mutex<Vec<(String, SessionMessage)>>,
}

#[async_trait]
impl SessionTransport for FakeTransport {
    async fn send_to_session(
        &self,
        session_id: &str,
        message: &SessionMessage,
    ) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), message.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeEdgeCache {
    pub tenants: Mutex<Vec<String>>,
    pub sessions: Mutex<Vec<String>>,
}

#[async_trait]
impl EdgeCacheInvalidator for FakeEdgeCache {
    async fn invalidate_tenant_cache(&self, tenant_id: &str) -> Result<(), EdgeCacheError> {
        self.tenants.lock().unwrap().push(tenant_id.to_string());
        Ok(())
    }

    async fn invalidate_session_cache(&self, session_id: &str) -> Result<(), EdgeCacheError> {
        self.sessions.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

/// Service wired to in-memory fakes, with handles to inspect each one
pub struct Harness {
    pub service: KillSwitchService,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<FlakyCache>,
    pub workspaces: Arc<FakeWorkspaceProvider>,
    pub transport: Arc<FakeTransport>,
    pub edge_cache: Arc<FakeEdgeCache>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(FlakyCache::default());
        let workspaces = Arc::new(FakeWorkspaceProvider::default());
        let transport = Arc::new(FakeTransport::default());
        let edge_cache = Arc::new(FakeEdgeCache::default());

        let service = KillSwitchService::new(
            store.clone(),
            cache.clone(),
            workspaces.clone(),
            transport.clone(),
            edge_cache.clone(),
        );

        Self {
            service,
            store,
            cache,
            workspaces,
            transport,
            edge_cache,
        }
    }

    /// A second service instance sharing this harness's store and cache,
    /// as another replica would
    pub fn replica(&self) -> KillSwitchService {
        KillSwitchService::new(
            self.store.clone(),
            self.cache.clone(),
            Arc::new(FakeWorkspaceProvider::default()),
            Arc::new(FakeTransport::default()),
            Arc::new(FakeEdgeCache::default()),
        )
    }

    /// Polls until the only stored event leaves IN_PROGRESS
    pub async fn settled_event(&self) -> KillSwitchEvent {
        for _ in 0..200 {
            let events = self.store.events();
            if let Some(event) = events.first() {
                if event.status != EventStatus::InProgress {
                    return event.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("event never reached a terminal status");
    }
}

/// A stored event with the given attributes, for audit queries
pub fn stored_event(
    tenant_id: Option<&str>,
    user_id: Option<&str>,
    status: EventStatus,
    reason: TriggerReason,
    initiated_at: DateTime<Utc>,
) -> KillSwitchEvent {
    let scope = if user_id.is_some() {
        KillSwitchScope::User
    } else {
        KillSwitchScope::Tenant
    };

    KillSwitchEvent {
        id: Uuid::new_v4(),
        scope,
        tenant_id: tenant_id.map(str::to_string),
        user_id: user_id.map(str::to_string),
        pod_id: None,
        session_id: None,
        triggered_by: "admin1".to_string(),
        trigger_reason: reason,
        trigger_details: None,
        status,
        initiated_at,
        completed_at: status.is_terminal().then_some(initiated_at),
        execution_time_ms: status.is_terminal().then_some(120),
        sessions_terminated: 0,
        tokens_revoked: 0,
        cache_purged: false,
        errors: Json(Vec::new()),
    }
}

/// An active revocation with an optional expiry
pub fn stored_revocation(
    user_id: &str,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> AccessRevocation {
    AccessRevocation {
        id: Uuid::new_v4(),
        tenant_id: Some("t1".to_string()),
        user_id: user_id.to_string(),
        revoked_by: "admin1".to_string(),
        reason: "POLICY_VIOLATION".to_string(),
        scope: "USER".to_string(),
        is_active: true,
        kill_switch_event_id: None,
        created_at,
        expires_at,
        reinstated_by: None,
        reinstated_at: None,
        reinstate_reason: None,
    }
}
