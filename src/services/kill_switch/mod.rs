//! Instant access kill switch.
//!
//! Terminates every active workspace session in a tenant, user, pod or
//! single-session scope and prevents reconnection. Six action families run
//! concurrently per invocation; each one's outcome is recorded on its own
//! action row and rolled up into the event status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{KillSwitchStore, StoreError};
use crate::models::kill_switch_event::{
    CreateKillSwitchEventData, EventErrorEntry, EventStatus, KillSwitchScope, TriggerReason,
};
use crate::services::{
    cache::{CacheError, CacheStore},
    edge_cache::EdgeCacheInvalidator,
    session_transport::SessionTransport,
    workspace_provider::WorkspaceProvider,
};

mod actions;
pub mod audit;
pub mod block_store;
pub mod keys;
mod orchestrator;
pub mod reinstatement;
pub mod targets;
mod templates;

pub use audit::{EventDetail, Page, Pagination};
pub use block_store::{BlockCacheEntry, BlockStatus};
pub use orchestrator::aggregate_status;
pub use reinstatement::ReinstateParams;
pub use targets::ResolvedTargets;

/// Target end-to-end execution time. Exceeding it is logged, not failed.
pub const MAX_EXECUTION_TIME_MS: i64 = 5000;

#[derive(thiserror::Error, Debug)]
pub enum KillSwitchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Kill switch execution aborted: {0}")]
    Aborted(String),
}

/// Invocation parameters. Only the discriminator matching `scope` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchParams {
    pub scope: KillSwitchScope,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub pod_id: Option<String>,
    pub session_id: Option<String>,
    pub triggered_by: String,
    pub reason: TriggerReason,
    pub details: Option<String>,
}

impl KillSwitchParams {
    fn scoped(scope: KillSwitchScope, triggered_by: &str, reason: TriggerReason) -> Self {
        Self {
            scope,
            tenant_id: None,
            user_id: None,
            pod_id: None,
            session_id: None,
            triggered_by: triggered_by.to_string(),
            reason,
            details: None,
        }
    }

    pub fn tenant(tenant_id: &str, triggered_by: &str, reason: TriggerReason) -> Self {
        Self {
            tenant_id: Some(tenant_id.to_string()),
            ..Self::scoped(KillSwitchScope::Tenant, triggered_by, reason)
        }
    }

    pub fn user(user_id: &str, triggered_by: &str, reason: TriggerReason) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::scoped(KillSwitchScope::User, triggered_by, reason)
        }
    }

    pub fn pod(pod_id: &str, triggered_by: &str, reason: TriggerReason) -> Self {
        Self {
            pod_id: Some(pod_id.to_string()),
            ..Self::scoped(KillSwitchScope::Pod, triggered_by, reason)
        }
    }

    pub fn session(session_id: &str, triggered_by: &str, reason: TriggerReason) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            ..Self::scoped(KillSwitchScope::Session, triggered_by, reason)
        }
    }

    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }

    /// The discriminator for the scope, treating blank values as absent
    pub fn discriminator(&self) -> Option<&str> {
        let value = match self.scope {
            KillSwitchScope::Tenant => self.tenant_id.as_deref(),
            KillSwitchScope::User => self.user_id.as_deref(),
            KillSwitchScope::Pod => self.pod_id.as_deref(),
            KillSwitchScope::Session => self.session_id.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    pub(crate) fn event_data(&self, initiated_at: DateTime<Utc>) -> CreateKillSwitchEventData {
        let id = self.discriminator().map(str::to_string);
        let only = |scope: KillSwitchScope| if self.scope == scope { id.clone() } else { None };

        CreateKillSwitchEventData {
            scope: self.scope,
            tenant_id: only(KillSwitchScope::Tenant),
            user_id: only(KillSwitchScope::User),
            pod_id: only(KillSwitchScope::Pod),
            session_id: only(KillSwitchScope::Session),
            triggered_by: self.triggered_by.clone(),
            trigger_reason: self.reason,
            trigger_details: self.details.clone(),
            initiated_at,
        }
    }
}

/// Summary returned to the caller of `execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchResult {
    pub event_id: Uuid,
    pub status: EventStatus,
    pub execution_time_ms: i64,
    pub sessions_terminated: u32,
    pub tokens_revoked: u32,
    pub cache_purged: bool,
    pub sla_breached: bool,
    pub errors: Vec<EventErrorEntry>,
}

/// Kill switch service. Every collaborator is injected at construction.
#[derive(Clone)]
pub struct KillSwitchService {
    store: Arc<dyn KillSwitchStore>,
    cache: Arc<dyn CacheStore>,
    workspaces: Arc<dyn WorkspaceProvider>,
    transport: Arc<dyn SessionTransport>,
    edge_cache: Arc<dyn EdgeCacheInvalidator>,
    execution_target_ms: i64,
}

impl KillSwitchService {
    pub fn new(
        store: Arc<dyn KillSwitchStore>,
        cache: Arc<dyn CacheStore>,
        workspaces: Arc<dyn WorkspaceProvider>,
        transport: Arc<dyn SessionTransport>,
        edge_cache: Arc<dyn EdgeCacheInvalidator>,
    ) -> Self {
        Self {
            store,
            cache,
            workspaces,
            transport,
            edge_cache,
            execution_target_ms: MAX_EXECUTION_TIME_MS,
        }
    }

    /// Overrides the execution time above which a run is flagged as a breach
    pub fn with_execution_target_ms(mut self, target_ms: i64) -> Self {
        self.execution_target_ms = target_ms;
        self
    }

    pub fn store(&self) -> &Arc<dyn KillSwitchStore> {
        &self.store
    }
}
