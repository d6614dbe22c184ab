use std::collections::HashSet;

use super::{KillSwitchParams, KillSwitchService};
use crate::db::StoreError;
use crate::models::{kill_switch_event::KillSwitchScope, WorkspaceSession};

/// Concrete sessions and users affected by an invocation
#[derive(Debug, Clone, Default)]
pub struct ResolvedTargets {
    pub sessions: Vec<WorkspaceSession>,
    pub user_ids: Vec<String>,
    pub tenant_id: Option<String>,
}

impl ResolvedTargets {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.user_ids.is_empty()
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.iter().map(|s| s.id.as_str())
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.user_ids.iter().map(String::as_str)
    }
}

impl KillSwitchService {
    /// Read-only resolution of the scope into sessions and users. A missing
    /// discriminator yields empty targets rather than an error.
    pub async fn resolve_targets(
        &self,
        params: &KillSwitchParams,
    ) -> Result<ResolvedTargets, StoreError> {
        let Some(id) = params.discriminator() else {
            tracing::warn!(scope = %params.scope, "No target identifier for scope, nothing to resolve");
            return Ok(ResolvedTargets::default());
        };

        let targets = match params.scope {
            KillSwitchScope::Tenant => {
                let sessions = self.store.running_sessions_for_tenant(id).await?;
                ResolvedTargets {
                    user_ids: distinct_owners(&sessions),
                    sessions,
                    tenant_id: Some(id.to_string()),
                }
            }
            KillSwitchScope::User => {
                let sessions = self.store.running_sessions_for_user(id).await?;
                ResolvedTargets {
                    tenant_id: shared_tenant(&sessions),
                    sessions,
                    user_ids: vec![id.to_string()],
                }
            }
            KillSwitchScope::Pod => {
                // Pod membership lives in the session config blob, so this is
                // a scan over every running session.
                let sessions: Vec<WorkspaceSession> = self
                    .store
                    .running_sessions()
                    .await?
                    .into_iter()
                    .filter(|s| s.pod_id() == Some(id))
                    .collect();
                ResolvedTargets {
                    user_ids: distinct_owners(&sessions),
                    tenant_id: shared_tenant(&sessions),
                    sessions,
                }
            }
            KillSwitchScope::Session => match self.store.find_session(id).await? {
                Some(session) => ResolvedTargets {
                    user_ids: vec![session.user_id.clone()],
                    tenant_id: Some(session.tenant_id.clone()),
                    sessions: vec![session],
                },
                None => {
                    tracing::warn!(session_id = %id, "Session not found, nothing to resolve");
                    ResolvedTargets::default()
                }
            },
        };

        Ok(targets)
    }
}

/// Owners in first-seen order, without duplicates
fn distinct_owners(sessions: &[WorkspaceSession]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut owners = Vec::new();
    for session in sessions {
        if seen.insert(session.user_id.as_str()) {
            owners.push(session.user_id.clone());
        }
    }
    owners
}

/// The tenant when every session belongs to the same one
fn shared_tenant(sessions: &[WorkspaceSession]) -> Option<String> {
    let first = sessions.first()?;
    sessions
        .iter()
        .all(|s| s.tenant_id == first.tenant_id)
        .then(|| first.tenant_id.clone())
}
