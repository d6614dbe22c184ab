use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{keys, KillSwitchError, KillSwitchService};

/// Value stored under the fast-path block key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockCacheEntry {
    pub event_id: Uuid,
    pub blocked_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatus {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

impl BlockStatus {
    pub fn not_blocked() -> Self {
        Self {
            blocked: false,
            reason: None,
            blocked_at: None,
            event_id: None,
        }
    }
}

impl From<BlockCacheEntry> for BlockStatus {
    fn from(entry: BlockCacheEntry) -> Self {
        Self {
            blocked: true,
            reason: Some(entry.reason),
            blocked_at: Some(entry.blocked_at),
            event_id: Some(entry.event_id),
        }
    }
}

impl KillSwitchService {
    /// Hot-path access check for reconnection attempts.
    ///
    /// A parseable cache entry is trusted. Anything else, including a cache
    /// error, falls through to the durable revocation table.
    pub async fn is_access_blocked(&self, user_id: &str) -> Result<BlockStatus, KillSwitchError> {
        match self.cache.get(&keys::blocked(user_id)).await {
            Ok(Some(raw)) => match serde_json::from_str::<BlockCacheEntry>(&raw) {
                Ok(entry) => return Ok(entry.into()),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Unreadable block cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Block cache read failed");
            }
        }

        let status = match self
            .store
            .find_revocation_in_force(user_id, Utc::now())
            .await?
        {
            Some(revocation) => BlockStatus {
                blocked: true,
                reason: Some(revocation.reason),
                blocked_at: Some(revocation.created_at),
                event_id: revocation.kill_switch_event_id,
            },
            None => BlockStatus::not_blocked(),
        };

        Ok(status)
    }
}
