//! Read-only queries over kill switch events, their actions and access
//! revocations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{KillSwitchError, KillSwitchService};
use crate::models::{
    kill_switch_event::EventFilter, AccessRevocation, KillSwitchAction, KillSwitchEvent,
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: KillSwitchEvent,
    pub actions: Vec<KillSwitchAction>,
}

/// 1-based page request, normalized on construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

impl KillSwitchService {
    pub async fn get_event(&self, id: Uuid) -> Result<Option<EventDetail>, KillSwitchError> {
        let Some(event) = self.store.find_event(id).await? else {
            return Ok(None);
        };
        let actions = self.store.list_actions(id).await?;

        Ok(Some(EventDetail { event, actions }))
    }

    /// Most recent first by initiation time
    pub async fn list_events(
        &self,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<Page<KillSwitchEvent>, KillSwitchError> {
        let limit = i64::from(pagination.limit);
        let (items, total) = tokio::try_join!(
            self.store.list_events(filter, limit, pagination.offset()),
            self.store.count_events(filter),
        )?;

        Ok(Page {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: (total + limit - 1) / limit,
        })
    }

    pub async fn get_revocation_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<AccessRevocation>, KillSwitchError> {
        Ok(self.store.revocation_history(user_id).await?)
    }
}
