use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{keys, templates, KillSwitchError, KillSwitchService};
use crate::models::access_revocation::ReinstateData;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReinstateParams {
    pub user_id: String,
    pub reinstated_by: String,
    pub reason: String,
    /// Only scopes the confirmation notification
    pub tenant_id: Option<String>,
}

impl KillSwitchService {
    /// Lifts every active revocation for the user and clears the fast-path
    /// keys. Idempotent; once it returns the user is no longer blocked.
    pub async fn reinstate_access(&self, params: ReinstateParams) -> Result<(), KillSwitchError> {
        let lifted = self
            .store
            .reinstate_revocations(
                &params.user_id,
                &ReinstateData {
                    reinstated_by: params.reinstated_by.clone(),
                    reinstated_at: Utc::now(),
                    reason: params.reason.clone(),
                },
            )
            .await?;

        self.cache.delete(&keys::blocked(&params.user_id)).await?;
        self.cache.delete(&keys::revoked_flag(&params.user_id)).await?;

        if lifted == 0 {
            tracing::info!(user_id = %params.user_id, "No active revocations to lift");
            return Ok(());
        }

        tracing::info!(
            user_id = %params.user_id,
            reinstated_by = %params.reinstated_by,
            revocations = lifted,
            "Access reinstated"
        );

        let notice = templates::reinstatement_notice(
            &params.user_id,
            params.tenant_id.as_deref(),
            &params.reinstated_by,
        );
        if let Err(e) = self.store.create_notification(notice).await {
            tracing::warn!(
                user_id = %params.user_id,
                error = %e,
                "Reinstatement notification failed"
            );
        }

        Ok(())
    }
}
