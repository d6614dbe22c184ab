use serde_json::json;

use crate::models::{
    kill_switch_event::{KillSwitchEvent, TriggerReason},
    notification::CreateNotificationData,
};

pub const TYPE_ACCESS_REVOKED: &str = "ACCESS_REVOKED";
pub const TYPE_ACCESS_REINSTATED: &str = "ACCESS_REINSTATED";
pub const TYPE_ADMIN_ALERT: &str = "KILL_SWITCH_ADMIN_ALERT";

/// User-facing wording per trigger reason. Never includes internal detail.
fn revocation_message(reason: TriggerReason) -> &'static str {
    match reason {
        TriggerReason::SecurityIncident => {
            "Your workspace access has been suspended due to a security incident. \
             Please contact your administrator."
        }
        TriggerReason::ContractTermination => {
            "Your workspace access has ended because your contract was terminated."
        }
        TriggerReason::PolicyViolation => {
            "Your workspace access has been suspended due to a policy violation. \
             Please contact your administrator."
        }
        TriggerReason::SuspiciousActivity => {
            "Your workspace access has been suspended after suspicious activity was detected \
             on your account."
        }
        TriggerReason::DataExfiltrationAttempt => {
            "Your workspace access has been suspended pending a data protection review."
        }
        TriggerReason::ManualRevocation => {
            "Your workspace access has been revoked by an administrator."
        }
    }
}

pub fn user_revocation_notice(event: &KillSwitchEvent, user_id: &str) -> CreateNotificationData {
    CreateNotificationData {
        user_id: user_id.to_string(),
        tenant_id: event.tenant_id.clone(),
        notification_type: TYPE_ACCESS_REVOKED.to_string(),
        title: "Workspace access revoked".to_string(),
        message: revocation_message(event.trigger_reason).to_string(),
        metadata: Some(json!({
            "killSwitchEventId": event.id,
            "reason": event.trigger_reason,
        })),
    }
}

pub fn admin_alert(event: &KillSwitchEvent, tenant_id: &str, admin_id: &str) -> CreateNotificationData {
    CreateNotificationData {
        user_id: admin_id.to_string(),
        tenant_id: Some(tenant_id.to_string()),
        notification_type: TYPE_ADMIN_ALERT.to_string(),
        title: "Kill switch activated".to_string(),
        message: format!(
            "Kill switch {} was activated for {} scope by {} (reason: {}).",
            event.id, event.scope, event.triggered_by, event.trigger_reason
        ),
        metadata: Some(json!({
            "killSwitchEventId": event.id,
            "scope": event.scope,
            "reason": event.trigger_reason,
            "triggeredBy": event.triggered_by,
        })),
    }
}

pub fn reinstatement_notice(
    user_id: &str,
    tenant_id: Option<&str>,
    reinstated_by: &str,
) -> CreateNotificationData {
    CreateNotificationData {
        user_id: user_id.to_string(),
        tenant_id: tenant_id.map(str::to_string),
        notification_type: TYPE_ACCESS_REINSTATED.to_string(),
        title: "Workspace access restored".to_string(),
        message: "Your workspace access has been restored. You can sign in again.".to_string(),
        metadata: Some(json!({ "reinstatedBy": reinstated_by })),
    }
}
