use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(thiserror::Error, Debug)]
pub enum WorkspaceProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Workspace API error: {status} - {message}")]
    ApiError { status: StatusCode, message: String },

    #[error("Workspace not found: {0}")]
    NotFound(String),

    #[error("Workspace provider not configured")]
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    pub workspace_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSize {
    pub cpu: u32,
    pub memory_mb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Remote-workspace provisioning backend. The kill switch only uses
/// `terminate_workspace`, and only as a best-effort step.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn terminate_workspace(&self, workspace_id: &str) -> Result<(), WorkspaceProviderError>;

    async fn pause_workspace(&self, workspace_id: &str) -> Result<(), WorkspaceProviderError>;

    async fn resume_workspace(&self, workspace_id: &str) -> Result<(), WorkspaceProviderError>;

    async fn get_workspace_status(
        &self,
        workspace_id: &str,
    ) -> Result<WorkspaceStatus, WorkspaceProviderError>;

    async fn resize_workspace(
        &self,
        workspace_id: &str,
        size: WorkspaceSize,
    ) -> Result<(), WorkspaceProviderError>;

    async fn get_connection_token(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<ConnectionToken, WorkspaceProviderError>;
}

pub struct HttpWorkspaceProvider {
    client: Client,
    base_url: String,
    api_token: Secret<String>,
}

impl HttpWorkspaceProvider {
    pub fn new(base_url: &str, api_token: Secret<String>) -> Result<Self, WorkspaceProviderError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn url(&self, workspace_id: &str, suffix: &str) -> String {
        format!("{}/workspaces/{}{}", self.base_url, workspace_id, suffix)
    }

    async fn post_empty(
        &self,
        workspace_id: &str,
        suffix: &str,
    ) -> Result<Response, WorkspaceProviderError> {
        let response = self
            .client
            .post(self.url(workspace_id, suffix))
            .bearer_auth(self.api_token.expose_secret())
            .send()
            .await?;

        check_response(workspace_id, response).await
    }
}

/// Maps non-success statuses to errors, keeping the body for diagnostics
async fn check_response(
    workspace_id: &str,
    response: Response,
) -> Result<Response, WorkspaceProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(WorkspaceProviderError::NotFound(workspace_id.to_string()));
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(WorkspaceProviderError::ApiError { status, message })
}

#[async_trait]
impl WorkspaceProvider for HttpWorkspaceProvider {
    #[tracing::instrument(skip(self))]
    async fn terminate_workspace(&self, workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        let response = self
            .client
            .delete(self.url(workspace_id, ""))
            .bearer_auth(self.api_token.expose_secret())
            .send()
            .await?;

        match check_response(workspace_id, response).await {
            Ok(_) => {
                tracing::info!(workspace_id = %workspace_id, "Workspace terminated");
                Ok(())
            }
            // Already gone is as good as terminated
            Err(WorkspaceProviderError::NotFound(_)) => {
                tracing::debug!(workspace_id = %workspace_id, "Workspace already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn pause_workspace(&self, workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        self.post_empty(workspace_id, "/pause").await?;
        Ok(())
    }

    async fn resume_workspace(&self, workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        self.post_empty(workspace_id, "/resume").await?;
        Ok(())
    }

    async fn get_workspace_status(
        &self,
        workspace_id: &str,
    ) -> Result<WorkspaceStatus, WorkspaceProviderError> {
        let response = self
            .client
            .get(self.url(workspace_id, "/status"))
            .bearer_auth(self.api_token.expose_secret())
            .send()
            .await?;

        let status = check_response(workspace_id, response).await?.json().await?;
        Ok(status)
    }

    async fn resize_workspace(
        &self,
        workspace_id: &str,
        size: WorkspaceSize,
    ) -> Result<(), WorkspaceProviderError> {
        let response = self
            .client
            .post(self.url(workspace_id, "/resize"))
            .bearer_auth(self.api_token.expose_secret())
            .json(&size)
            .send()
            .await?;

        check_response(workspace_id, response).await?;
        Ok(())
    }

    async fn get_connection_token(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<ConnectionToken, WorkspaceProviderError> {
        let response = self
            .client
            .post(self.url(workspace_id, "/connection-token"))
            .bearer_auth(self.api_token.expose_secret())
            .json(&serde_json::json!({ "userId": user_id }))
            .send()
            .await?;

        let token = check_response(workspace_id, response).await?.json().await?;
        Ok(token)
    }
}

/// Stand-in used when no workspace API is configured
pub struct DisabledWorkspaceProvider;

#[async_trait]
impl WorkspaceProvider for DisabledWorkspaceProvider {
    async fn terminate_workspace(&self, _workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        Err(WorkspaceProviderError::NotConfigured)
    }

    async fn pause_workspace(&self, _workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        Err(WorkspaceProviderError::NotConfigured)
    }

    async fn resume_workspace(&self, _workspace_id: &str) -> Result<(), WorkspaceProviderError> {
        Err(WorkspaceProviderError::NotConfigured)
    }

    async fn get_workspace_status(
        &self,
        _workspace_id: &str,
    ) -> Result<WorkspaceStatus, WorkspaceProviderError> {
        Err(WorkspaceProviderError::NotConfigured)
    }

    async fn resize_workspace(
        &self,
        _workspace_id: &str,
        _size: WorkspaceSize,
    ) -> Result<(), WorkspaceProviderError> {
        Err(WorkspaceProviderError::NotConfigured)
    }

    async fn get_connection_token(
        &self,
        _workspace_id: &str,
        _user_id: &str,
    ) -> Result<ConnectionToken, WorkspaceProviderError> {
        Err(WorkspaceProviderError::NotConfigured)
    }
}
