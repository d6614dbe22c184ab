use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(thiserror::Error, Debug)]
pub enum EdgeCacheError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Edge cache API error: {status} - {message}")]
    ApiError { status: StatusCode, message: String },

    #[error("Edge cache invalidation not configured")]
    NotConfigured,
}

/// CDN edge-cache invalidation provider
#[async_trait]
pub trait EdgeCacheInvalidator: Send + Sync {
    async fn invalidate_tenant_cache(&self, tenant_id: &str) -> Result<(), EdgeCacheError>;

    async fn invalidate_session_cache(&self, session_id: &str) -> Result<(), EdgeCacheError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidationRequest {
    paths: Vec<String>,
    caller_reference: String,
}

pub struct HttpEdgeCacheClient {
    client: Client,
    base_url: String,
    api_token: Secret<String>,
}

impl HttpEdgeCacheClient {
    pub fn new(base_url: &str, api_token: Secret<String>) -> Result<Self, EdgeCacheError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    async fn invalidate(&self, paths: Vec<String>) -> Result<(), EdgeCacheError> {
        let request = InvalidationRequest {
            paths,
            caller_reference: uuid::Uuid::new_v4().to_string(),
        };

        let response = self
            .client
            .post(format!("{}/invalidations", self.base_url))
            .bearer_auth(self.api_token.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status = %status, error = %message, "Edge cache invalidation failed");
            return Err(EdgeCacheError::ApiError { status, message });
        }

        tracing::debug!(paths = ?request.paths, "Edge cache invalidation submitted");
        Ok(())
    }
}

#[async_trait]
impl EdgeCacheInvalidator for HttpEdgeCacheClient {
    async fn invalidate_tenant_cache(&self, tenant_id: &str) -> Result<(), EdgeCacheError> {
        self.invalidate(vec![format!("/tenants/{}/*", tenant_id)])
            .await
    }

    async fn invalidate_session_cache(&self, session_id: &str) -> Result<(), EdgeCacheError> {
        self.invalidate(vec![format!("/sessions/{}/*", session_id)])
            .await
    }
}

/// Stand-in when no CDN invalidation API is configured. Every call reports
/// `NotConfigured` so callers know nothing was invalidated.
pub struct DisabledEdgeCache;

#[async_trait]
impl EdgeCacheInvalidator for DisabledEdgeCache {
    async fn invalidate_tenant_cache(&self, _tenant_id: &str) -> Result<(), EdgeCacheError> {
        Err(EdgeCacheError::NotConfigured)
    }

    async fn invalidate_session_cache(&self, _session_id: &str) -> Result<(), EdgeCacheError> {
        Err(EdgeCacheError::NotConfigured)
    }
}
