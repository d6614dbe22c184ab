use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Realtime gateway error: {status} - {message}")]
    GatewayError { status: StatusCode, message: String },

    #[error("Session not connected: {0}")]
    NotConnected(String),

    #[error("Realtime gateway not configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    AccessRevoked,
}

/// Messages pushed over a session's live connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMessage {
    #[serde(rename_all = "camelCase")]
    SessionTerminated {
        reason: TerminationReason,
        message: String,
        reconnect_allowed: bool,
    },
}

impl SessionMessage {
    pub fn access_revoked() -> Self {
        SessionMessage::SessionTerminated {
            reason: TerminationReason::AccessRevoked,
            message: "Your session has been terminated because your access was revoked."
                .to_string(),
            reconnect_allowed: false,
        }
    }
}

#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn send_to_session(
        &self,
        session_id: &str,
        message: &SessionMessage,
    ) -> Result<(), TransportError>;
}

/// Pushes messages through the realtime gateway's HTTP API
pub struct HttpSessionTransport {
    client: Client,
    base_url: String,
    api_token: Secret<String>,
}

impl HttpSessionTransport {
    pub fn new(base_url: &str, api_token: Secret<String>) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }
}

#[async_trait]
impl SessionTransport for HttpSessionTransport {
    #[tracing::instrument(skip(self, message))]
    async fn send_to_session(
        &self,
        session_id: &str,
        message: &SessionMessage,
    ) -> Result<(), TransportError> {
        let url = format!("{}/sessions/{}/messages", self.base_url, session_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_token.expose_secret())
            .json(message)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(TransportError::NotConnected(session_id.to_string()))
            }
            status => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(TransportError::GatewayError { status, message })
            }
        }
    }
}

pub struct DisabledSessionTransport;

#[async_trait]
impl SessionTransport for DisabledSessionTransport {
    async fn send_to_session(
        &self,
        _session_id: &str,
        _message: &SessionMessage,
    ) -> Result<(), TransportError> {
        Err(TransportError::NotConfigured)
    }
}
