//! Session metadata client (`/api/session/{id}`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use tutorcall_core::{SessionId, UserId};
use tutorcall_media_sdk::{SessionInfo, SessionUpdate};

/// Read and update tutoring session metadata
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, session_id: &SessionId) -> Result<SessionInfo, SessionStoreError>;

    async fn update_session(
        &self,
        session_id: &SessionId,
        update: &SessionUpdate,
    ) -> Result<SessionInfo, SessionStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session store returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct SessionStoreClient {
    client: Client,
    base_url: String,
    user_id: Option<UserId>,
}

impl SessionStoreClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SessionStoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: None,
        })
    }

    /// Identifies the caller so the store can report its role
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    fn session_url(&self, session_id: &SessionId) -> String {
        format!("{}/api/session/{}", self.base_url, session_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.user_id {
            Some(user) => request.header("x-user-id", user.as_str()),
            None => request,
        }
    }

    async fn read_session(
        session_id: &SessionId,
        response: reqwest::Response,
    ) -> Result<SessionInfo, SessionStoreError> {
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(SessionStoreError::NotFound(session_id.to_string())),
            status => Err(SessionStoreError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl SessionStore for SessionStoreClient {
    async fn get_session(&self, session_id: &SessionId) -> Result<SessionInfo, SessionStoreError> {
        let response = self
            .authorize(self.client.get(self.session_url(session_id)))
            .send()
            .await?;
        Self::read_session(session_id, response).await
    }

    async fn update_session(
        &self,
        session_id: &SessionId,
        update: &SessionUpdate,
    ) -> Result<SessionInfo, SessionStoreError> {
        debug!(session_id = %session_id, status = ?update.status, "Updating session");
        let response = self
            .authorize(self.client.patch(self.session_url(session_id)))
            .json(update)
            .send()
            .await?;
        Self::read_session(session_id, response).await
    }
}
