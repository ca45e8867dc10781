//! Relay client over HTTP

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use tutorcall_core::SessionId;
use tutorcall_media_sdk::{Signal, SignalBatch};

use super::{SignalingError, SignalingTransport};

/// Talks to `/api/session/{id}/signal`
#[derive(Debug, Clone)]
pub struct HttpSignalingClient {
    client: Client,
    base_url: String,
}

impl HttpSignalingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SignalingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn signal_url(&self, session_id: &SessionId) -> String {
        format!("{}/api/session/{}/signal", self.base_url, session_id)
    }
}

#[async_trait]
impl SignalingTransport for HttpSignalingClient {
    async fn send(&self, signal: &Signal) -> Result<(), SignalingError> {
        let response = self.client
            .post(self.signal_url(&signal.session_id))
            .json(signal)
            .send()
            .await?;

        if response.status().is_success() {
            debug!(session_id = %signal.session_id, kind = signal.kind(), "Signal posted");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(SignalingError::Api { status, body })
        }
    }

    async fn fetch(&self, session_id: &SessionId, since: i64) -> Result<Vec<Signal>, SignalingError> {
        let response = self.client
            .get(self.signal_url(session_id))
            .query(&[("since", since)])
            .send()
            .await?;

        if response.status().is_success() {
            let batch: SignalBatch = response.json().await?;
            Ok(batch.signals)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(SignalingError::Api { status, body })
        }
    }
}
