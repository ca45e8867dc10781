//! A tutoring call: session metadata plus its negotiator

use std::sync::Arc;

use tracing::{info, warn};
use tutorcall_core::SessionId;
use tutorcall_media_sdk::{SessionInfo, SessionUpdate};

use crate::config::NegotiatorConfig;
use crate::error::{NegotiatorError, Result};
use crate::media::MediaDevices;
use crate::negotiator::{NegotiationRole, SessionNegotiator};
use crate::peer::PeerConnectionFactory;
use crate::session_store::SessionStore;
use crate::signaling::SignalingTransport;

pub struct TutoringCall {
    info: SessionInfo,
    store: Arc<dyn SessionStore>,
    negotiator: SessionNegotiator,
}

impl TutoringCall {
    /// Looks up the session and builds a negotiator for the caller's role.
    ///
    /// Fails for callers outside the session and for sessions that are
    /// already completed or cancelled.
    pub async fn join(
        session_id: SessionId,
        store: Arc<dyn SessionStore>,
        config: NegotiatorConfig,
        devices: Arc<dyn MediaDevices>,
        factory: Arc<dyn PeerConnectionFactory>,
        transport: Arc<dyn SignalingTransport>,
    ) -> Result<Self> {
        let info = store.get_session(&session_id).await?;
        let role = info
            .role
            .ok_or_else(|| NegotiatorError::NotAParticipant(session_id.to_string()))?;
        if info.status.is_terminal() {
            return Err(NegotiatorError::SessionClosed(session_id.to_string()));
        }

        info!(
            session_id = %session_id,
            role = role.as_str(),
            topic = %info.topic,
            "Joining tutoring call"
        );
        let negotiator = SessionNegotiator::new(
            session_id,
            NegotiationRole::for_participant(role),
            config,
            devices,
            factory,
            transport,
        );

        Ok(Self {
            info,
            store,
            negotiator,
        })
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn negotiator(&self) -> &SessionNegotiator {
        &self.negotiator
    }

    pub async fn start(&self) -> Result<()> {
        self.negotiator.start_call().await
    }

    /// Tears the call down, then marks the session completed.
    ///
    /// Local teardown always happens; a failed update is returned afterwards.
    pub async fn finish(self, notes: Option<String>) -> Result<SessionInfo> {
        self.negotiator.shutdown().await;

        let session_id = self.negotiator.session_id().clone();
        match self
            .store
            .update_session(&session_id, &SessionUpdate::completed(notes))
            .await
        {
            Ok(updated) => {
                info!(session_id = %session_id, "Session marked completed");
                Ok(updated)
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to mark session completed");
                Err(e.into())
            }
        }
    }
}
