//! Negotiator error types

use thiserror::Error;

use crate::media::MediaError;
use crate::peer::PeerError;
use crate::session_store::SessionStoreError;
use crate::signaling::SignalingError;

pub type Result<T> = std::result::Result<T, NegotiatorError>;

#[derive(Debug, Error)]
pub enum NegotiatorError {
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(#[from] MediaError),

    #[error("Peer connection error: {0}")]
    Peer(#[from] PeerError),

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Session store error: {0}")]
    SessionStore(#[from] SessionStoreError),

    #[error("Caller is not a participant of session {0}")]
    NotAParticipant(String),

    #[error("Session {0} is already closed")]
    SessionClosed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] tutorcall_core::TutorCallError),
}
