//! Peer connection seam (`RTCPeerConnection` and its senders)

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tutorcall_media_sdk::{ConnectionState, IceCandidate, RtcConfiguration, SessionDescription, TrackKind};

use crate::media::{MediaStream, MediaStreamTrack};

/// Events raised by a peer connection
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local candidate was gathered and must be trickled to the remote side
    IceCandidate(IceCandidate),
    ConnectionStateChanged(ConnectionState),
    /// The remote side started sending a track
    RemoteTrack(MediaStreamTrack),
}

/// Outgoing half of a transceiver
#[async_trait]
pub trait RtpSender: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn track(&self) -> Option<MediaStreamTrack>;

    /// Swaps the outgoing track in place; never renegotiates
    async fn replace_track(&self, track: Option<MediaStreamTrack>) -> Result<(), PeerError>;
}

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(
        &self,
        track: MediaStreamTrack,
        stream: &MediaStream,
    ) -> Result<Arc<dyn RtpSender>, PeerError>;

    fn senders(&self) -> Vec<Arc<dyn RtpSender>>;

    async fn create_offer(&self) -> Result<SessionDescription, PeerError>;

    async fn create_answer(&self) -> Result<SessionDescription, PeerError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), PeerError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), PeerError>;

    fn remote_description(&self) -> Option<SessionDescription>;

    /// Fails if no remote description has been set yet
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    fn connection_state(&self) -> ConnectionState;

    /// Event stream of this connection; `None` after the first call
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PeerEvent>>;

    async fn close(&self);
}

/// Builds peer connections for a configuration
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(&self, config: &RtcConfiguration) -> Result<Arc<dyn PeerConnection>, PeerError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PeerError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("Connection closed")]
    Closed,

    #[error("Media stack error: {0}")]
    Stack(String),
}

/// First sender carrying `kind`
pub fn sender_for(peer: &dyn PeerConnection, kind: TrackKind) -> Option<Arc<dyn RtpSender>> {
    peer.senders().into_iter().find(|s| s.kind() == kind)
}
