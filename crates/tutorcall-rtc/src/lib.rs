//! TutorCall RTC
//!
//! Negotiates the peer-to-peer audio/video channel of a tutoring call:
//! - Local camera/microphone acquisition and track toggles
//! - SDP offer/answer and trickled ICE over a polled HTTP signaling relay
//! - Screen share with automatic fallback to the camera
//! - Deterministic teardown of tracks, peer connection and background tasks
//!
//! The browser-native media stack is reached through the traits in [`media`]
//! and [`peer`]; [`loopback`] is an in-process implementation of them.

pub mod call;
pub mod config;
pub mod error;
pub mod ice_buffer;
pub mod loopback;
pub mod media;
pub mod metrics;
pub mod negotiator;
pub mod peer;
pub mod session_store;
pub mod signaling;

pub use call::TutoringCall;
pub use config::NegotiatorConfig;
pub use error::{NegotiatorError, Result};
pub use ice_buffer::PendingIceBuffer;
pub use media::{MediaDevices, MediaError, MediaStream, MediaStreamTrack, TrackState};
pub use metrics::NegotiatorMetrics;
pub use negotiator::{MediaState, NegotiationRole, SessionNegotiator};
pub use peer::{PeerConnection, PeerConnectionFactory, PeerError, PeerEvent, RtpSender};
pub use session_store::{SessionStore, SessionStoreClient, SessionStoreError};
pub use signaling::{
    HttpSignalingClient, MemoryRelay, SignalHandler, SignalPoller, SignalingError, SignalingTransport,
};
