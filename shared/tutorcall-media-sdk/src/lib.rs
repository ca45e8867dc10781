//! TutorCall Media SDK
//!
//! Wire and domain types shared by the call negotiator and the signaling relay.

pub mod media;
pub mod session;
pub mod signal;
pub mod webrtc;

pub use media::{MediaConstraints, TrackKind};
pub use session::{ParticipantRole, SessionInfo, SessionStatus, SessionUpdate};
pub use signal::{Signal, SignalBatch, SignalPayload};
pub use webrtc::{ConnectionState, IceCandidate, IceServer, RtcConfiguration, SdpType, SessionDescription};
