//! Signals relayed between the two peers of a session

use serde::{Deserialize, Serialize};
use tutorcall_core::{PeerId, SessionId};

use crate::webrtc::{IceCandidate, SessionDescription};

/// Negotiation payload, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalPayload {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate { candidate: IceCandidate },
}

impl SignalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
        }
    }
}

impl From<SessionDescription> for SignalPayload {
    fn from(desc: SessionDescription) -> Self {
        match desc.sdp_type {
            crate::SdpType::Offer => Self::Offer { sdp: desc.sdp },
            crate::SdpType::Answer => Self::Answer { sdp: desc.sdp },
        }
    }
}

/// One relayed signal.
///
/// `timestamp` is assigned by the relay and doubles as the polling
/// watermark; whatever a sender puts there is overwritten on POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub session_id: SessionId,
    pub sender_id: PeerId,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: SignalPayload,
}

impl Signal {
    pub fn new(session_id: SessionId, sender_id: PeerId, payload: SignalPayload) -> Self {
        Self {
            session_id,
            sender_id,
            timestamp: 0,
            payload,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// Body of `GET /api/session/{id}/signal`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalBatch {
    pub signals: Vec<Signal>,
}
