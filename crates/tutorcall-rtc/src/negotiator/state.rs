use std::fmt;

use tutorcall_media_sdk::{ConnectionState, ParticipantRole};

use crate::media::MediaStream;

/// Snapshot of a call as seen by the UI.
///
/// Only the negotiator writes it; callers observe it through
/// [`SessionNegotiator::subscribe`](super::SessionNegotiator::subscribe).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaState {
    pub local_stream: Option<MediaStream>,
    pub remote_stream: Option<MediaStream>,
    pub is_video_enabled: bool,
    pub is_audio_enabled: bool,
    pub is_screen_sharing: bool,
    pub connection_state: ConnectionState,
    pub is_connected: bool,
}

impl MediaState {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn set_connection(&mut self, state: ConnectionState) {
        self.connection_state = state;
        self.is_connected = state.is_connected();
    }
}

/// Which side of the offer/answer exchange a negotiator plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Offerer,
    Answerer,
}

impl NegotiationRole {
    /// The tutor opens the call, the student answers
    pub fn for_participant(role: ParticipantRole) -> Self {
        match role {
            ParticipantRole::Tutor => Self::Offerer,
            ParticipantRole::Student => Self::Answerer,
        }
    }

    pub fn is_offerer(&self) -> bool {
        matches!(self, Self::Offerer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offerer => "offerer",
            Self::Answerer => "answerer",
        }
    }
}

impl fmt::Display for NegotiationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tutor_offers_student_answers() {
        assert_eq!(NegotiationRole::for_participant(ParticipantRole::Tutor), NegotiationRole::Offerer);
        assert_eq!(NegotiationRole::for_participant(ParticipantRole::Student), NegotiationRole::Answerer);
        assert!(!NegotiationRole::Answerer.is_offerer());
    }

    #[test]
    fn test_default_state_is_idle() {
        let mut state = MediaState::default();
        assert!(state.is_idle());
        assert_eq!(state.connection_state, ConnectionState::New);

        state.set_connection(ConnectionState::Connected);
        assert!(state.is_connected);
        state.set_connection(ConnectionState::Failed);
        assert!(!state.is_connected);
        assert!(!state.is_idle());
    }
}
