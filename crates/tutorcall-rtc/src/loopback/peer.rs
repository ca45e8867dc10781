use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use tutorcall_media_sdk::{
    ConnectionState, IceCandidate, RtcConfiguration, SdpType, SessionDescription, TrackKind,
};
use uuid::Uuid;

use crate::media::{MediaStream, MediaStreamTrack};
use crate::peer::{PeerConnection, PeerConnectionFactory, PeerError, PeerEvent, RtpSender};

/// Records every connection it builds so tests can inspect them
#[derive(Default)]
pub struct LoopbackPeerFactory {
    peers: Mutex<Vec<Arc<LoopbackPeerConnection>>>,
}

impl LoopbackPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peers(&self) -> Vec<Arc<LoopbackPeerConnection>> {
        self.peers.lock().clone()
    }

    pub fn last_peer(&self) -> Option<Arc<LoopbackPeerConnection>> {
        self.peers.lock().last().cloned()
    }
}

#[async_trait]
impl PeerConnectionFactory for LoopbackPeerFactory {
    async fn create(&self, config: &RtcConfiguration) -> Result<Arc<dyn PeerConnection>, PeerError> {
        let peer = Arc::new(LoopbackPeerConnection::new(config.clone()));
        self.peers.lock().push(peer.clone());
        Ok(peer)
    }
}

pub struct LoopbackSender {
    kind: TrackKind,
    track: Mutex<Option<MediaStreamTrack>>,
    replacements: AtomicUsize,
}

impl LoopbackSender {
    fn new(track: MediaStreamTrack) -> Self {
        Self {
            kind: track.kind(),
            track: Mutex::new(Some(track)),
            replacements: AtomicUsize::new(0),
        }
    }

    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RtpSender for LoopbackSender {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn track(&self) -> Option<MediaStreamTrack> {
        self.track.lock().clone()
    }

    async fn replace_track(&self, track: Option<MediaStreamTrack>) -> Result<(), PeerError> {
        if let Some(track) = &track {
            if track.kind() != self.kind {
                return Err(PeerError::InvalidState(format!(
                    "cannot send {} on a {} sender",
                    track.kind(),
                    self.kind
                )));
            }
        }
        *self.track.lock() = track;
        self.replacements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct PeerState {
    senders: Vec<Arc<LoopbackSender>>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    applied: Vec<IceCandidate>,
    connection: ConnectionState,
    offers_created: usize,
    gathered: usize,
    closed: bool,
}

/// Peer connection with textual SDP: one `m=` line per sender kind
pub struct LoopbackPeerConnection {
    id: String,
    config: RtcConfiguration,
    state: Mutex<PeerState>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<PeerEvent>>>,
}

impl LoopbackPeerConnection {
    pub fn new(config: RtcConfiguration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            config,
            state: Mutex::new(PeerState::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rtc_configuration(&self) -> &RtcConfiguration {
        &self.config
    }

    /// Remote candidates applied so far, in order
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().applied.clone()
    }

    pub fn offers_created(&self) -> usize {
        self.state.lock().offers_created
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn loopback_senders(&self) -> Vec<Arc<LoopbackSender>> {
        self.state.lock().senders.clone()
    }

    /// Track currently sent for `kind`
    pub fn sending(&self, kind: TrackKind) -> Option<MediaStreamTrack> {
        self.state
            .lock()
            .senders
            .iter()
            .find(|s| s.kind == kind)
            .and_then(|s| s.track())
    }

    /// Simulates a transport failure
    pub fn fail_connection(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            self.set_connection(&mut state, ConnectionState::Failed);
        }
    }

    fn render_sdp(&self, state: &PeerState) -> String {
        let mut sdp = format!("v=0\r\no=- {} 0 IN IP4 127.0.0.1\r\ns=loopback\r\nt=0 0\r\n", self.id);
        for sender in &state.senders {
            let payload = match sender.kind {
                TrackKind::Audio => 111,
                TrackKind::Video => 96,
            };
            sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF {}\r\n", sender.kind, payload));
        }
        sdp
    }

    fn emit(&self, event: PeerEvent) {
        // The receiver is gone once the owning negotiator released the call
        let _ = self.events_tx.send(event);
    }

    fn set_connection(&self, state: &mut PeerState, next: ConnectionState) {
        if state.connection != next {
            state.connection = next;
            self.emit(PeerEvent::ConnectionStateChanged(next));
        }
    }

    fn advance(&self, state: &mut PeerState) {
        if state.local.is_none() || state.remote.is_none() {
            return;
        }
        if state.connection == ConnectionState::New {
            self.set_connection(state, ConnectionState::Connecting);
        }
        if state.connection == ConnectionState::Connecting && !state.applied.is_empty() {
            self.set_connection(state, ConnectionState::Connected);
        }
    }

    fn check_open(state: &PeerState) -> Result<(), PeerError> {
        if state.closed {
            Err(PeerError::Closed)
        } else {
            Ok(())
        }
    }
}

fn media_kinds(sdp: &str) -> Vec<TrackKind> {
    sdp.lines()
        .filter_map(|line| line.strip_prefix("m="))
        .filter_map(|media| match media.split_whitespace().next() {
            Some("audio") => Some(TrackKind::Audio),
            Some("video") => Some(TrackKind::Video),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl PeerConnection for LoopbackPeerConnection {
    async fn add_track(
        &self,
        track: MediaStreamTrack,
        _stream: &MediaStream,
    ) -> Result<Arc<dyn RtpSender>, PeerError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        let sender = Arc::new(LoopbackSender::new(track));
        state.senders.push(sender.clone());
        Ok(sender)
    }

    fn senders(&self) -> Vec<Arc<dyn RtpSender>> {
        self.state
            .lock()
            .senders
            .iter()
            .map(|s| s.clone() as Arc<dyn RtpSender>)
            .collect()
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.offers_created += 1;
        Ok(SessionDescription::offer(self.render_sdp(&state)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        let state = self.state.lock();
        Self::check_open(&state)?;
        match &state.remote {
            Some(remote) if remote.sdp_type == SdpType::Offer => {
                Ok(SessionDescription::answer(self.render_sdp(&state)))
            }
            _ => Err(PeerError::InvalidState("no remote offer to answer".to_string())),
        }
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), PeerError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.local = Some(description);
        state.gathered += 1;

        let port = 50000 + state.gathered;
        let mut candidate = IceCandidate::new(format!(
            "candidate:{} 1 udp 2122260223 127.0.0.1 {} typ host",
            state.gathered, port
        ));
        candidate.sdp_mid = Some("0".to_string());
        candidate.sdp_m_line_index = Some(0);
        self.emit(PeerEvent::IceCandidate(candidate));

        self.advance(&mut state);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), PeerError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        if !description.sdp.starts_with("v=0") {
            return Err(PeerError::InvalidSdp("missing version line".to_string()));
        }

        for kind in media_kinds(&description.sdp) {
            let track = MediaStreamTrack::new(kind, format!("remote-{}", kind));
            self.emit(PeerEvent::RemoteTrack(track));
        }
        debug!(peer = %self.id, sdp_type = description.sdp_type.as_str(), "Remote description set");
        state.remote = Some(description);

        self.advance(&mut state);
        Ok(())
    }

    fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote.clone()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        if state.remote.is_none() {
            return Err(PeerError::InvalidState(
                "ICE candidate added before remote description".to_string(),
            ));
        }
        state.applied.push(candidate);
        self.advance(&mut state);
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PeerEvent>> {
        self.events_rx.lock().take()
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        self.set_connection(&mut state, ConnectionState::Closed);
    }
}
