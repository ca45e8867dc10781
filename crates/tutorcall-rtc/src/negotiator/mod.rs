//! Session negotiator
//!
//! Owns the local media, the single peer connection and the signal poller
//! of one tutoring call. Every mutating operation, including inbound signal
//! handling, runs under one async mutex so overlapping invocations never
//! interleave.

mod media_ops;
mod state;

use std::sync::{Arc, Weak};
use std::time::Instant;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tutorcall_core::{PeerId, SessionId};
use tutorcall_media_sdk::{IceCandidate, MediaConstraints, SessionDescription, Signal, SignalPayload, TrackKind};

use crate::config::NegotiatorConfig;
use crate::error::{NegotiatorError, Result};
use crate::ice_buffer::PendingIceBuffer;
use crate::media::{MediaDevices, MediaStream, MediaStreamTrack};
use crate::metrics::NegotiatorMetrics;
use crate::peer::{PeerConnection, PeerConnectionFactory, PeerError, PeerEvent};
use crate::signaling::{PollerSettings, SignalHandler, SignalPoller, SignalingTransport};

pub use state::{MediaState, NegotiationRole};

/// Handle to one call's negotiation.
///
/// Must be created inside a tokio runtime. Dropping the handle cancels
/// the poller, stops every local track and closes the peer connection.
pub struct SessionNegotiator {
    inner: Arc<Inner>,
    poller: SignalPoller,
}

impl SessionNegotiator {
    pub fn new(
        session_id: SessionId,
        role: NegotiationRole,
        config: NegotiatorConfig,
        devices: Arc<dyn MediaDevices>,
        factory: Arc<dyn PeerConnectionFactory>,
        transport: Arc<dyn SignalingTransport>,
    ) -> Self {
        let (state, _) = watch::channel(MediaState::default());
        let metrics = NegotiatorMetrics::new();
        let settings = PollerSettings {
            interval: config.poll_interval,
            max_attempts: config.max_signal_attempts,
            initial_watermark: config.initial_watermark,
        };

        let inner = Arc::new_cyclic(|me| Inner {
            me: me.clone(),
            session_id: session_id.clone(),
            peer_id: PeerId::generate(),
            role,
            config,
            devices,
            factory,
            transport: transport.clone(),
            call: Mutex::new(CallSlot::default()),
            state,
            metrics: metrics.clone(),
        });

        let handler: Weak<dyn SignalHandler> = Arc::downgrade(&inner) as Weak<dyn SignalHandler>;
        let poller = SignalPoller::spawn(
            session_id,
            inner.peer_id.clone(),
            transport,
            handler,
            settings,
            metrics,
        );

        info!(
            session_id = %inner.session_id,
            peer_id = %inner.peer_id,
            role = %role,
            "Session negotiator created"
        );

        Self { inner, poller }
    }

    /// Acquires camera and microphone and builds a fresh peer connection.
    ///
    /// Tears down any previous connection first. On media failure the state
    /// is left without a local stream and the error is returned.
    pub async fn start_call(&self) -> Result<()> {
        self.inner.start_call().await
    }

    /// Flips the camera track, acquiring one if the stream has none.
    /// Returns whether video is now enabled.
    pub async fn toggle_video(&self) -> bool {
        self.inner.toggle_track(TrackKind::Video).await
    }

    /// Flips the microphone track, acquiring one if the stream has none.
    /// Returns whether audio is now enabled.
    pub async fn toggle_audio(&self) -> bool {
        self.inner.toggle_track(TrackKind::Audio).await
    }

    /// Starts or stops screen sharing; returns whether sharing is now active
    pub async fn toggle_screen_share(&self) -> bool {
        self.inner.toggle_screen_share().await
    }

    /// Stops all local media and closes the connection. Safe to call twice.
    pub async fn end_call(&self) {
        self.inner.end_call().await
    }

    /// Ends the call and stops polling for signals
    pub async fn shutdown(&self) {
        self.poller.stop();
        self.inner.end_call().await;
    }

    pub fn state(&self) -> MediaState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MediaState> {
        self.inner.state.subscribe()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Sender id stamped on every outgoing signal
    pub fn peer_id(&self) -> &PeerId {
        &self.inner.peer_id
    }

    pub fn role(&self) -> NegotiationRole {
        self.inner.role
    }

    pub fn metrics(&self) -> &NegotiatorMetrics {
        &self.inner.metrics
    }

    /// Timestamp of the newest signal processed so far
    pub fn watermark(&self) -> i64 {
        self.poller.watermark()
    }

    pub async fn is_active(&self) -> bool {
        self.inner.call.lock().await.active
    }

    /// Remote candidates waiting for a remote description
    pub async fn pending_candidates(&self) -> usize {
        self.inner.call.lock().await.pending_ice.len()
    }
}

impl Drop for SessionNegotiator {
    fn drop(&mut self) {
        self.poller.stop();

        match self.inner.call.try_lock() {
            Ok(mut slot) => {
                let was_active = slot.active;
                let peer = slot.release();
                self.inner.reset_state();
                if let Some(peer) = peer {
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move { peer.close().await });
                    }
                }
                if was_active {
                    info!(session_id = %self.inner.session_id, "Negotiator dropped, call released");
                }
            }
            Err(_) => {
                // An operation is in flight; queue the teardown behind it
                if let Ok(handle) = Handle::try_current() {
                    let inner = self.inner.clone();
                    handle.spawn(async move { inner.end_call().await });
                } else {
                    warn!(session_id = %self.inner.session_id, "Negotiator dropped outside a runtime while busy");
                }
            }
        }
    }
}

#[derive(Default)]
struct CallTasks {
    events: Option<JoinHandle<()>>,
    offer: Option<JoinHandle<()>>,
    screen: Option<JoinHandle<()>>,
}

impl CallTasks {
    fn abort_all(&mut self) {
        for task in [self.events.take(), self.offer.take(), self.screen.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

/// Everything owned by the current call
#[derive(Default)]
struct CallSlot {
    /// Bumped whenever the peer connection is replaced or released;
    /// background tasks of an older generation become no-ops
    generation: u64,
    active: bool,
    peer: Option<Arc<dyn PeerConnection>>,
    local_stream: Option<MediaStream>,
    remote_stream: Option<MediaStream>,
    screen_track: Option<MediaStreamTrack>,
    pending_ice: PendingIceBuffer,
    /// Offer received before the call started; latest wins
    pending_offer: Option<String>,
    awaiting_answer: bool,
    offer_sent_at: Option<Instant>,
    tasks: CallTasks,
}

impl CallSlot {
    /// Synchronous half of teardown. Returns the peer so the caller can close it.
    fn release(&mut self) -> Option<Arc<dyn PeerConnection>> {
        self.tasks.abort_all();
        if let Some(track) = self.screen_track.take() {
            track.stop();
        }
        if let Some(stream) = self.local_stream.take() {
            stream.stop_all();
        }
        self.remote_stream = None;
        self.pending_ice.clear();
        self.pending_offer = None;
        self.awaiting_answer = false;
        self.offer_sent_at = None;
        self.active = false;
        self.generation += 1;
        self.peer.take()
    }
}

struct Inner {
    me: Weak<Inner>,
    session_id: SessionId,
    peer_id: PeerId,
    role: NegotiationRole,
    config: NegotiatorConfig,
    devices: Arc<dyn MediaDevices>,
    factory: Arc<dyn PeerConnectionFactory>,
    transport: Arc<dyn SignalingTransport>,
    call: Mutex<CallSlot>,
    state: watch::Sender<MediaState>,
    metrics: NegotiatorMetrics,
}

impl Inner {
    async fn start_call(&self) -> Result<()> {
        let mut slot = self.call.lock().await;
        // The remote side still holds the old connection and only an offer
        // from us moves it onto the new one
        let renegotiate = slot.active
            && slot
                .peer
                .as_ref()
                .is_some_and(|peer| peer.remote_description().is_some());
        if slot.active {
            info!(session_id = %self.session_id, "Restarting call, tearing down previous connection");
            self.teardown(&mut slot).await;
        }

        let stream = match self.devices.get_user_media(MediaConstraints::audio_video()).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "Failed to acquire camera/microphone");
                return Err(e.into());
            }
        };

        let peer = match self.build_peer(&stream).await {
            Ok(peer) => peer,
            Err(e) => {
                stream.stop_all();
                error!(session_id = %self.session_id, error = %e, "Failed to create peer connection");
                return Err(e);
            }
        };

        slot.generation += 1;
        slot.active = true;
        slot.peer = Some(peer.clone());
        slot.local_stream = Some(stream.clone());
        slot.tasks.events = self.spawn_event_pump(&peer, slot.generation);

        let video = stream.live_track(TrackKind::Video).is_some();
        let audio = stream.live_track(TrackKind::Audio).is_some();
        let connection = peer.connection_state();
        self.state.send_modify(|s| {
            s.local_stream = Some(stream);
            s.remote_stream = None;
            s.is_video_enabled = video;
            s.is_audio_enabled = audio;
            s.is_screen_sharing = false;
            s.set_connection(connection);
        });
        info!(session_id = %self.session_id, role = %self.role, "Call started, local media ready");

        if let Some(offer) = slot.pending_offer.take() {
            debug!(session_id = %self.session_id, "Answering offer received before start");
            match self.accept_offer(&mut slot, offer).await {
                Ok(answer) => {
                    drop(slot);
                    self.send_signal(answer.into()).await;
                }
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "Failed to answer early offer");
                }
            }
        } else if self.role.is_offerer() || renegotiate {
            if renegotiate {
                debug!(session_id = %self.session_id, role = %self.role, "Previous call was negotiated, offering again");
            }
            slot.tasks.offer = Some(self.spawn_offer_timer(slot.generation));
        }

        Ok(())
    }

    async fn end_call(&self) {
        let mut slot = self.call.lock().await;
        let was_active = slot.active;
        self.teardown(&mut slot).await;
        if was_active {
            info!(session_id = %self.session_id, "Call ended");
        } else {
            debug!(session_id = %self.session_id, "end_call with no active call");
        }
    }

    async fn teardown(&self, slot: &mut CallSlot) {
        if let Some(peer) = slot.release() {
            peer.close().await;
        }
        self.reset_state();
    }

    fn reset_state(&self) {
        self.state.send_if_modified(|s| {
            if s.is_idle() {
                false
            } else {
                *s = MediaState::default();
                true
            }
        });
    }

    /// New connection carrying every track of `stream`
    async fn build_peer(&self, stream: &MediaStream) -> Result<Arc<dyn PeerConnection>> {
        let peer = self.factory.create(&self.config.rtc_configuration()).await?;
        for track in stream.tracks() {
            if let Err(e) = peer.add_track(track, stream).await {
                peer.close().await;
                return Err(e.into());
            }
        }
        Ok(peer)
    }

    /// Replaces the connection when the remote side restarts negotiation
    async fn rebuild_peer(&self, slot: &mut CallSlot) -> Result<Arc<dyn PeerConnection>> {
        info!(session_id = %self.session_id, "Renegotiating from scratch, rebuilding peer connection");
        for task in [slot.tasks.events.take(), slot.tasks.offer.take()].into_iter().flatten() {
            task.abort();
        }
        if let Some(old) = slot.peer.take() {
            old.close().await;
        }
        slot.generation += 1;
        slot.awaiting_answer = false;
        slot.offer_sent_at = None;
        slot.remote_stream = None;

        let stream = slot
            .local_stream
            .clone()
            .ok_or_else(|| PeerError::InvalidState("no local stream".to_string()))?;
        let peer = self.build_peer(&stream).await?;
        slot.tasks.events = self.spawn_event_pump(&peer, slot.generation);
        slot.peer = Some(peer.clone());

        let connection = peer.connection_state();
        self.state.send_modify(|s| {
            s.remote_stream = None;
            s.set_connection(connection);
        });
        Ok(peer)
    }

    /// Applies a remote offer to the current peer and returns the local answer
    async fn accept_offer(&self, slot: &mut CallSlot, sdp: String) -> Result<SessionDescription> {
        let peer = slot.peer.clone().ok_or(PeerError::Closed)?;
        peer.set_remote_description(SessionDescription::offer(sdp)).await?;
        self.flush_candidates(slot, peer.as_ref()).await;

        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    async fn flush_candidates(&self, slot: &mut CallSlot, peer: &dyn PeerConnection) {
        let pending = slot.pending_ice.drain();
        if pending.is_empty() {
            return;
        }
        debug!(session_id = %self.session_id, count = pending.len(), "Flushing buffered ICE candidates");
        for candidate in pending {
            match peer.add_ice_candidate(candidate).await {
                Ok(()) => self.metrics.candidates_flushed.inc(),
                Err(e) => warn!(session_id = %self.session_id, error = %e, "Buffered ICE candidate rejected"),
            }
        }
    }

    async fn on_offer(&self, sdp: String) -> Result<()> {
        let mut slot = self.call.lock().await;
        if !slot.active {
            debug!(session_id = %self.session_id, "Offer received before start, holding it");
            slot.pending_offer = Some(sdp);
            return Ok(());
        }
        if self.role.is_offerer() && slot.awaiting_answer {
            warn!(session_id = %self.session_id, "Ignoring remote offer while our own offer is outstanding");
            return Ok(());
        }

        let negotiated = slot
            .peer
            .as_ref()
            .map_or(true, |peer| peer.remote_description().is_some());
        if negotiated {
            self.rebuild_peer(&mut slot).await?;
        }

        let answer = self.accept_offer(&mut slot, sdp).await?;
        drop(slot);
        self.send_signal(answer.into()).await;
        Ok(())
    }

    async fn on_answer(&self, sdp: String) -> Result<()> {
        let mut slot = self.call.lock().await;
        if !slot.awaiting_answer {
            warn!(session_id = %self.session_id, "Ignoring answer with no outstanding offer");
            return Ok(());
        }
        let peer = slot.peer.clone().ok_or(PeerError::Closed)?;
        peer.set_remote_description(SessionDescription::answer(sdp)).await?;
        slot.awaiting_answer = false;
        if let Some(sent_at) = slot.offer_sent_at.take() {
            self.metrics.negotiation_ms.record_duration(sent_at.elapsed());
        }
        self.flush_candidates(&mut slot, peer.as_ref()).await;
        debug!(session_id = %self.session_id, "Remote answer applied");
        Ok(())
    }

    async fn on_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut slot = self.call.lock().await;
        match slot.peer.clone() {
            Some(peer) if peer.remote_description().is_some() => {
                if let Err(e) = peer.add_ice_candidate(candidate).await {
                    warn!(session_id = %self.session_id, error = %e, "Remote ICE candidate rejected");
                }
            }
            _ => {
                slot.pending_ice.push(candidate);
                self.metrics.candidates_buffered.inc();
            }
        }
        Ok(())
    }

    async fn send_offer(&self, generation: u64) -> Result<()> {
        let mut slot = self.call.lock().await;
        if slot.generation != generation || slot.awaiting_answer {
            return Ok(());
        }
        let Some(peer) = slot.peer.clone() else {
            return Ok(());
        };
        if peer.remote_description().is_some() {
            debug!(session_id = %self.session_id, "Already negotiated, skipping offer");
            return Ok(());
        }

        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;
        slot.awaiting_answer = true;
        slot.offer_sent_at = Some(Instant::now());
        drop(slot);

        if self.send_signal(offer.into()).await {
            self.metrics.offers_sent.inc();
            info!(session_id = %self.session_id, "Offer sent");
        }
        Ok(())
    }

    /// Posts a signal once; failures are logged and counted, never retried
    async fn send_signal(&self, payload: SignalPayload) -> bool {
        let signal = Signal::new(self.session_id.clone(), self.peer_id.clone(), payload);
        match self.transport.send(&signal).await {
            Ok(()) => {
                self.metrics.signals_sent.inc();
                debug!(session_id = %self.session_id, kind = signal.kind(), "Signal sent");
                true
            }
            Err(e) => {
                self.metrics.signals_failed.inc();
                warn!(session_id = %self.session_id, kind = signal.kind(), error = %e, "Failed to send signal");
                false
            }
        }
    }

    fn spawn_offer_timer(&self, generation: u64) -> JoinHandle<()> {
        let me = self.me.clone();
        let delay = self.config.offer_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = me.upgrade() else { return };
            if let Err(e) = inner.send_offer(generation).await {
                warn!(session_id = %inner.session_id, error = %e, "Failed to create offer");
            }
        })
    }

    fn spawn_event_pump(&self, peer: &Arc<dyn PeerConnection>, generation: u64) -> Option<JoinHandle<()>> {
        let Some(mut events) = peer.take_events() else {
            warn!(session_id = %self.session_id, "Peer connection events already taken");
            return None;
        };
        let me = self.me.clone();
        Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = me.upgrade() else { break };
                inner.on_peer_event(generation, event).await;
            }
        }))
    }

    async fn on_peer_event(&self, generation: u64, event: PeerEvent) {
        let mut slot = self.call.lock().await;
        if slot.generation != generation {
            return;
        }
        match event {
            PeerEvent::IceCandidate(candidate) => {
                drop(slot);
                self.send_signal(SignalPayload::IceCandidate { candidate }).await;
            }
            PeerEvent::ConnectionStateChanged(state) => {
                info!(session_id = %self.session_id, state = %state, "Connection state changed");
                self.state.send_modify(|s| s.set_connection(state));
            }
            PeerEvent::RemoteTrack(track) => {
                debug!(session_id = %self.session_id, kind = %track.kind(), "Remote track received");
                let remote = slot.remote_stream.get_or_insert_with(MediaStream::empty).clone();
                remote.add_track(track);
                self.state.send_modify(|s| s.remote_stream = Some(remote));
            }
        }
    }
}

#[async_trait]
impl SignalHandler for Inner {
    async fn handle_signal(&self, signal: Signal) -> std::result::Result<(), NegotiatorError> {
        debug!(session_id = %self.session_id, kind = signal.kind(), timestamp = signal.timestamp, "Signal received");
        match signal.payload {
            SignalPayload::Offer { sdp } => self.on_offer(sdp).await,
            SignalPayload::Answer { sdp } => self.on_answer(sdp).await,
            SignalPayload::IceCandidate { candidate } => self.on_remote_candidate(candidate).await,
        }
    }
}
