//! Two negotiators over an in-memory relay with the loopback backend

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tutorcall_core::{PeerId, SessionId};
use tutorcall_media_sdk::{ConnectionState, IceCandidate, Signal, SignalPayload, TrackKind};
use tutorcall_rtc::loopback::{LoopbackMediaDevices, LoopbackPeerFactory};
use tutorcall_rtc::{
    MediaState, MemoryRelay, NegotiationRole, NegotiatorConfig, NegotiatorError, SessionNegotiator,
};

const SESSION: &str = "abc123";
const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> NegotiatorConfig {
    NegotiatorConfig {
        poll_interval: Duration::from_millis(20),
        offer_delay: Duration::from_millis(50),
        ..Default::default()
    }
}

struct Side {
    negotiator: SessionNegotiator,
    devices: Arc<LoopbackMediaDevices>,
    factory: Arc<LoopbackPeerFactory>,
}

fn side(relay: &Arc<MemoryRelay>, role: NegotiationRole) -> Side {
    let devices = Arc::new(LoopbackMediaDevices::new());
    let factory = Arc::new(LoopbackPeerFactory::new());
    let negotiator = SessionNegotiator::new(
        SessionId::new(SESSION),
        role,
        fast_config(),
        devices.clone(),
        factory.clone(),
        relay.clone(),
    );
    Side {
        negotiator,
        devices,
        factory,
    }
}

async fn wait_for(negotiator: &SessionNegotiator, predicate: impl Fn(&MediaState) -> bool) {
    let mut rx = negotiator.subscribe();
    timeout(WAIT, async move {
        rx.wait_for(|state| predicate(state)).await.map(|_| ())
    })
    .await
    .expect("timed out waiting for media state")
    .expect("negotiator dropped");
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

fn count_kind(relay: &MemoryRelay, kind: &str) -> usize {
    relay
        .signals(&SessionId::new(SESSION))
        .iter()
        .filter(|s| s.kind() == kind)
        .count()
}

fn remote_signal(payload: SignalPayload) -> Signal {
    Signal::new(SessionId::new(SESSION), PeerId("remote-peer".to_string()), payload)
}

const REMOTE_OFFER: &str = "v=0\r\no=- remote 0 IN IP4 127.0.0.1\r\ns=loopback\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n";

#[tokio::test]
async fn test_two_peers_connect_with_single_offer() {
    let relay = Arc::new(MemoryRelay::new());
    let tutor = side(&relay, NegotiationRole::Offerer);
    let student = side(&relay, NegotiationRole::Answerer);

    tutor.negotiator.start_call().await.unwrap();
    student.negotiator.start_call().await.unwrap();

    wait_for(&tutor.negotiator, |s| s.is_connected).await;
    wait_for(&student.negotiator, |s| s.is_connected).await;

    assert_eq!(count_kind(&relay, "offer"), 1);
    assert_eq!(count_kind(&relay, "answer"), 1);
    assert_eq!(tutor.negotiator.metrics().offers_sent.get(), 1);
    assert_eq!(student.negotiator.metrics().offers_sent.get(), 0);
    assert_eq!(tutor.factory.peers().len(), 1);
    assert_eq!(student.factory.peers().len(), 1);

    let remote = student.negotiator.state().remote_stream.unwrap();
    assert!(remote.has_track(TrackKind::Audio));
    assert!(remote.has_track(TrackKind::Video));
    assert_eq!(tutor.negotiator.metrics().negotiation_ms.count(), 1);
}

#[tokio::test]
async fn test_offer_before_start_is_answered_on_start() {
    let relay = Arc::new(MemoryRelay::new());
    let tutor = side(&relay, NegotiationRole::Offerer);
    let student = side(&relay, NegotiationRole::Answerer);

    tutor.negotiator.start_call().await.unwrap();
    wait_until(|| count_kind(&relay, "offer") == 1 && count_kind(&relay, "ice-candidate") == 1).await;
    let last = relay.signals(&SessionId::new(SESSION)).last().map(|s| s.timestamp).unwrap();
    wait_until(|| student.negotiator.watermark() >= last).await;

    assert!(!student.negotiator.is_active().await);
    assert_eq!(student.negotiator.pending_candidates().await, 1);
    assert!(student.negotiator.state().is_idle());

    student.negotiator.start_call().await.unwrap();
    wait_for(&student.negotiator, |s| s.is_connected).await;
    wait_for(&tutor.negotiator, |s| s.is_connected).await;

    assert_eq!(count_kind(&relay, "answer"), 1);
    assert_eq!(student.negotiator.pending_candidates().await, 0);
    let applied = student.factory.last_peer().unwrap().applied_candidates();
    assert!(!applied.is_empty());
}

#[tokio::test]
async fn test_buffered_candidates_flushed_in_receipt_order() {
    let relay = Arc::new(MemoryRelay::new());
    let student = side(&relay, NegotiationRole::Answerer);
    student.negotiator.start_call().await.unwrap();

    for ts in 1..=3 {
        let candidate = IceCandidate::new(format!("candidate:{} 1 udp 1 10.0.0.{} 5000 typ host", ts, ts));
        relay.inject(remote_signal(SignalPayload::IceCandidate { candidate }), ts);
    }
    wait_until(|| student.negotiator.watermark() >= 3).await;
    assert_eq!(student.negotiator.pending_candidates().await, 3);
    let peer = student.factory.last_peer().unwrap();
    assert!(peer.applied_candidates().is_empty());

    relay.inject(remote_signal(SignalPayload::Offer { sdp: REMOTE_OFFER.to_string() }), 4);
    wait_until(|| count_kind(&relay, "answer") == 1).await;

    let applied: Vec<String> = peer.applied_candidates().into_iter().map(|c| c.candidate).collect();
    assert_eq!(applied.len(), 3);
    assert!(applied[0].starts_with("candidate:1 "));
    assert!(applied[1].starts_with("candidate:2 "));
    assert!(applied[2].starts_with("candidate:3 "));
    assert_eq!(student.negotiator.metrics().candidates_buffered.get(), 3);
    assert_eq!(student.negotiator.metrics().candidates_flushed.get(), 3);
    assert_eq!(student.negotiator.pending_candidates().await, 0);
    wait_for(&student.negotiator, |s| s.connection_state == ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_stray_answer_ignored() {
    let relay = Arc::new(MemoryRelay::new());
    let student = side(&relay, NegotiationRole::Answerer);
    student.negotiator.start_call().await.unwrap();
    let before = student.negotiator.state();

    relay.inject(remote_signal(SignalPayload::Answer { sdp: REMOTE_OFFER.to_string() }), 1);
    wait_until(|| student.negotiator.watermark() >= 1).await;

    let peer = student.factory.last_peer().unwrap();
    assert!(peer.local_description().is_none());
    assert_eq!(student.negotiator.state(), before);
    assert_eq!(student.negotiator.metrics().signals_skipped.get(), 0);
}

#[tokio::test]
async fn test_own_echoed_signals_not_processed() {
    let relay = Arc::new(MemoryRelay::new());
    let tutor = side(&relay, NegotiationRole::Offerer);
    tutor.negotiator.start_call().await.unwrap();

    wait_until(|| count_kind(&relay, "offer") == 1).await;
    let last = relay.signals(&SessionId::new(SESSION)).last().map(|s| s.timestamp).unwrap();
    wait_until(|| tutor.negotiator.watermark() >= last).await;

    let peer = tutor.factory.last_peer().unwrap();
    assert!(peer.applied_candidates().is_empty());
    assert_eq!(tutor.negotiator.pending_candidates().await, 0);
    assert_eq!(tutor.negotiator.state().connection_state, ConnectionState::New);
}

#[tokio::test]
async fn test_media_denied_start_fails_cleanly() {
    let relay = Arc::new(MemoryRelay::new());
    let tutor = side(&relay, NegotiationRole::Offerer);
    tutor.devices.deny_camera(true);

    let result = tutor.negotiator.start_call().await;
    assert!(matches!(result, Err(NegotiatorError::MediaAcquisition(_))));
    assert!(tutor.negotiator.state().local_stream.is_none());
    assert!(tutor.factory.peers().is_empty());
    assert!(!tutor.negotiator.is_active().await);
}

#[tokio::test]
async fn test_failed_post_leaves_state_unchanged() {
    let relay = Arc::new(MemoryRelay::new());
    relay.set_offline(true);
    let tutor = side(&relay, NegotiationRole::Offerer);
    tutor.negotiator.start_call().await.unwrap();

    wait_until(|| tutor.negotiator.metrics().signals_failed.get() >= 1).await;
    let state = tutor.negotiator.state();
    assert!(state.local_stream.is_some());
    assert!(state.is_video_enabled);
    assert!(state.is_audio_enabled);
    assert!(tutor.negotiator.is_active().await);
    assert!(tutor.negotiator.metrics().poll_failures.get() >= 1);
    assert_eq!(tutor.negotiator.metrics().offers_sent.get(), 0);
}

#[tokio::test]
async fn test_restart_replaces_previous_connection() {
    let relay = Arc::new(MemoryRelay::new());
    let tutor = side(&relay, NegotiationRole::Offerer);
    tutor.negotiator.start_call().await.unwrap();
    tutor.negotiator.start_call().await.unwrap();

    let peers = tutor.factory.peers();
    assert_eq!(peers.len(), 2);
    assert!(peers[0].is_closed());
    assert!(!peers[1].is_closed());
    assert_eq!(tutor.devices.live_tracks(), 2);
}

#[tokio::test]
async fn test_remote_restart_rebuilds_answerer_peer() {
    let relay = Arc::new(MemoryRelay::new());
    let tutor = side(&relay, NegotiationRole::Offerer);
    let student = side(&relay, NegotiationRole::Answerer);
    tutor.negotiator.start_call().await.unwrap();
    student.negotiator.start_call().await.unwrap();
    wait_for(&student.negotiator, |s| s.is_connected).await;

    tutor.negotiator.start_call().await.unwrap();
    wait_until(|| count_kind(&relay, "answer") == 2).await;
    wait_for(&tutor.negotiator, |s| s.is_connected).await;
    wait_for(&student.negotiator, |s| s.is_connected).await;

    let peers = student.factory.peers();
    assert_eq!(peers.len(), 2);
    assert!(peers[0].is_closed());
}

#[tokio::test]
async fn test_answerer_restart_reconnects() {
    let relay = Arc::new(MemoryRelay::new());
    let tutor = side(&relay, NegotiationRole::Offerer);
    let student = side(&relay, NegotiationRole::Answerer);
    tutor.negotiator.start_call().await.unwrap();
    student.negotiator.start_call().await.unwrap();
    wait_for(&tutor.negotiator, |s| s.is_connected).await;
    wait_for(&student.negotiator, |s| s.is_connected).await;

    student.negotiator.start_call().await.unwrap();
    wait_until(|| count_kind(&relay, "answer") == 2).await;
    wait_for(&student.negotiator, |s| s.is_connected).await;
    wait_for(&tutor.negotiator, |s| s.is_connected).await;

    assert_eq!(count_kind(&relay, "offer"), 2);
    assert_eq!(student.negotiator.metrics().offers_sent.get(), 1);
    let tutor_peers = tutor.factory.peers();
    assert_eq!(tutor_peers.len(), 2);
    assert!(tutor_peers[0].is_closed());
    let student_peers = student.factory.peers();
    assert_eq!(student_peers.len(), 2);
    assert!(student_peers[0].is_closed());
    assert!(!student_peers[1].is_closed());
}

#[tokio::test]
async fn test_connection_failure_is_terminal() {
    let relay = Arc::new(MemoryRelay::new());
    let tutor = side(&relay, NegotiationRole::Offerer);
    let student = side(&relay, NegotiationRole::Answerer);
    tutor.negotiator.start_call().await.unwrap();
    student.negotiator.start_call().await.unwrap();
    wait_for(&tutor.negotiator, |s| s.is_connected).await;

    tutor.factory.last_peer().unwrap().fail_connection();
    wait_for(&tutor.negotiator, |s| s.connection_state == ConnectionState::Failed).await;
    assert!(!tutor.negotiator.state().is_connected);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(tutor.factory.peers().len(), 1);
    assert_eq!(tutor.negotiator.state().connection_state, ConnectionState::Failed);
}
