//! Relay API driven by the call clients over real HTTP

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use signal_relay::{create_router, AppState, RelayConfig};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tutorcall_core::{PeerId, SessionId, UserId};
use tutorcall_media_sdk::{IceCandidate, ParticipantRole, SessionStatus, SessionUpdate, Signal, SignalPayload};
use tutorcall_rtc::loopback::{LoopbackMediaDevices, LoopbackPeerFactory};
use tutorcall_rtc::{
    HttpSignalingClient, NegotiatorConfig, SessionStore, SessionStoreClient, SessionStoreError, SignalingError,
    SignalingTransport, TutoringCall,
};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_relay(max_signals_per_session: usize) -> (String, AppState) {
    let state = AppState::new(RelayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_signals_per_session,
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

async fn create_session(base: &str, id: &str) -> Value {
    let response = reqwest::Client::new()
        .post(format!("{}/api/session", base))
        .json(&json!({
            "id": id,
            "tutorId": "tutor-1",
            "studentId": "student-1",
            "tutorName": "Ada",
            "studentName": "Grace",
            "topic": "Quadratic equations",
            "startTime": "2026-10-18T15:00:00Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    response.json().await.unwrap()
}

fn store_for(base: &str, user: &str) -> SessionStoreClient {
    SessionStoreClient::new(base, TIMEOUT)
        .unwrap()
        .with_user(UserId::new(user))
}

fn candidate(session: &str, n: u32) -> Signal {
    Signal::new(
        SessionId::new(session),
        PeerId("peer-a".to_string()),
        SignalPayload::IceCandidate {
            candidate: IceCandidate::new(format!("candidate:{} 1 udp 1 10.0.0.1 5000 typ host", n)),
        },
    )
}

#[tokio::test]
async fn test_health_and_ready() {
    let (base, _) = spawn_relay(100).await;
    let health: Value = reqwest::get(format!("{}/health", base)).await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "signal-relay");

    let ready: Value = reqwest::get(format!("{}/ready", base)).await.unwrap().json().await.unwrap();
    assert_eq!(ready["ready"], true);
}

#[tokio::test]
async fn test_session_role_follows_caller() {
    let (base, _) = spawn_relay(100).await;
    let created = create_session(&base, "abc123").await;
    assert_eq!(created["status"], "scheduled");

    let id = SessionId::new("abc123");
    let tutor_view = store_for(&base, "tutor-1").get_session(&id).await.unwrap();
    assert_eq!(tutor_view.role, Some(ParticipantRole::Tutor));
    assert_eq!(tutor_view.topic, "Quadratic equations");

    let student_view = store_for(&base, "student-1").get_session(&id).await.unwrap();
    assert_eq!(student_view.role, Some(ParticipantRole::Student));

    let outsider = SessionStoreClient::new(&base, TIMEOUT).unwrap();
    assert_eq!(outsider.get_session(&id).await.unwrap().role, None);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let (base, _) = spawn_relay(100).await;
    let store = store_for(&base, "tutor-1");
    let missing = SessionId::new("missing");

    assert!(matches!(store.get_session(&missing).await, Err(SessionStoreError::NotFound(_))));
    let patch = store.update_session(&missing, &SessionUpdate::completed(None)).await;
    assert!(matches!(patch, Err(SessionStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_invalid_bodies_are_400() {
    let (base, _) = spawn_relay(100).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/session", base))
        .json(&json!({
            "tutorId": "tutor-1",
            "studentId": "student-1",
            "tutorName": "Ada",
            "studentName": "Grace",
            "topic": ""
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 400);

    let transport = HttpSignalingClient::new(&base, TIMEOUT).unwrap();
    let misaddressed = candidate("other", 1);
    let response = client
        .post(format!("{}/api/session/abc123/signal", base))
        .json(&misaddressed)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let empty_offer = Signal::new(
        SessionId::new("abc123"),
        PeerId("peer-a".to_string()),
        SignalPayload::Offer { sdp: String::new() },
    );
    let result = transport.send(&empty_offer).await;
    assert!(matches!(result, Err(SignalingError::Api { status: 400, .. })));

    let unknown_kind = client
        .post(format!("{}/api/session/abc123/signal", base))
        .json(&json!({
            "sessionId": "abc123",
            "senderId": "peer-a",
            "type": "bogus",
            "sdp": "v=0"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_kind.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = unknown_kind.json().await.unwrap();
    assert_eq!(body["code"], 400);
    assert!(body["error"].as_str().unwrap().starts_with("Malformed body"));

    let not_json = client
        .patch(format!("{}/api/session/abc123", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = not_json.json().await.unwrap();
    assert_eq!(body["code"], 400);

    let bad_since = client
        .get(format!("{}/api/session/abc123/signal?since=yesterday", base))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_since.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = bad_since.json().await.unwrap();
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_completed_session_cannot_reopen() {
    let (base, _) = spawn_relay(100).await;
    create_session(&base, "abc123").await;
    let store = store_for(&base, "tutor-1");
    let id = SessionId::new("abc123");

    let done = store
        .update_session(&id, &SessionUpdate::completed(Some("covered the discriminant".into())))
        .await
        .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert!(done.ended_at.is_some());

    let reopen = SessionUpdate {
        status: Some(SessionStatus::Active),
        ..Default::default()
    };
    let result = store.update_session(&id, &reopen).await;
    assert!(matches!(result, Err(SessionStoreError::Api { status: 409, .. })));

    let transport = HttpSignalingClient::new(&base, TIMEOUT).unwrap();
    let late = transport.send(&candidate("abc123", 1)).await;
    assert!(matches!(late, Err(SignalingError::Api { status: 409, .. })));
    assert!(transport.fetch(&id, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signals_partitioned_and_strictly_newer() {
    let (base, state) = spawn_relay(100).await;
    let transport = HttpSignalingClient::new(&base, TIMEOUT).unwrap();

    for n in 0..3 {
        assert_ok!(transport.send(&candidate("abc123", n)).await);
    }
    assert_ok!(transport.send(&candidate("other", 9)).await);

    let id = SessionId::new("abc123");
    let all = transport.fetch(&id, 0).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(all.iter().all(|s| s.session_id == id));

    let newer = transport.fetch(&id, all[1].timestamp).await.unwrap();
    assert_eq!(newer, vec![all[2].clone()]);
    assert!(transport.fetch(&id, all[2].timestamp).await.unwrap().is_empty());
    assert!(transport.fetch(&SessionId::new("nobody"), 0).await.unwrap().is_empty());

    assert_eq!(state.metrics.signals_stored.get(), 4);
}

#[tokio::test]
async fn test_signal_log_keeps_newest() {
    let (base, _) = spawn_relay(2).await;
    let transport = HttpSignalingClient::new(&base, TIMEOUT).unwrap();
    for n in 0..4 {
        transport.send(&candidate("abc123", n)).await.unwrap();
    }

    let kept = transport.fetch(&SessionId::new("abc123"), 0).await.unwrap();
    let names: Vec<String> = kept
        .into_iter()
        .filter_map(|s| match s.payload {
            SignalPayload::IceCandidate { candidate } => Some(candidate.candidate),
            _ => None,
        })
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("candidate:2 "));
    assert!(names[1].starts_with("candidate:3 "));
}

async fn join(base: &str, user: &str) -> TutoringCall {
    let config = NegotiatorConfig {
        signal_base_url: base.to_string(),
        poll_interval: Duration::from_millis(20),
        offer_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let transport = Arc::new(HttpSignalingClient::new(base, config.request_timeout).unwrap());
    TutoringCall::join(
        SessionId::new("abc123"),
        Arc::new(store_for(base, user)),
        config,
        Arc::new(LoopbackMediaDevices::new()),
        Arc::new(LoopbackPeerFactory::new()),
        transport,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_tutoring_call_end_to_end() {
    let (base, _) = spawn_relay(1000).await;
    create_session(&base, "abc123").await;

    let tutor = join(&base, "tutor-1").await;
    let student = join(&base, "student-1").await;
    assert!(tutor.negotiator().role().is_offerer());
    assert!(!student.negotiator().role().is_offerer());

    tutor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    student.start().await.unwrap();

    for call in [&tutor, &student] {
        let mut rx = call.negotiator().subscribe();
        timeout(TIMEOUT, rx.wait_for(|s| s.is_connected))
            .await
            .expect("call did not connect")
            .unwrap();
    }
    assert_eq!(tutor.negotiator().metrics().offers_sent.get(), 1);

    let finished = tutor.finish(Some("practice set 3".into())).await.unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(finished.notes.as_deref(), Some("practice set 3"));

    let seen_by_student = store_for(&base, "student-1")
        .get_session(&SessionId::new("abc123"))
        .await
        .unwrap();
    assert_eq!(seen_by_student.status, SessionStatus::Completed);
    student.negotiator().shutdown().await;
}
