//! HTTP handlers for the signal relay API

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use tutorcall_core::{SessionId, UserId};
use tutorcall_media_sdk::{SessionInfo, SessionStatus, SessionUpdate, Signal, SignalBatch, SignalPayload};
use validator::Validate;

use crate::store::SessionRecord;
use crate::{AppState, Error, Result};

const USER_HEADER: &str = "x-user-id";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub sessions: u64,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 128))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub tutor_id: String,
    #[validate(length(min = 1, max = 128))]
    pub student_id: String,
    #[validate(length(min = 1, max = 200))]
    pub tutor_name: String,
    #[validate(length(min = 1, max = 200))]
    pub student_name: String,
    #[validate(length(min = 1, max = 500))]
    pub topic: String,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub status: Option<SessionStatus>,
    #[validate(length(max = 10000))]
    pub notes: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<UpdateSessionRequest> for SessionUpdate {
    fn from(req: UpdateSessionRequest) -> Self {
        Self {
            status: req.status,
            notes: req.notes,
            ended_at: req.ended_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    #[serde(default)]
    pub since: i64,
}

#[derive(Debug, Serialize)]
pub struct SignalAck {
    pub timestamp: i64,
}

fn caller(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(UserId::new)
}

// ============================================
// Health
// ============================================

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "signal-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sessions: state.metrics.sessions.get(),
    })
}

pub async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse { ready: true })
}

// ============================================
// Session metadata
// ============================================

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionInfo>)> {
    let Json(req) = body?;
    req.validate()?;
    if req.tutor_id == req.student_id {
        return Err(Error::InvalidRequest("tutor and student must differ".to_string()));
    }

    let record = SessionRecord {
        id: req.id.map(SessionId::new).unwrap_or_else(SessionId::generate),
        tutor_id: UserId::new(req.tutor_id),
        student_id: UserId::new(req.student_id),
        tutor_name: req.tutor_name,
        student_name: req.student_name,
        topic: req.topic,
        start_time: req.start_time.unwrap_or_else(Utc::now),
        status: SessionStatus::Scheduled,
        notes: None,
        ended_at: None,
        created_at: Utc::now(),
    };
    let record = state.store.insert_session(record)?;
    state.metrics.sessions.set(state.store.session_count() as u64);

    info!(session_id = %record.id, topic = %record.topic, "Session created");
    Ok((StatusCode::CREATED, Json(record.view(caller(&headers).as_ref()))))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SessionInfo>> {
    let id = SessionId::new(id);
    let record = state
        .store
        .get_session(&id)
        .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
    Ok(Json(record.view(caller(&headers).as_ref())))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: std::result::Result<Json<UpdateSessionRequest>, JsonRejection>,
) -> Result<Json<SessionInfo>> {
    let Json(req) = body?;
    req.validate()?;
    let id = SessionId::new(id);
    let record = state.store.update_session(&id, req.into())?;

    info!(session_id = %id, status = ?record.status, "Session updated");
    Ok(Json(record.view(caller(&headers).as_ref())))
}

// ============================================
// Signals
// ============================================

fn check_signal(session_id: &SessionId, signal: &Signal) -> Result<()> {
    if signal.session_id != *session_id {
        return Err(Error::InvalidRequest(format!(
            "signal addressed to {} posted to {}",
            signal.session_id, session_id
        )));
    }
    if signal.sender_id.as_str().is_empty() {
        return Err(Error::InvalidRequest("senderId is required".to_string()));
    }
    match &signal.payload {
        SignalPayload::Offer { sdp } | SignalPayload::Answer { sdp } if sdp.trim().is_empty() => {
            Err(Error::InvalidRequest("sdp must not be empty".to_string()))
        }
        _ => Ok(()),
    }
}

pub async fn post_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<Signal>, JsonRejection>,
) -> Result<(StatusCode, Json<SignalAck>)> {
    let Json(signal) = body?;
    let id = SessionId::new(id);
    check_signal(&id, &signal)?;

    let kind = signal.kind();
    let timestamp = state.store.push_signal(&id, signal)?;
    state.metrics.signals_stored.inc();
    tracing::debug!(session_id = %id, kind, timestamp, "Signal relayed");

    Ok((StatusCode::CREATED, Json(SignalAck { timestamp })))
}

pub async fn get_signals(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: std::result::Result<Query<SinceQuery>, QueryRejection>,
) -> Result<Json<SignalBatch>> {
    let Query(query) = query?;
    let id = SessionId::new(id);
    Ok(Json(SignalBatch {
        signals: state.store.signals_since(&id, query.since),
    }))
}
