//! In-memory session metadata and signal logs

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use tutorcall_core::{now_millis, SessionId, UserId};
use tutorcall_media_sdk::{ParticipantRole, SessionInfo, SessionStatus, SessionUpdate, Signal};

use crate::error::{Error, Result};

/// Stored tutoring session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    pub tutor_id: UserId,
    pub student_id: UserId,
    pub tutor_name: String,
    pub student_name: String,
    pub topic: String,
    pub start_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub notes: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn role_of(&self, user: &UserId) -> Option<ParticipantRole> {
        if *user == self.tutor_id {
            Some(ParticipantRole::Tutor)
        } else if *user == self.student_id {
            Some(ParticipantRole::Student)
        } else {
            None
        }
    }

    /// Metadata as seen by `caller`
    pub fn view(&self, caller: Option<&UserId>) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            tutor_name: self.tutor_name.clone(),
            student_name: self.student_name.clone(),
            topic: self.topic.clone(),
            start_time: self.start_time,
            role: caller.and_then(|user| self.role_of(user)),
            status: self.status,
            notes: self.notes.clone(),
            ended_at: self.ended_at,
        }
    }
}

#[derive(Debug, Default)]
struct SignalLog {
    last_timestamp: i64,
    signals: VecDeque<Signal>,
}

pub struct RelayStore {
    sessions: DashMap<SessionId, SessionRecord>,
    signals: DashMap<SessionId, SignalLog>,
    max_signals_per_session: usize,
}

impl RelayStore {
    pub fn new(max_signals_per_session: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            signals: DashMap::new(),
            max_signals_per_session: max_signals_per_session.max(1),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn insert_session(&self, record: SessionRecord) -> Result<SessionRecord> {
        match self.sessions.entry(record.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::SessionExists(record.id.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn get_session(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.get(id).map(|r| r.clone())
    }

    /// Applies a partial update. Completed and cancelled sessions cannot be reopened.
    pub fn update_session(&self, id: &SessionId, update: SessionUpdate) -> Result<SessionRecord> {
        let mut record = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        if let Some(next) = update.status {
            if !transition_allowed(record.status, next) {
                return Err(Error::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    record.status, next
                )));
            }
            record.status = next;
            if next == SessionStatus::Completed && record.ended_at.is_none() && update.ended_at.is_none() {
                record.ended_at = Some(Utc::now());
            }
            if next.is_terminal() && self.signals.remove(id).is_some() {
                debug!(session_id = %id, status = ?next, "Session closed, signal log dropped");
            }
        }
        if let Some(notes) = update.notes {
            record.notes = Some(notes);
        }
        if let Some(ended_at) = update.ended_at {
            record.ended_at = Some(ended_at);
        }
        Ok(record.clone())
    }

    /// Stores a signal and returns its relay-assigned timestamp.
    /// Sessions without metadata are accepted; closed sessions are not.
    pub fn push_signal(&self, session_id: &SessionId, mut signal: Signal) -> Result<i64> {
        if let Some(record) = self.sessions.get(session_id) {
            if record.status.is_terminal() {
                return Err(Error::SessionClosed(session_id.to_string()));
            }
        }

        let mut log = self.signals.entry(session_id.clone()).or_default();
        let timestamp = now_millis().max(log.last_timestamp + 1);
        log.last_timestamp = timestamp;
        signal.timestamp = timestamp;
        log.signals.push_back(signal);

        while log.signals.len() > self.max_signals_per_session {
            log.signals.pop_front();
        }
        debug!(session_id = %session_id, timestamp, stored = log.signals.len(), "Signal stored");
        Ok(timestamp)
    }

    /// Signals with `timestamp > since`, oldest first
    pub fn signals_since(&self, session_id: &SessionId, since: i64) -> Vec<Signal> {
        self.signals
            .get(session_id)
            .map(|log| {
                log.signals
                    .iter()
                    .filter(|s| s.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn transition_allowed(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    match (from, to) {
        (a, b) if a == b => true,
        (Scheduled, _) => true,
        (Active, Completed | Cancelled) => true,
        _ => false,
    }
}
