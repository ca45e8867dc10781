//! Tutoring session metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tutorcall_core::SessionId;

/// The caller's part in a tutoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Tutor,
    Student,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tutor => "tutor",
            Self::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Completed and cancelled sessions never change status again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Body of `GET /api/session/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub tutor_name: String,
    pub student_name: String,
    pub topic: String,
    pub start_time: DateTime<Utc>,
    /// Role of whoever asked; absent for callers outside the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ParticipantRole>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Body of `PATCH /api/session/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    /// Update sent when a call ends normally
    pub fn completed(notes: Option<String>) -> Self {
        Self {
            status: Some(SessionStatus::Completed),
            notes,
            ended_at: Some(Utc::now()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.notes.is_none() && self.ended_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_info_wire_shape() {
        let raw = r#"{
            "id": "abc123",
            "tutorName": "Ada",
            "studentName": "Grace",
            "topic": "Algebra",
            "startTime": "2026-10-18T15:00:00Z",
            "role": "student"
        }"#;
        let info: SessionInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.role, Some(ParticipantRole::Student));
        assert_eq!(info.status, SessionStatus::Scheduled);
        assert!(info.ended_at.is_none());
    }

    #[test]
    fn test_completed_update() {
        let update = SessionUpdate::completed(Some("covered factoring".into()));
        assert_eq!(update.status, Some(SessionStatus::Completed));
        assert!(update.ended_at.is_some());

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("endedAt").is_some());
    }

    #[test]
    fn test_empty_update_serializes_to_empty_object() {
        let update = SessionUpdate::default();
        assert!(update.is_empty());
        assert_eq!(serde_json::to_string(&update).unwrap(), "{}");
    }
}
