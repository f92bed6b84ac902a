use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Who spoke a transcript line. Older clients send `user` / `gemini`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    #[serde(alias = "user")]
    Candidate,
    #[serde(alias = "gemini")]
    Interviewer,
}

impl Sender {
    pub fn label(self) -> &'static str {
        match self {
            Sender::Candidate => "Candidate",
            Sender::Interviewer => "Interviewer",
        }
    }
}

/// A single transcript line. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn candidate(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Candidate,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn interviewer(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Interviewer,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Content equality, ignoring the approximate timestamp.
    pub fn same_content(&self, other: &Message) -> bool {
        self.sender == other.sender && self.text == other.text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InterviewSessionRow {
    pub id: Uuid,
    pub resume_id: Uuid,
    pub messages: Json<Vec<Message>>,
    pub status: String,
    pub score: Option<i32>,
    pub feedback: Option<String>,
    pub duration_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewSessionRow {
    pub fn status(&self) -> SessionStatus {
        if self.status == SessionStatus::Completed.as_str() {
            SessionStatus::Completed
        } else {
            SessionStatus::InProgress
        }
    }
}

/// Session row joined with the owning resume's text, used to drive a live interview.
#[derive(Debug, Clone, FromRow)]
pub struct SessionWithResume {
    pub id: Uuid,
    pub status: String,
    pub messages: Json<Vec<Message>>,
    pub resume_text: String,
}
