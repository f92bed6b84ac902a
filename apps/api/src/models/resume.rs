use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub resume_text: String,
    pub s3_key: String,
    pub created_at: DateTime<Utc>,
}

/// Listing view of a resume; the extracted text stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeSummary {
    pub id: Uuid,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}
