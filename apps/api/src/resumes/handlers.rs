use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::resume::{ResumeRow, ResumeSummary};
use crate::resumes::extract::{extract_resume_text, looks_like_pdf};
use crate::resumes::{resume_s3_key, store_original};
use crate::state::AppState;

/// Upload size limit applied to the resume route.
pub const MAX_RESUME_BYTES: usize = 10 * 1024 * 1024;
const RESUME_FIELD: &str = "resume";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

struct Upload {
    file_name: String,
    bytes: Bytes,
}

async fn read_resume_field(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(RESUME_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "resume.pdf".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
        return Ok(Upload { file_name, bytes });
    }
    Err(AppError::Validation("No file uploaded.".to_string()))
}

/// POST /api/v1/resumes
pub async fn handle_upload_resume(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let upload = read_resume_field(multipart).await?;
    if !looks_like_pdf(&upload.bytes) {
        return Err(AppError::Validation(
            "Only PDF resumes are supported".to_string(),
        ));
    }

    let resume_text = extract_resume_text(upload.bytes.clone()).await?;

    let id = Uuid::new_v4();
    let s3_key = resume_s3_key(auth.user_id, id);
    store_original(&state.s3, &state.config.s3_bucket, &s3_key, upload.bytes).await?;

    let resume: ResumeRow = sqlx::query_as(
        r#"
        INSERT INTO resumes (id, user_id, file_name, resume_text, s3_key)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(auth.user_id)
    .bind(&upload.file_name)
    .bind(&resume_text)
    .bind(&s3_key)
    .fetch_one(&state.db)
    .await?;

    info!(
        "Stored resume {} for {} ({} chars extracted)",
        resume.id,
        auth.email,
        resume.resume_text.chars().count()
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: resume.id,
            file_name: resume.file_name,
            created_at: resume.created_at,
        }),
    ))
}

/// GET /api/v1/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ResumeSummary>>, AppError> {
    let resumes: Vec<ResumeSummary> = sqlx::query_as(
        "SELECT id, file_name, created_at FROM resumes WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(resumes))
}
