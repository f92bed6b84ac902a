//! Interview session persistence. Every query joins through
//! `resumes.user_id`, so a session owned by someone else is simply not found.

use sqlx::{types::Json, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::{evaluate_transcript, Evaluation};
use crate::interview::prompts::OPENING_MESSAGE;
use crate::llm_client::LlmClient;
use crate::models::interview::{InterviewSessionRow, Message, SessionStatus, SessionWithResume};

pub const ALLOWED_DURATIONS: [i32; 3] = [15, 30, 45];
pub const DEFAULT_DURATION: i32 = 15;

const OWNED_SESSION: &str = r#"
    SELECT s.*
    FROM interview_sessions s
    JOIN resumes r ON r.id = s.resume_id
    WHERE s.id = $1 AND r.user_id = $2
"#;

fn not_found(session_id: Uuid) -> AppError {
    AppError::NotFound(format!("Interview session {session_id} not found"))
}

pub fn validate_duration(duration: Option<i32>) -> Result<i32, AppError> {
    let duration = duration.unwrap_or(DEFAULT_DURATION);
    if ALLOWED_DURATIONS.contains(&duration) {
        Ok(duration)
    } else {
        Err(AppError::Validation(format!(
            "duration_minutes must be one of {ALLOWED_DURATIONS:?}"
        )))
    }
}

/// True when `incoming` keeps every stored message, in order, and only adds
/// to the end.
pub fn extends(stored: &[Message], incoming: &[Message]) -> bool {
    incoming.len() >= stored.len()
        && stored
            .iter()
            .zip(incoming)
            .all(|(old, new)| old.same_content(new))
}

/// Creates a session seeded with the opening interviewer message.
pub async fn create_session(
    db: &PgPool,
    user_id: Uuid,
    resume_id: Uuid,
    duration_minutes: i32,
) -> Result<Uuid, AppError> {
    let owned: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM resumes WHERE id = $1 AND user_id = $2)")
            .bind(resume_id)
            .bind(user_id)
            .fetch_one(db)
            .await?;
    if !owned {
        return Err(AppError::NotFound(format!("Resume {resume_id} not found")));
    }

    let id = Uuid::new_v4();
    let messages = vec![Message::interviewer(OPENING_MESSAGE)];
    sqlx::query(
        r#"
        INSERT INTO interview_sessions (id, resume_id, messages, status, duration_minutes)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(resume_id)
    .bind(Json(&messages))
    .bind(SessionStatus::InProgress.as_str())
    .bind(duration_minutes)
    .execute(db)
    .await?;

    info!("Created interview session {id} for resume {resume_id} ({duration_minutes} min)");
    Ok(id)
}

pub async fn list_sessions(db: &PgPool, user_id: Uuid) -> Result<Vec<InterviewSessionRow>, AppError> {
    let sessions = sqlx::query_as(
        r#"
        SELECT s.*
        FROM interview_sessions s
        JOIN resumes r ON r.id = s.resume_id
        WHERE r.user_id = $1
        ORDER BY s.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(sessions)
}

pub async fn get_owned(
    db: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<InterviewSessionRow, AppError> {
    sqlx::query_as(OWNED_SESSION)
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| not_found(session_id))
}

/// Loads what a live interview needs: transcript, status and résumé text.
pub async fn load_live(
    db: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<SessionWithResume, AppError> {
    sqlx::query_as(
        r#"
        SELECT s.id, s.status, s.messages, r.resume_text
        FROM interview_sessions s
        JOIN resumes r ON r.id = s.resume_id
        WHERE s.id = $1 AND r.user_id = $2
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| not_found(session_id))
}

/// Replaces the stored transcript with one that extends it.
pub async fn checkpoint(
    db: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
    messages: &[Message],
) -> Result<(), AppError> {
    let locking = format!("{OWNED_SESSION} FOR UPDATE OF s");
    let mut tx = db.begin().await?;

    let session: InterviewSessionRow = sqlx::query_as(&locking)
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| not_found(session_id))?;

    if session.status() == SessionStatus::Completed {
        return Err(AppError::Conflict(
            "Interview is already completed".to_string(),
        ));
    }
    if !extends(&session.messages, messages) {
        return Err(AppError::Conflict(
            "Transcript does not extend the stored conversation".to_string(),
        ));
    }

    sqlx::query("UPDATE interview_sessions SET messages = $2, updated_at = NOW() WHERE id = $1")
        .bind(session_id)
        .bind(Json(messages))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// One-time transition to COMPLETED. A second attempt is a conflict.
pub async fn mark_completed(
    db: &PgPool,
    session_id: Uuid,
    evaluation: &Evaluation,
) -> Result<InterviewSessionRow, AppError> {
    sqlx::query_as(
        r#"
        UPDATE interview_sessions
        SET status = $2, score = $3, feedback = $4, updated_at = NOW()
        WHERE id = $1 AND status = $5
        RETURNING *
        "#,
    )
    .bind(session_id)
    .bind(SessionStatus::Completed.as_str())
    .bind(i32::from(evaluation.score))
    .bind(&evaluation.feedback)
    .bind(SessionStatus::InProgress.as_str())
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::Conflict("Interview is already completed".to_string()))
}

/// Scores the stored transcript and completes the session.
pub async fn complete_session(
    db: &PgPool,
    llm: &LlmClient,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<(InterviewSessionRow, Evaluation), AppError> {
    let session = get_owned(db, session_id, user_id).await?;
    if session.status() == SessionStatus::Completed {
        return Err(AppError::Conflict(
            "Interview is already completed".to_string(),
        ));
    }

    let evaluation = evaluate_transcript(llm, &session.messages).await?;
    let updated = mark_completed(db, session_id, &evaluation).await?;
    info!(
        "Completed interview session {session_id} with score {}",
        evaluation.score
    );
    Ok((updated, evaluation))
}
