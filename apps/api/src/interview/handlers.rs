use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::conversation::capabilities::TurnRequest;
use crate::errors::AppError;
use crate::interview::reply::{next_reply, recent_turns, InterviewerModel, ShapedReply};
use crate::interview::sessions::{self, validate_duration};
use crate::models::interview::{InterviewSessionRow, Message, SessionStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub resume_id: Uuid,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub utterance: String,
    #[serde(default)]
    pub conversation_history: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct CheckpointRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct CheckpointResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub session_id: Uuid,
    pub score: Option<i32>,
    pub feedback: Option<String>,
    pub duration_minutes: i32,
    pub messages: Vec<Message>,
}

/// POST /api/v1/interviews
pub async fn handle_create_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let duration = validate_duration(req.duration_minutes)?;
    let session_id = sessions::create_session(&state.db, auth.user_id, req.resume_id, duration).await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

/// GET /api/v1/interviews
pub async fn handle_list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<InterviewSessionRow>>, AppError> {
    Ok(Json(sessions::list_sessions(&state.db, auth.user_id).await?))
}

/// GET /api/v1/interviews/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<InterviewSessionRow>, AppError> {
    Ok(Json(sessions::get_owned(&state.db, id, auth.user_id).await?))
}

/// POST /api/v1/interviews/:id/reply
///
/// Stateless: the client supplies the history, the résumé comes from the
/// session. Always answers with a speakable line, substituting a fallback
/// when the model fails.
pub async fn handle_reply(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> Result<Json<ShapedReply>, AppError> {
    let utterance = req.utterance.trim();
    if utterance.is_empty() {
        return Err(AppError::Validation("utterance must not be empty".to_string()));
    }

    let session = sessions::load_live(&state.db, id, auth.user_id).await?;
    if session.status == SessionStatus::Completed.as_str() {
        return Err(AppError::Conflict("Interview is already completed".to_string()));
    }

    let completion = InterviewerModel::new(state.llm.clone());
    let request = TurnRequest {
        utterance,
        resume_text: &session.resume_text,
        history: recent_turns(&req.conversation_history, state.config.history_turns),
    };
    let reply = next_reply(&completion, state.policy.as_ref(), request).await;
    Ok(Json(reply))
}

/// PUT /api/v1/interviews/:id/messages
pub async fn handle_checkpoint(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CheckpointRequest>,
) -> Result<Json<CheckpointResponse>, AppError> {
    sessions::checkpoint(&state.db, id, auth.user_id, &req.messages).await?;
    Ok(Json(CheckpointResponse { success: true }))
}

/// POST /api/v1/interviews/:id/complete
pub async fn handle_complete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<InterviewSessionRow>, AppError> {
    let (session, _) = sessions::complete_session(&state.db, &state.llm, id, auth.user_id).await?;
    Ok(Json(session))
}

/// GET /api/v1/interviews/:id/results
pub async fn handle_results(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ResultsResponse>, AppError> {
    let session = sessions::get_owned(&state.db, id, auth.user_id).await?;
    if session.status() != SessionStatus::Completed {
        return Err(AppError::Conflict(
            "Interview is still in progress".to_string(),
        ));
    }
    Ok(Json(ResultsResponse {
        session_id: session.id,
        score: session.score,
        feedback: session.feedback,
        duration_minutes: session.duration_minutes,
        messages: session.messages.0,
    }))
}
