use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::speech::SpeechInput;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SynthesizeBody {
    pub text: Option<String>,
    pub ssml: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SynthesizeReply {
    /// Base64 MP3.
    pub audio_content: String,
}

/// POST /api/v1/speech/synthesize
pub async fn handle_synthesize(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(body): Json<SynthesizeBody>,
) -> Result<Json<SynthesizeReply>, AppError> {
    let input = SpeechInput::from_parts(body.text, body.ssml)?;
    let audio_content = state.tts.synthesize(&input).await?;
    Ok(Json(SynthesizeReply { audio_content }))
}
