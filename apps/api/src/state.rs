use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::interview::policy::ReplyPolicy;
use crate::llm_client::LlmClient;
use crate::speech::TtsClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub config: Config,
    /// Shapes interviewer replies. Default: `SingleQuestionPolicy`.
    pub policy: Arc<dyn ReplyPolicy>,
    /// Text-to-speech proxy; owns the Redis cache connection.
    pub tts: TtsClient,
}
