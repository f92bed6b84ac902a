mod auth;
mod config;
mod conversation;
mod db;
mod errors;
mod evaluation;
mod interview;
mod llm_client;
mod models;
mod resumes;
mod routes;
mod speech;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::interview::policy::SingleQuestionPolicy;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::speech::TtsClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first: missing required env vars abort startup
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Intervue API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Redis backs the speech cache
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    let llm = LlmClient::new(config.gemini_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let tts = TtsClient::new(config.google_tts_key.clone(), redis)?;
    if !tts.is_configured() {
        warn!("GOOGLE_TTS_KEY not set; speech synthesis will answer 503");
    }

    let state = AppState {
        db,
        s3,
        llm,
        config: config.clone(),
        policy: Arc::new(SingleQuestionPolicy),
        tts,
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "intervue-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    // MinIO needs path-style addressing
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
