pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::auth::handlers as auth;
use crate::conversation::live;
use crate::interview::handlers as interviews;
use crate::resumes::handlers as resumes;
use crate::speech::handlers as speech;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Accounts
        .route("/api/v1/auth/signup", post(auth::handle_signup))
        .route("/api/v1/auth/signin", post(auth::handle_signin))
        .route("/api/v1/auth/signout", post(auth::handle_signout))
        .route(
            "/api/v1/profile",
            get(auth::handle_get_profile).put(auth::handle_update_profile),
        )
        // Resumes
        .route(
            "/api/v1/resumes",
            post(resumes::handle_upload_resume)
                .get(resumes::handle_list_resumes)
                .layer(DefaultBodyLimit::max(resumes::MAX_RESUME_BYTES)),
        )
        // Interviews
        .route(
            "/api/v1/interviews",
            post(interviews::handle_create_session).get(interviews::handle_list_sessions),
        )
        .route("/api/v1/interviews/:id", get(interviews::handle_get_session))
        .route("/api/v1/interviews/:id/reply", post(interviews::handle_reply))
        .route(
            "/api/v1/interviews/:id/messages",
            put(interviews::handle_checkpoint),
        )
        .route(
            "/api/v1/interviews/:id/complete",
            post(interviews::handle_complete),
        )
        .route(
            "/api/v1/interviews/:id/results",
            get(interviews::handle_results),
        )
        .route("/api/v1/interviews/:id/live", get(live::handle_live))
        // Speech
        .route("/api/v1/speech/synthesize", post(speech::handle_synthesize))
        .with_state(state)
}
