//! Account routes: signup, signin, signout and profile.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{hash_password, issue_token, verify_password, AuthUser, TOKEN_COOKIE};
use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SigninResponse {
    pub success: bool,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub experience_level: Option<String>,
    pub career_goal: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// POST /api/v1/auth/signup
pub async fn handle_signup(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let email = normalize_email(&req.email);
    validate_credentials(&email, &req.password)?;

    let password_hash = hash_password(req.password).await?;
    let id = Uuid::new_v4();

    sqlx::query("INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(&email)
        .bind(&password_hash)
        .execute(&state.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("An account with this email already exists".to_string())
            }
            other => AppError::Database(other),
        })?;

    info!("Created user {id}");
    Ok((StatusCode::CREATED, Json(SignupResponse { id, email })))
}

/// POST /api/v1/auth/signin
pub async fn handle_signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<Credentials>,
) -> Result<(CookieJar, Json<SigninResponse>), AppError> {
    let email = normalize_email(&req.email);

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    // Same 401 for unknown email and wrong password.
    let Some(user) = user else {
        return Err(invalid_credentials());
    };
    if !verify_password(req.password, user.password_hash.clone()).await? {
        return Err(invalid_credentials());
    }

    let token = issue_token(&state.config.jwt_secret, user.id, &user.email)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {e}")))?;

    let cookie = Cookie::build((TOKEN_COOKIE, token.clone()))
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.config.cookie_secure)
        .path("/")
        .build();

    info!("User {} signed in", user.id);
    Ok((
        jar.add(cookie),
        Json(SigninResponse {
            success: true,
            token,
        }),
    ))
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid email or password.".to_string())
}

/// POST /api/v1/auth/signout
pub async fn handle_signout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (
        jar.remove(Cookie::build(TOKEN_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
}

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, AppError> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth.user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

/// PUT /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let user: User = sqlx::query_as(
        r#"
        UPDATE users
        SET name = COALESCE($2, name),
            experience_level = COALESCE($3, experience_level),
            career_goal = COALESCE($4, career_goal),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.experience_level.as_deref().map(str::trim))
    .bind(req.career_goal.as_deref().map(str::trim))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            validate_credentials("ada@example.com", "12345"),
            Err(AppError::Validation(_))
        ));
        assert!(validate_credentials("ada@example.com", "123456").is_ok());
    }

    #[test]
    fn test_email_without_at_rejected() {
        assert!(validate_credentials("ada.example.com", "secret-pass").is_err());
    }
}
