//! Password hashing, session tokens and the `AuthUser` extractor.
//!
//! Tokens are HS256 JWTs carried in the `token` cookie (browser) or an
//! `Authorization: Bearer` header (API clients).

pub mod handlers;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "token";
const TOKEN_TTL_HOURS: i64 = 24;

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues a signed session token valid for 24 hours.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        iat: now,
        exp: now + TOKEN_TTL_HOURS * 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verifies signature and expiry, returning the claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Hashes a password on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("verify task failed: {e}")))?
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password verification failed: {e}")))
}

/// The authenticated caller. Extracting it rejects the request with 401
/// when no valid token is present.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| {
                CookieJar::from_headers(&parts.headers)
                    .get(TOKEN_COOKIE)
                    .map(|c| c.value().to_string())
            })
            .filter(|t| !t.is_empty())
            .ok_or_else(AppError::unauthenticated)?;

        let claims = verify_token(&state.config.jwt_secret, &token).map_err(|e| {
            debug!("Rejected session token: {e}");
            AppError::unauthenticated()
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issued_token_verifies() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, "ada@example.com").unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_token_with_wrong_secret_is_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), "ada@example.com").unwrap();
        assert!(verify_token("another-secret", &token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "ada@example.com".into(),
            iat: now - 2 * 86_400,
            exp: now - 86_400,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify_token(SECRET, &token).is_err());
    }

    #[tokio::test]
    async fn test_password_hash_verifies_only_the_original() {
        let hash = hash_password("hunter22".into()).await.unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("hunter23".into(), hash).await.unwrap());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert!(bearer_token(&headers).is_none());
    }
}
