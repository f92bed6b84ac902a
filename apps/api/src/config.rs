use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub gemini_api_key: String,
    pub jwt_secret: String,
    /// Google Cloud TTS key. Speech synthesis answers 503 when unset.
    pub google_tts_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    /// How many prior turns (candidate + interviewer pairs) are sent to the model.
    pub history_turns: usize,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            jwt_secret: require_env("JWT_SECRET")?,
            google_tts_key: std::env::var("GOOGLE_TTS_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            history_turns: std::env::var("INTERVIEW_HISTORY_TURNS")
                .unwrap_or_else(|_| "6".to_string())
                .parse::<usize>()
                .context("INTERVIEW_HISTORY_TURNS must be a non-negative integer")?,
            cookie_secure: parse_bool(
                "COOKIE_SECURE",
                &std::env::var("COOKIE_SECURE").unwrap_or_else(|_| "false".to_string()),
            )?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{key} must be a boolean, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_accepts_common_spellings() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "ON").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(!parse_bool("X", "").unwrap());
    }

    #[test]
    fn test_parse_bool_rejects_garbage() {
        let err = parse_bool("COOKIE_SECURE", "maybe").unwrap_err();
        assert!(err.to_string().contains("COOKIE_SECURE"));
    }
}
