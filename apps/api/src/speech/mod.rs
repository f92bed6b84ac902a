//! Server-side speech synthesis through Google Cloud Text-to-Speech, with a
//! Redis cache in front of it.

pub mod handlers;

use redis::AsyncCommands;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;

const TTS_ENDPOINT: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
const LANGUAGE_CODE: &str = "en-IN";
const VOICE_NAME: &str = "en-IN-Neural2-A";
const SPEAKING_RATE: f32 = 0.93;
const CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Exactly one of plain text or SSML.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechInput {
    Text(String),
    Ssml(String),
}

impl SpeechInput {
    pub fn from_parts(text: Option<String>, ssml: Option<String>) -> Result<Self, AppError> {
        let text = text.filter(|t| !t.trim().is_empty());
        let ssml = ssml.filter(|s| !s.trim().is_empty());
        match (text, ssml) {
            (Some(text), None) => Ok(SpeechInput::Text(text)),
            (None, Some(ssml)) => Ok(SpeechInput::Ssml(ssml)),
            (None, None) => Err(AppError::Validation(
                "One of text or ssml is required".to_string(),
            )),
            (Some(_), Some(_)) => Err(AppError::Validation(
                "Provide either text or ssml, not both".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: &'a SpeechInput,
    voice: VoiceSelection,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection {
    language_code: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

fn synthesize_request(input: &SpeechInput) -> SynthesizeRequest<'_> {
    SynthesizeRequest {
        input,
        voice: VoiceSelection {
            language_code: LANGUAGE_CODE,
            name: VOICE_NAME,
        },
        audio_config: AudioConfig {
            audio_encoding: "MP3",
            speaking_rate: SPEAKING_RATE,
        },
    }
}

/// Cache key derived from the full request body, so a voice or rate change
/// never serves stale audio.
fn cache_key(input: &SpeechInput) -> String {
    let body = serde_json::to_vec(&synthesize_request(input)).unwrap_or_default();
    format!("tts:{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, &body))
}

#[derive(Clone)]
pub struct TtsClient {
    http: Client,
    api_key: Option<String>,
    redis: redis::Client,
}

impl TtsClient {
    pub fn new(api_key: Option<String>, redis: redis::Client) -> anyhow::Result<Self> {
        Ok(Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            api_key,
            redis,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Returns base64-encoded MP3 audio.
    pub async fn synthesize(&self, input: &SpeechInput) -> Result<String, AppError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::ServiceUnavailable("Speech synthesis is not configured".to_string())
        })?;

        let key = cache_key(input);
        if let Some(audio) = self.cached(&key).await {
            debug!("TTS cache hit {key}");
            return Ok(audio);
        }

        let response = self
            .http
            .post(TTS_ENDPOINT)
            .query(&[("key", api_key)])
            .json(&synthesize_request(input))
            .send()
            .await
            .map_err(|e| AppError::Speech(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Speech(format!("status {status}: {body}")));
        }

        let audio = response
            .json::<SynthesizeResponse>()
            .await
            .map_err(|e| AppError::Speech(format!("malformed response: {e}")))?
            .audio_content;

        self.store(&key, &audio).await;
        Ok(audio)
    }

    async fn cached(&self, key: &str) -> Option<String> {
        match self.read_cache(key).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!("TTS cache read failed: {e}");
                None
            }
        }
    }

    async fn store(&self, key: &str, audio: &str) {
        if let Err(e) = self.write_cache(key, audio).await {
            warn!("TTS cache write failed: {e}");
        }
    }

    async fn read_cache(&self, key: &str) -> redis::RedisResult<Option<String>> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        conn.get(key).await
    }

    async fn write_cache(&self, key: &str, audio: &str) -> redis::RedisResult<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        conn.set_ex(key, audio, CACHE_TTL_SECS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_input_required() {
        assert_eq!(
            SpeechInput::from_parts(Some("Hello".into()), None).unwrap(),
            SpeechInput::Text("Hello".into())
        );
        assert!(SpeechInput::from_parts(None, Some("<speak>Hi</speak>".into())).is_ok());
        assert!(matches!(
            SpeechInput::from_parts(None, Some("  ".into())),
            Err(AppError::Validation(_))
        ));
        assert!(SpeechInput::from_parts(Some("a".into()), Some("<speak/>".into())).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let input = SpeechInput::Ssml("<speak>Hi</speak>".into());
        let value = serde_json::to_value(synthesize_request(&input)).unwrap();
        assert_eq!(value["input"]["ssml"], "<speak>Hi</speak>");
        assert_eq!(value["voice"]["name"], "en-IN-Neural2-A");
        assert_eq!(value["audioConfig"]["audioEncoding"], "MP3");
    }

    #[test]
    fn test_cache_key_is_stable_per_input() {
        let a = SpeechInput::Text("Tell me about yourself.".into());
        let b = SpeechInput::Ssml("Tell me about yourself.".into());
        assert_eq!(cache_key(&a), cache_key(&a.clone()));
        assert_ne!(cache_key(&a), cache_key(&b));
        assert!(cache_key(&a).starts_with("tts:"));
    }

    #[tokio::test]
    async fn test_unconfigured_client_is_unavailable() {
        let redis = redis::Client::open("redis://127.0.0.1:1").unwrap();
        let client = TtsClient::new(None, redis).unwrap();
        assert!(!client.is_configured());
        let err = client
            .synthesize(&SpeechInput::Text("Hello".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }
}
