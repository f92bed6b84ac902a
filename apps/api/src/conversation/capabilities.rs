//! The collaborators a live interview drives: speech capture, speech
//! synthesis, the completion endpoint and the transcript store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::Evaluation;
use crate::models::interview::Message;

/// Identifies one microphone capture. Events carrying an id that is no
/// longer active are dropped.
pub type CaptureId = u64;
/// Identifies one spoken segment.
pub type SegmentId = u64;

/// Speech recognition. Results arrive later as [`CaptureEvent`]s.
pub trait SpeechCapture: Send {
    fn start(&mut self, capture_id: CaptureId) -> Result<(), CaptureError>;
    fn stop(&mut self, capture_id: CaptureId);
}

/// Speech playback. Each finished segment is reported back by id.
pub trait SpeechSynthesis: Send {
    fn speak(&mut self, utterance: &Utterance);
    fn cancel(&mut self);
}

/// One model turn: the latest candidate utterance plus bounded context.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub utterance: &'a str,
    pub resume_text: &'a str,
    pub history: &'a [Message],
}

/// Produces the interviewer's raw reply text for a turn.
#[async_trait]
pub trait CompletionEndpoint: Send + Sync {
    async fn complete(&self, request: TurnRequest<'_>) -> Result<String, AppError>;
}

/// Persists transcripts and runs the final scoring step.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn checkpoint(&self, session_id: Uuid, transcript: &[Message]) -> Result<(), AppError>;
    async fn complete(&self, session_id: Uuid, transcript: &[Message])
        -> Result<Evaluation, AppError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("no-speech")]
    NoSpeech,
    #[error("aborted")]
    Aborted,
    #[error("audio-capture")]
    AudioCapture,
    #[error("not-allowed")]
    NotAllowed,
    #[error("network")]
    Network,
    #[error("unsupported")]
    Unsupported,
    #[error("{0}")]
    Other(String),
}

impl CaptureError {
    /// Maps a browser `SpeechRecognitionErrorEvent.error` code.
    pub fn from_browser(code: &str) -> Self {
        match code.trim() {
            "no-speech" => CaptureError::NoSpeech,
            "aborted" => CaptureError::Aborted,
            "audio-capture" => CaptureError::AudioCapture,
            "not-allowed" | "service-not-allowed" => CaptureError::NotAllowed,
            "network" => CaptureError::Network,
            "unsupported" | "language-not-supported" => CaptureError::Unsupported,
            other => CaptureError::Other(other.to_string()),
        }
    }

    /// Benign errors return the loop to idle without telling the user.
    pub fn is_benign(&self) -> bool {
        matches!(self, CaptureError::NoSpeech | CaptureError::Aborted)
    }

    pub fn user_message(&self) -> String {
        match self {
            CaptureError::Unsupported => {
                "Sorry, your browser does not support Speech Recognition.".to_string()
            }
            other => format!("Mic error: {other}. Please check permissions."),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEventKind {
    Interim(String),
    Final(String),
    Error(CaptureError),
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureEvent {
    pub capture_id: CaptureId,
    pub kind: CaptureEventKind,
}

/// Voice and prosody applied to every spoken segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceProfile {
    /// `None` lets the client use its default voice.
    pub voice_name: Option<String>,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub segment_pause_ms: u32,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            voice_name: None,
            lang: "en-IN".to_string(),
            rate: 1.0,
            pitch: 1.0,
            segment_pause_ms: 300,
        }
    }
}

/// A voice the client reports as available.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub lang: String,
}

/// Prefers a female Indian English voice, then British, then American.
pub fn select_voice(voices: &[VoiceInfo]) -> Option<&VoiceInfo> {
    let female = |v: &&VoiceInfo| v.name.to_lowercase().contains("female");
    voices
        .iter()
        .filter(female)
        .find(|v| v.lang == "en-IN")
        .or_else(|| voices.iter().filter(female).find(|v| v.lang.starts_with("en-GB")))
        .or_else(|| voices.iter().filter(female).find(|v| v.lang.starts_with("en-US")))
}

impl VoiceProfile {
    pub fn for_voices(voices: &[VoiceInfo]) -> Self {
        match select_voice(voices) {
            Some(voice) => Self {
                voice_name: Some(voice.name.clone()),
                lang: voice.lang.clone(),
                ..Self::default()
            },
            None => Self::default(),
        }
    }
}

/// A single segment queued for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: SegmentId,
    pub text: String,
    pub voice: VoiceProfile,
    pub pause_before_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, lang: &str) -> VoiceInfo {
        VoiceInfo {
            name: name.to_string(),
            lang: lang.to_string(),
        }
    }

    #[test]
    fn test_prefers_indian_female_voice() {
        let voices = [
            voice("Google US English Female", "en-US"),
            voice("Microsoft Heera Female", "en-IN"),
            voice("Microsoft Ravi", "en-IN"),
        ];
        assert_eq!(select_voice(&voices).unwrap().name, "Microsoft Heera Female");
    }

    #[test]
    fn test_falls_back_to_british_then_american() {
        let voices = [
            voice("Samantha Female", "en-US"),
            voice("Serena female", "en-GB"),
        ];
        assert_eq!(select_voice(&voices).unwrap().lang, "en-GB");

        let voices = [voice("Samantha Female", "en-US"), voice("Daniel", "en-GB")];
        assert_eq!(select_voice(&voices).unwrap().lang, "en-US");
    }

    #[test]
    fn test_no_match_uses_client_default() {
        let voices = [voice("Daniel", "en-GB"), voice("Amélie Female", "fr-CA")];
        assert!(select_voice(&voices).is_none());
        assert_eq!(VoiceProfile::for_voices(&voices), VoiceProfile::default());
    }

    #[test]
    fn test_browser_error_codes() {
        assert!(CaptureError::from_browser("no-speech").is_benign());
        assert!(CaptureError::from_browser("aborted").is_benign());
        assert_eq!(
            CaptureError::from_browser("service-not-allowed"),
            CaptureError::NotAllowed
        );
        assert!(!CaptureError::from_browser("network").is_benign());
        assert_eq!(
            CaptureError::from_browser("bad-grammar"),
            CaptureError::Other("bad-grammar".into())
        );
    }

    #[test]
    fn test_permission_message() {
        assert_eq!(
            CaptureError::NotAllowed.user_message(),
            "Mic error: not-allowed. Please check permissions."
        );
    }
}
