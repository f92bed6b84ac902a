//! Transcript scoring: one JSON-mode LLM call producing a 1-10 score and
//! short written feedback.

pub mod prompts;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::llm_client::{prompts::JSON_ONLY_SYSTEM, LlmClient};
use crate::models::interview::Message;

use prompts::{EVALUATION_PERSONA, EVALUATION_PROMPT};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub score: u8,
    pub feedback: String,
}

/// Shape the model is asked to return. `score` is loose because models
/// sometimes quote it or emit a float.
#[derive(Debug, Deserialize)]
struct RawEvaluation {
    score: Value,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Serialize)]
struct TranscriptLine<'a> {
    speaker: &'static str,
    text: &'a str,
}

pub fn build_evaluation_prompt(transcript: &[Message]) -> String {
    let lines: Vec<TranscriptLine<'_>> = transcript
        .iter()
        .map(|m| TranscriptLine {
            speaker: m.sender.label(),
            text: &m.text,
        })
        .collect();
    let rendered = serde_json::to_string_pretty(&lines).unwrap_or_else(|_| "[]".to_string());
    EVALUATION_PROMPT.replace("{transcript}", &rendered)
}

/// Rounds and clamps a model-provided score into 1..=10.
fn normalize_score(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(1.0, 10.0) as u8)
}

fn into_evaluation(raw: RawEvaluation) -> Result<Evaluation, AppError> {
    let score = normalize_score(&raw.score)
        .ok_or_else(|| AppError::Llm(format!("Unusable evaluation score: {}", raw.score)))?;
    let feedback = raw
        .feedback
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::Llm("Evaluation is missing feedback".to_string()))?;
    Ok(Evaluation { score, feedback })
}

/// Scores a finished interview transcript.
pub async fn evaluate_transcript(
    llm: &LlmClient,
    transcript: &[Message],
) -> Result<Evaluation, AppError> {
    if transcript.is_empty() {
        return Err(AppError::Validation(
            "Cannot evaluate an empty transcript".to_string(),
        ));
    }

    let prompt = build_evaluation_prompt(transcript);
    let system = format!("{EVALUATION_PERSONA} {JSON_ONLY_SYSTEM}");
    let raw: RawEvaluation = llm
        .call_json(&prompt, &system)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    let evaluation = into_evaluation(raw)?;
    info!(
        "Evaluated transcript of {} messages: score {}",
        transcript.len(),
        evaluation.score
    );
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawEvaluation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numeric_and_string_scores() {
        assert_eq!(normalize_score(&json!(7)), Some(7));
        assert_eq!(normalize_score(&json!("8")), Some(8));
        assert_eq!(normalize_score(&json!(6.6)), Some(7));
        assert_eq!(normalize_score(&json!(" 9 ")), Some(9));
    }

    #[test]
    fn test_scores_are_clamped() {
        assert_eq!(normalize_score(&json!(0)), Some(1));
        assert_eq!(normalize_score(&json!(42)), Some(10));
        assert_eq!(normalize_score(&json!(-3)), Some(1));
    }

    #[test]
    fn test_unusable_scores_rejected() {
        assert_eq!(normalize_score(&json!("seven")), None);
        assert_eq!(normalize_score(&json!(null)), None);
        assert_eq!(normalize_score(&json!([7])), None);
    }

    #[test]
    fn test_blank_feedback_is_an_llm_error() {
        let err = into_evaluation(raw(json!({"score": 7, "feedback": "   "}))).unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        let err = into_evaluation(raw(json!({"score": 7}))).unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[test]
    fn test_valid_evaluation() {
        let evaluation =
            into_evaluation(raw(json!({"score": "6", "feedback": " Clear answers. "}))).unwrap();
        assert_eq!(
            evaluation,
            Evaluation {
                score: 6,
                feedback: "Clear answers.".into()
            }
        );
    }

    #[test]
    fn test_prompt_embeds_transcript() {
        let transcript = vec![
            Message::interviewer("Tell me about yourself."),
            Message::candidate("I built a caching layer."),
        ];
        let prompt = build_evaluation_prompt(&transcript);
        assert!(prompt.contains("\"speaker\": \"Candidate\""));
        assert!(prompt.contains("I built a caching layer."));
        assert!(!prompt.contains("{transcript}"));
    }
}
