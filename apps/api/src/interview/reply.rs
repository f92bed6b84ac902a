//! Builds interviewer turns: prompt assembly, the Gemini-backed completion
//! endpoint, and reply shaping with fallback substitution.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::conversation::capabilities::{CompletionEndpoint, TurnRequest};
use crate::errors::AppError;
use crate::interview::policy::{FallbackContext, ReplyPolicy};
use crate::interview::prompts::{INTERVIEWER_SYSTEM, TURN_PROMPT};
use crate::llm_client::{prompts::SPEECH_STYLE_INSTRUCTION, LlmClient, Tuning};
use crate::models::interview::{Message, Sender};

/// Résumé text beyond this many characters is not sent to the model.
pub const MAX_RESUME_CHARS: usize = 12_000;

/// The last `turns` exchanges (two messages each) of a transcript.
pub fn recent_turns(history: &[Message], turns: usize) -> &[Message] {
    let keep = turns.saturating_mul(2);
    &history[history.len().saturating_sub(keep)..]
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn render_history(history: &[Message]) -> String {
    if history.is_empty() {
        return "(no previous messages)".to_string();
    }
    history
        .iter()
        .map(|m| format!("{}: {}", m.sender.label(), m.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replaces `{name}` placeholders in one left-to-right pass, so text that is
/// substituted in is never scanned for placeholders itself. Unknown
/// placeholders are kept as written.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match value {
            Some((close, value)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn build_turn_prompt(request: TurnRequest<'_>) -> String {
    let history = render_history(request.history);
    fill_template(
        TURN_PROMPT,
        &[
            ("speech_style", SPEECH_STYLE_INSTRUCTION),
            (
                "resume_text",
                truncate_chars(request.resume_text.trim(), MAX_RESUME_CHARS),
            ),
            ("history", &history),
            ("utterance", request.utterance.trim()),
        ],
    )
}

/// Gemini-backed completion endpoint.
pub struct InterviewerModel {
    llm: LlmClient,
}

impl InterviewerModel {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CompletionEndpoint for InterviewerModel {
    async fn complete(&self, request: TurnRequest<'_>) -> Result<String, AppError> {
        let prompt = build_turn_prompt(request);
        self.llm
            .call_text(&prompt, INTERVIEWER_SYSTEM, Tuning::Conversational)
            .await
            .map_err(|e| AppError::Llm(e.to_string()))
    }
}

/// The interviewer's next line and whether it is a substitute.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ShapedReply {
    pub text: String,
    pub fallback: bool,
}

/// Asks the completion endpoint for a reply and shapes it. Upstream
/// failures and rejected output are replaced by the policy's fallback, so
/// this never fails; the fallback text may still be empty for a custom
/// policy.
pub async fn next_reply(
    completion: &dyn CompletionEndpoint,
    policy: &dyn ReplyPolicy,
    request: TurnRequest<'_>,
) -> ShapedReply {
    let ctx = FallbackContext {
        utterance: request.utterance,
        candidate_turns: request
            .history
            .iter()
            .filter(|m| m.sender == Sender::Candidate)
            .count()
            + 1,
    };

    match completion.complete(request).await {
        Ok(raw) => match policy.shape(&raw) {
            Ok(text) => {
                debug!("Accepted model reply ({} chars)", text.len());
                ShapedReply {
                    text,
                    fallback: false,
                }
            }
            Err(rejection) => {
                warn!("Model reply rejected ({rejection}), using fallback");
                ShapedReply {
                    text: policy.fallback(&ctx),
                    fallback: true,
                }
            }
        },
        Err(e) => {
            warn!("Completion failed, using fallback: {e}");
            ShapedReply {
                text: policy.fallback(&ctx),
                fallback: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::policy::SingleQuestionPolicy;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String, String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionEndpoint for Scripted {
        async fn complete(&self, request: TurnRequest<'_>) -> Result<String, AppError> {
            self.seen.lock().unwrap().push(build_turn_prompt(request));
            self.reply.clone().map_err(AppError::Llm)
        }
    }

    fn scripted(reply: Result<&str, &str>) -> Scripted {
        Scripted {
            reply: reply.map(str::to_string).map_err(str::to_string),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn request<'a>(utterance: &'a str, history: &'a [Message]) -> TurnRequest<'a> {
        TurnRequest {
            utterance,
            resume_text: "Jane Doe. Senior engineer. Built Redis-backed caches.",
            history,
        }
    }

    #[test]
    fn test_recent_turns_keeps_last_pairs() {
        let history: Vec<Message> = (0..10)
            .map(|i| Message::candidate(format!("m{i}")))
            .collect();
        let kept = recent_turns(&history, 2);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].text, "m6");
        assert_eq!(recent_turns(&history, 0).len(), 0);
        assert_eq!(recent_turns(&history[..3], 6).len(), 3);
    }

    #[test]
    fn test_prompt_includes_resume_history_and_utterance() {
        let history = vec![Message::interviewer("Tell me about yourself.")];
        let prompt = build_turn_prompt(request("I built a caching layer", &history));
        assert!(prompt.contains("Built Redis-backed caches."));
        assert!(prompt.contains("Interviewer: Tell me about yourself."));
        assert!(prompt.contains("\"I built a caching layer\""));
        assert!(prompt.contains("converted to speech"));
        assert!(!prompt.contains("{history}"));
    }

    #[test]
    fn test_placeholders_in_user_text_stay_literal() {
        let history = vec![Message::candidate("My notes say {utterance} and {resume_text}")];
        let req = TurnRequest {
            utterance: "I wrote {history} in a template once",
            resume_text: "Skills: {history}, {speech_style}",
            history: &history,
        };
        let prompt = build_turn_prompt(req);
        assert!(prompt.contains("Skills: {history}, {speech_style}"));
        assert!(prompt.contains("Candidate: My notes say {utterance} and {resume_text}"));
        assert!(prompt.contains("\"I wrote {history} in a template once\""));
        assert_eq!(prompt.matches("converted to speech").count(), 1);
    }

    #[test]
    fn test_fill_template_keeps_unknown_braces() {
        assert_eq!(
            fill_template("{a} {b} {", &[("a", "x{b}")]),
            "x{b} {b} {"
        );
    }

    #[test]
    fn test_resume_is_truncated() {
        let resume = "é".repeat(MAX_RESUME_CHARS + 50);
        let req = TurnRequest {
            utterance: "hi",
            resume_text: &resume,
            history: &[],
        };
        let prompt = build_turn_prompt(req);
        assert_eq!(prompt.matches('é').count(), MAX_RESUME_CHARS);
    }

    #[tokio::test]
    async fn test_accepted_reply_is_shaped() {
        let completion = scripted(Ok("Nice. How did you invalidate the cache? Also, what about TTLs?"));
        let reply = next_reply(
            &completion,
            &SingleQuestionPolicy,
            request("I built a caching layer", &[]),
        )
        .await;
        assert_eq!(
            reply,
            ShapedReply {
                text: "Nice. How did you invalidate the cache?".into(),
                fallback: false
            }
        );
        assert_eq!(completion.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_uses_fallback() {
        let completion = scripted(Err("503 from upstream"));
        let reply = next_reply(
            &completion,
            &SingleQuestionPolicy,
            request("We shipped the project two weeks early", &[]),
        )
        .await;
        assert!(reply.fallback);
        assert!(reply.text.contains("project"));
    }

    #[tokio::test]
    async fn test_refusal_uses_fallback() {
        let completion = scripted(Ok("I'm sorry, I can't respond to that. Could you ask something else?"));
        let reply = next_reply(&completion, &SingleQuestionPolicy, request("ok", &[])).await;
        assert!(reply.fallback);
        assert!(!reply.text.is_empty());
    }
}
