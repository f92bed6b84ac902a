//! Reply shaping for spoken interviewer turns.
//!
//! Model output is not guaranteed to be a single question: it may carry
//! chat-template tokens, speaker prefixes, markdown, numbered lists of
//! questions or an outright refusal. A [`ReplyPolicy`] turns raw output into
//! exactly one speakable question, or rejects it so the caller can substitute
//! [`ReplyPolicy::fallback`].

use crate::conversation::segment::segments;

/// Minimum length, in characters, of an accepted reply.
pub const MIN_REPLY_CHARS: usize = 15;

const ROLE_TOKENS: &[&str] = &["[INST]", "[/INST]", "<s>", "</s>"];
const SPEAKER_PREFIXES: &[&str] = &["interviewer:", "assistant:", "ai:", "model:"];

const HEDGING_DENYLIST: &[&str] = &[
    "i'm sorry",
    "as an ai",
    "language model",
    "i cannot",
    "i can't",
    "i am unable",
    "i'm unable",
    "i apologize",
    "unable to assist",
    "can't help with",
];

const TOPIC_FALLBACKS: &[(&str, &str)] = &[
    (
        "project",
        "That sounds like an interesting project. What was the most difficult technical decision you made on it?",
    ),
    (
        "team",
        "How did you coordinate with your team, and how did you handle disagreements along the way?",
    ),
    (
        "challenge",
        "How did you approach that challenge, and what would you do differently today?",
    ),
    (
        "learn",
        "How have you applied what you learned there in your later work?",
    ),
    (
        "lead",
        "What did leading that effort teach you about working with people?",
    ),
];

const SHORT_ANSWER_FALLBACK: &str =
    "Could you expand on that a little, perhaps with a specific example?";
const SHORT_ANSWER_WORDS: usize = 4;

const GENERIC_FALLBACKS: &[&str] = &[
    "Thank you for sharing that. Can you walk me through a recent project you are proud of?",
    "Tell me about a time you had to learn something new quickly. How did you approach it?",
    "Describe a situation where you disagreed with a teammate. How did you resolve it?",
    "What is one technical decision you made that you would make differently today?",
];

/// Why a raw reply was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("reply is empty")]
    Empty,
    #[error("reply is too short")]
    TooShort,
    #[error("reply matches hedging phrase '{0}'")]
    Hedging(&'static str),
    #[error("reply contains no question")]
    NoQuestion,
}

/// What the fallback is keyed on.
#[derive(Debug, Clone, Copy)]
pub struct FallbackContext<'a> {
    pub utterance: &'a str,
    /// Candidate messages in the transcript so far, the current one included.
    pub candidate_turns: usize,
}

/// Shapes model output into the next spoken interviewer turn.
///
/// Carried in `AppState` as `Arc<dyn ReplyPolicy>`.
pub trait ReplyPolicy: Send + Sync {
    fn shape(&self, raw: &str) -> Result<String, Rejection>;
    fn fallback(&self, ctx: &FallbackContext<'_>) -> String;
}

/// Keeps one question plus a short lead-in.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleQuestionPolicy;

impl ReplyPolicy for SingleQuestionPolicy {
    fn shape(&self, raw: &str) -> Result<String, Rejection> {
        let stripped = strip_role_tokens(raw);
        let units = sentence_units(&stripped);
        let reply = select_question(&units)?;

        if reply.is_empty() {
            return Err(Rejection::Empty);
        }
        if reply.chars().count() < MIN_REPLY_CHARS {
            return Err(Rejection::TooShort);
        }
        let lowered = reply.to_lowercase().replace('\u{2019}', "'");
        if let Some(phrase) = HEDGING_DENYLIST.iter().find(|p| lowered.contains(*p)) {
            return Err(Rejection::Hedging(*phrase));
        }
        Ok(reply)
    }

    fn fallback(&self, ctx: &FallbackContext<'_>) -> String {
        let words: Vec<String> = ctx
            .utterance
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        for (topic, reply) in TOPIC_FALLBACKS {
            if words.iter().any(|w| w.starts_with(topic)) {
                return reply.to_string();
            }
        }
        if words.len() < SHORT_ANSWER_WORDS {
            return SHORT_ANSWER_FALLBACK.to_string();
        }
        GENERIC_FALLBACKS[ctx.candidate_turns % GENERIC_FALLBACKS.len()].to_string()
    }
}

#[derive(Debug)]
struct Unit {
    text: String,
    listed: bool,
}

fn strip_role_tokens(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<|") {
        out.push_str(&rest[..start]);
        match rest[start..].find("|>") {
            Some(end) => rest = &rest[start + end + 2..],
            None => {
                rest = &rest[start + 2..];
            }
        }
    }
    out.push_str(rest);
    ROLE_TOKENS
        .iter()
        .fold(out, |acc, token| acc.replace(token, " "))
}

fn strip_speaker_prefix(line: &str) -> &str {
    let line = line.trim_start();
    for prefix in SPEAKER_PREFIXES {
        if let Some(head) = line.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) {
                return line[prefix.len()..].trim_start();
            }
        }
    }
    line
}

/// Returns the line without its bullet marker, and whether one was present.
fn strip_bullet(line: &str) -> (&str, bool) {
    for bullet in ["- ", "* ", "+ ", "\u{2022} "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return (rest, true);
        }
    }
    (line, false)
}

/// Byte length of a `1.` / `1)` marker at the start of `text`, including
/// the whitespace after it. The marker must be followed by whitespace or end
/// the text, so `3.5` is not one.
fn numbered_marker_len(text: &str) -> Option<usize> {
    let digits = text.chars().take_while(char::is_ascii_digit).count();
    if !(1..=3).contains(&digits) {
        return None;
    }
    let rest = &text[digits..];
    let mut chars = rest.chars();
    if !matches!(chars.next(), Some('.') | Some(')')) {
        return None;
    }
    let after = &rest[1..];
    match after.chars().next() {
        None => Some(text.len()),
        Some(c) if c.is_whitespace() => Some(text.len() - after.trim_start().len()),
        Some(_) => None,
    }
}

/// Splits a sentence at numbered list markers. A marker counts at the start
/// of the sentence or right after a colon, as in `Two things: 1) ... 2) ...`.
/// Pieces after a marker are flagged as list items; pieces may be empty when
/// a marker ends the sentence.
fn split_numbered_items(sentence: &str) -> Vec<(&str, bool)> {
    let mut markers: Vec<(usize, usize)> = Vec::new();
    let mut prev: Option<char> = None;
    for (i, c) in sentence.char_indices() {
        let boundary = match prev {
            None => true,
            Some(p) => p.is_whitespace() && sentence[..i].trim_end().ends_with(':'),
        };
        if boundary && c.is_ascii_digit() {
            if let Some(len) = numbered_marker_len(&sentence[i..]) {
                markers.push((i, i + len));
            }
        }
        prev = Some(c);
    }

    let mut pieces = Vec::with_capacity(markers.len() + 1);
    let head_end = markers.first().map_or(sentence.len(), |&(start, _)| start);
    pieces.push((&sentence[..head_end], false));
    for (n, &(_, body_start)) in markers.iter().enumerate() {
        let body_end = markers.get(n + 1).map_or(sentence.len(), |&(start, _)| start);
        pieces.push((&sentence[body_start..body_end], true));
    }
    pieces
}

fn strip_markdown(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '#' | '_' | '`'))
        .collect()
}

fn sentence_units(text: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    // A marker that ended its sentence (`1.` before `What ...?`) flags the next unit.
    let mut marker_pending = false;
    for line in text.lines() {
        let line = strip_speaker_prefix(line);
        let (line, bulleted) = strip_bullet(line);
        let line = strip_markdown(line);
        let line = strip_speaker_prefix(&line);
        for sentence in segments(line) {
            for (piece, numbered) in split_numbered_items(sentence) {
                let text = piece.split_whitespace().collect::<Vec<_>>().join(" ");
                if text.is_empty() {
                    marker_pending |= numbered;
                    continue;
                }
                units.push(Unit {
                    text,
                    listed: bulleted || numbered || marker_pending,
                });
                marker_pending = false;
            }
        }
    }
    units
}

fn ends_with_terminator(text: &str) -> bool {
    text.ends_with(|c: char| matches!(c, '.' | '!' | '?'))
}

fn select_question(units: &[Unit]) -> Result<String, Rejection> {
    let Some(first) = units.first() else {
        return Err(Rejection::Empty);
    };

    let Some(q) = units.iter().position(|u| u.text.ends_with('?')) else {
        // A list intro or a bare list item is not something to ask.
        if first.listed || first.text.ends_with(':') {
            return Err(Rejection::NoQuestion);
        }
        let mut reply = first.text.clone();
        if !ends_with_terminator(&reply) {
            reply.push('?');
        }
        return Ok(reply);
    };

    let mut parts: Vec<String> = Vec::with_capacity(3);
    if !units[q].listed {
        for unit in units[..q].iter().rev() {
            if unit.listed || parts.len() == 2 {
                break;
            }
            let mut lead = unit.text.clone();
            if !ends_with_terminator(&lead) && !lead.ends_with(':') {
                lead.push('.');
            }
            parts.push(lead);
        }
        parts.reverse();
    }
    parts.push(units[q].text.clone());
    Ok(parts.join(" "))
}
