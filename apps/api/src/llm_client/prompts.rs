// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every prompt whose output is read aloud by speech synthesis.
pub const SPEECH_STYLE_INSTRUCTION: &str = "\
    Your reply is converted to speech. Keep sentences short and clear. \
    Never use emojis, markdown, bullet points, numbered lists or any other non-spoken characters. \
    Avoid slang; stay professional but conversational. \
    Open naturally, e.g. \"Thank you for sharing that.\" or \"Alright, let's shift gears a bit.\"";
