/// Persona for transcript scoring; combined with the JSON-only instruction.
pub const EVALUATION_PERSONA: &str = "You are an expert hiring manager and an interview \
    evaluation specialist. You analyze interview transcripts and give a score with \
    constructive feedback.";

/// Evaluation prompt template. Replace `{transcript}` before sending.
pub const EVALUATION_PROMPT: &str = r#"Analyze the interview transcript below and score the candidate.

EVALUATION CRITERIA:
1. Clarity and conciseness: was the candidate's communication clear and to the point?
2. Relevance: were the answers relevant to the questions asked?
3. STAR method (behavioral questions): did the candidate structure answers about past experiences as Situation, Task, Action, Result?
4. Confidence and professionalism: the overall tone and professionalism of the candidate's language.

OUTPUT FORMAT:
{
  "score": <an integer between 1 and 10>,
  "feedback": "<3-4 sentences of constructive feedback highlighting strengths and areas for improvement. Encouraging but honest.>"
}

EXAMPLE OUTPUT:
{
  "score": 7,
  "feedback": "You demonstrate strong passion for the field and communicate your ideas clearly. To improve, structure your answers to behavioral questions with the STAR method to give concrete evidence of your accomplishments. Also consider elaborating on the specific technical challenges you faced in your projects."
}

TRANSCRIPT (JSON):
{transcript}"#;
