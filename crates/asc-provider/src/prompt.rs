// SPDX-License-Identifier: MIT OR Apache-2.0
//! Prompt assembly shared by all adapters.

/// Everything an adapter needs to render a prompt for one work unit.
#[derive(Clone, Debug)]
pub struct PromptInputs {
    /// Question text, verbatim.
    pub question_text: String,
    /// Topic title.
    pub topic_title: String,
    /// Persona display name.
    pub persona_name: String,
    /// Persona role.
    pub persona_role: String,
    /// Persona tone of voice.
    pub persona_tone: String,
    /// Prompt template version.
    pub prompt_version: String,
}

const SYSTEM_TEMPLATE: &str = r#"You are a helpful AI engine providing accurate information.

CRITICAL: You MUST respond with ONLY a valid JSON object matching this exact schema:

```json
{
  "answer": "your detailed answer here",
  "citations": ["https://source1.com", "https://source2.com"],
  "meta": {}
}
```

Requirements:
- "answer" is required and must be a string
- "citations" should be an array of URLs (can be empty)
- "meta" can contain additional metadata (optional)
- Do not include any text before or after the JSON
- Ensure valid JSON syntax"#;

/// The schema-enforcing system prompt shared by all providers.
pub fn system_prompt(_prompt_version: &str) -> &'static str {
    // Only v1 exists today; the version is part of the fingerprint so a
    // future v2 can change this text without corrupting idempotency.
    SYSTEM_TEMPLATE
}

/// Render the user turn: question plus persona/topic context.
pub fn render_user_prompt(inputs: &PromptInputs) -> String {
    format!(
        "Question: {question}\n\n\
         Context:\n\
         - Topic: {topic}\n\
         - Persona: {persona} ({role})\n\
         - Tone: {tone}\n\n\
         Provide your answer as a JSON object matching the required schema.",
        question = inputs.question_text,
        topic = inputs.topic_title,
        persona = inputs.persona_name,
        role = inputs.persona_role,
        tone = inputs.persona_tone,
    )
}
