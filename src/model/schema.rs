//! Response schema, system instructions and refinement payload text

use serde_json::{json, Value};

use crate::{RoundRecord, Snippet};

pub const GENERATION_SYSTEM_PROMPT: &str = "You are an expert frontend developer. Your task is to generate clean, modern, and responsive HTML, CSS, and JavaScript code based on user requests.
- Create visually appealing and user-friendly components.
- Ensure the code is responsive and works well on different screen sizes.
- Use placeholder content where appropriate (e.g., for images, text).
- Return ONLY a single valid JSON object matching the provided schema. Do not include any other text, explanations, or markdown formatting like ```json outside of the JSON object.";

pub const REFINEMENT_SYSTEM_PROMPT: &str = "You are an expert UI/UX designer and frontend developer. Your task is to analyze the provided code AND a screenshot of its rendered output.
- You will be given the current code, a screenshot of the component, and a history of previous improvements.
- Identify a SINGLE, impactful flaw (e.g., alignment, spacing, color contrast, responsiveness, accessibility, layout).
- Explain the flaw you identified and your proposed fix in the 'explanation' field. Be concise and clear.
- Provide the COMPLETE, updated code (HTML, CSS, and JS) with the fix applied. Do not provide only the changed parts.
- Use the history of previous improvements to avoid repeating suggestions and to build upon prior fixes.
- Return ONLY a single valid JSON object matching the provided schema. Do not include any other text, explanations, or markdown formatting like ```json outside of the JSON object.";

/// Closing instruction of every refinement request.
pub const REFINEMENT_INSTRUCTION: &str =
    "Analyze the code and the screenshot, identify a flaw, and provide the improved code.";

/// Stands in for the history when no round has completed yet.
pub const NO_HISTORY: &str = "None";

pub const SCREENSHOT_MIME: &str = "image/jpeg";

/// Structured-output schema shared by generation and refinement.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "html": {
                "type": "STRING",
                "description": "The complete HTML code for the component. It should be clean, semantic, and well-structured. Do not include `<html>` or `<body>` tags."
            },
            "css": {
                "type": "STRING",
                "description": "The complete CSS code for the component. It should be modern, responsive, and follow best practices. Do not include `<style>` tags."
            },
            "js": {
                "type": "STRING",
                "description": "The complete JavaScript code for the component. It should handle any interactivity. Do not include `<script>` tags. If no JS is needed, return an empty string or a comment explaining why."
            },
            "explanation": {
                "type": "STRING",
                "description": "A brief, friendly explanation of the generated code and how it works. This will be shown to the user in the chat."
            }
        },
        "required": ["html", "css", "js", "explanation"]
    })
}

/// "Current Code" section: the snippet as pretty JSON in a fenced block.
pub fn current_code_text(snippet: &Snippet) -> String {
    // Snippet holds only strings, serialization cannot fail
    let pretty = serde_json::to_string_pretty(snippet).unwrap_or_default();
    format!("Current Code:\n```json\n{}\n```", pretty)
}

/// "History of previous improvements" section, one numbered line per round.
pub fn history_text(history: &[RoundRecord]) -> String {
    let lines = history
        .iter()
        .enumerate()
        .map(|(i, round)| format!("Improvement {}: {}", i + 1, round.explanation))
        .collect::<Vec<_>>()
        .join("\n");
    let body = if lines.is_empty() { NO_HISTORY } else { lines.as_str() };
    format!("History of previous improvements:\n{}", body)
}
