// Prompt constants for intake role extraction.
// Reuses the JSON-only fragment from llm_client::prompts.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

/// Feature label recorded in the per-session LLM usage log.
pub const INTAKE_EXTRACTION_FEATURE: &str = "intake_extraction";

/// System prompt for role extraction. Prepended to the shared JSON-only rules.
pub fn role_extraction_system() -> String {
    format!(
        "You are a recruiting intake parser. \
        Extract the distinct roles a hiring manager wants to hire. {JSON_ONLY_SYSTEM}"
    )
}

/// Role extraction prompt template. Replace `{prompt_text}` before sending.
pub const ROLE_EXTRACTION_PROMPT_TEMPLATE: &str = r#"Text:
{prompt_text}

Return a JSON object with this EXACT schema:
{
  "roles": [
    {
      "title": "Full Stack Engineer",
      "seniority": "Intern|Junior|Mid|Senior|Staff|Principal|Lead" or null,
      "function": "Engineering|Data|Design|GTM|Operations" or null,
      "count": 1
    }
  ]
}

Rules:
- Always include "title".
- If the number of openings is not stated, use 1 for "count".
- Titles are short noun phrases naming the role only (e.g. "GenAI Intern"), without
  seniority words that you already put in "seniority".
- Do not invent roles that the text does not ask for."#;
