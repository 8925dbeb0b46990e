use std::sync::Arc;

use serde_json::Value;

use crate::error::OrchestratorError;
use crate::llm::IntentLlm;
use crate::synonyms::{first_match, ACTION_SYNONYMS, ENTITY_SYNONYMS};
use crate::types::{IntentAtom, IntentKind, IntentSpec};

/// What the host currently has selected, passed into the parser so it can
/// resolve relative phrases ("format this", "sort it") without the LLM
/// having to guess.
#[derive(Debug, Clone, Default)]
pub struct SelectionInfo {
    pub address: String,
    pub rows: u32,
    pub cols: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub current_selection: Option<SelectionInfo>,
    pub active_sheet: String,
    pub sheet_list: Vec<String>,
    pub recent_turns: Vec<String>,
}

/// Turns a natural-language message into a structured [`IntentSpec`].
/// Never returns an error across its public boundary — any failure to get a
/// usable answer out of the LLM degrades to a low-confidence `Clarify`
/// intent instead, since the orchestrator always needs *something* to act
/// on or report back to the user.
pub struct IntentParser {
    llm: Arc<dyn IntentLlm>,
}

impl IntentParser {
    pub fn new(llm: Arc<dyn IntentLlm>) -> Self {
        Self { llm }
    }

    pub async fn parse(&self, message: &str, context: &ParseContext) -> IntentSpec {
        let system_prompt = Self::build_system_prompt();
        let user_prompt = Self::build_user_prompt(message, context);

        let raw = match self.llm.generate_json(&system_prompt, &user_prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "intent LLM call failed, falling back to clarify");
                return Self::fallback_clarify(message, context, &format!("LLM call failed: {e}"));
            }
        };

        let value = match Self::parse_llm_output(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "could not extract JSON from LLM output");
                return Self::fallback_clarify(message, context, &e.to_string());
            }
        };

        let mut spec: IntentSpec = match serde_json::from_value(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "LLM JSON did not match IntentSpec shape");
                return Self::fallback_clarify(message, context, &format!("malformed intent spec: {e}"));
            }
        };

        spec.semantic_atoms = Self::extract_semantic_atoms(message);
        spec
    }

    fn fallback_clarify(message: &str, context: &ParseContext, reason: &str) -> IntentSpec {
        IntentSpec {
            intent: IntentKind::Clarify,
            confidence: 0.0,
            needs_clarification: true,
            clarification_question: Some(
                "I couldn't understand that request — could you rephrase it?".to_string(),
            ),
            clarification_options: None,
            spec: Value::Object(Default::default()),
            reasoning: Some(reason.to_string()),
            compressed_intent: None,
            semantic_atoms: Self::extract_semantic_atoms_with_context(message, context),
        }
    }

    fn build_system_prompt() -> String {
        let kinds = IntentKind::all().iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ");
        format!(
            "You are the intent-classification layer of a spreadsheet assistant. \
             Given a user's message, respond with a single JSON object describing \
             what they want. The `intent` field must be exactly one of: {kinds}. \
             If the request is ambiguous, set `needs_clarification` to true and \
             supply a `clarification_question`. Respond with JSON only, no prose, \
             no markdown code fences.\n\n\
             Output shape:\n\
             {{\"intent\": string, \"confidence\": number, \"needs_clarification\": bool, \
             \"clarification_question\": string|null, \"clarification_options\": string[]|null, \
             \"spec\": object, \"reasoning\": string|null, \"compressed_intent\": string|null}}"
        )
    }

    fn build_user_prompt(message: &str, context: &ParseContext) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!("Active sheet: {}\n", context.active_sheet));
        if !context.sheet_list.is_empty() {
            prompt.push_str(&format!("Sheets: {}\n", context.sheet_list.join(", ")));
        }
        if let Some(sel) = &context.current_selection {
            prompt.push_str(&format!(
                "Current selection: {} ({}x{})\n",
                sel.address, sel.rows, sel.cols
            ));
        }
        if !context.recent_turns.is_empty() {
            prompt.push_str("Recent conversation:\n");
            for turn in context.recent_turns.iter().rev().take(4).rev() {
                let truncated: String = turn.chars().take(100).collect();
                prompt.push_str(&format!("- {truncated}\n"));
            }
        }
        prompt.push_str(&format!("\nUser message: {message}"));
        prompt
    }

    /// Extracts a JSON object from possibly-messy LLM text: a direct
    /// top-level parse, then stripping Markdown code fences, then a
    /// balanced-brace scan with light tidying (trailing commas, smart
    /// quotes) as a last resort.
    pub fn parse_llm_output(text: &str) -> Result<Value, OrchestratorError> {
        let trimmed = text.trim();

        if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
            return Ok(v);
        }

        let unfenced = strip_code_fences(trimmed);
        if let Ok(v) = serde_json::from_str::<Value>(unfenced.trim()) {
            return Ok(v);
        }

        if let Some(candidate) = extract_balanced_object(unfenced.trim()) {
            let tidied = tidy_json(&candidate);
            if let Ok(v) = serde_json::from_str::<Value>(&tidied) {
                return Ok(v);
            }
        }

        Err(OrchestratorError::ParseJsonFailure(text.to_string()))
    }

    /// Scans `message` for action/entity synonyms, independent of whatever
    /// the LLM returned — used by Tool Discovery even when the LLM's
    /// `intent` guess is unreliable.
    pub fn extract_semantic_atoms(message: &str) -> Vec<IntentAtom> {
        Self::extract_semantic_atoms_with_context(message, &ParseContext::default())
    }

    fn extract_semantic_atoms_with_context(message: &str, _context: &ParseContext) -> Vec<IntentAtom> {
        let action = first_match(message, &ACTION_SYNONYMS);
        let entity = first_match(message, &ENTITY_SYNONYMS);
        if action.is_none() && entity.is_none() {
            return Vec::new();
        }
        vec![IntentAtom {
            action: action.map(|s| s.to_string()),
            entity: entity.map(|s| s.to_string()),
            modifiers: Vec::new(),
            domain: None,
            raw_text: Some(message.to_string()),
        }]
    }
}

fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        rest.trim().strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = text.strip_prefix("```") {
        rest.trim().strip_suffix("```").unwrap_or(rest).trim()
    } else {
        text
    }
}

/// Finds the first balanced `{...}` span in `text`, tolerating leading
/// prose like `"Here's the JSON: {...}"`.
fn extract_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Light repair pass for near-miss JSON: drops trailing commas before a
/// closing brace/bracket. Deliberately conservative — it does not attempt
/// to fix unbalanced quotes or unquoted keys, since guessing wrong there
/// produces worse garbage than failing outright.
fn tidy_json(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len());
    let bytes: Vec<char> = candidate.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == ',' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_whitespace() {
                j += 1;
            }
            if j < bytes.len() && (bytes[j] == '}' || bytes[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_json() {
        let v = IntentParser::parse_llm_output(r#"{"intent":"clarify"}"#).unwrap();
        assert_eq!(v["intent"], "clarify");
    }

    #[test]
    fn strips_markdown_fences() {
        let text = "```json\n{\"intent\":\"write_data\"}\n```";
        let v = IntentParser::parse_llm_output(text).unwrap();
        assert_eq!(v["intent"], "write_data");
    }

    #[test]
    fn extracts_balanced_object_with_leading_prose() {
        let text = "Sure, here's the JSON:\n{\"intent\":\"create_table\",\"confidence\":0.9}\nLet me know!";
        let v = IntentParser::parse_llm_output(text).unwrap();
        assert_eq!(v["intent"], "create_table");
    }

    #[test]
    fn tidies_trailing_commas() {
        let text = "{\"intent\":\"sort_data\",\"spec\":{\"a\":1,},}";
        let v = IntentParser::parse_llm_output(text).unwrap();
        assert_eq!(v["intent"], "sort_data");
    }

    #[test]
    fn fails_cleanly_on_unusable_text() {
        assert!(IntentParser::parse_llm_output("not json at all").is_err());
    }

    #[test]
    fn extracts_action_and_entity_atoms() {
        let atoms = IntentParser::extract_semantic_atoms("please create a new table here");
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].action.as_deref(), Some("create"));
        assert_eq!(atoms[0].entity.as_deref(), Some("table"));
    }
}
