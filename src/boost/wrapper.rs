//! Wrapper builder: renders the planning prompt.
//!
//! The planning model never sees a tool schema. Tools are described in
//! text, alongside the user request and the history of rejected attempts.

use serde_json::Value;

use crate::boost::request::BoostRequest;
use crate::boost::state::{LoopAttempt, LoopState};
use crate::error::{BoostError, Result};
use crate::llm::ToolDescriptor;

pub const LOOP_COUNT: &str = "{loop_count}";
pub const PREVIOUS_ATTEMPTS: &str = "{previous_attempts}";
pub const USER_REQUEST: &str = "{user_request}";
pub const TOOLS_TEXT: &str = "{tools_text}";

/// Every placeholder a template must contain
pub const PLACEHOLDERS: [&str; 4] = [LOOP_COUNT, PREVIOUS_ATTEMPTS, USER_REQUEST, TOOLS_TEXT];

/// Characters of an attempt's raw text shown in later prompts
pub const ATTEMPT_PREVIEW_CHARS: usize = 200;

pub const NO_TOOLS: &str = "No tools available";
pub const NO_ATTEMPTS: &str = "None";

/// Built-in template stating the three-format contract
pub const DEFAULT_TEMPLATE: &str = "You are a boost model assisting an auxiliary model. Your response MUST follow ONE of these three formats:

FORMAT 1 - FINAL RESPONSE (when no tools needed):
SUMMARY:
[Provide the final answer directly without using auxiliary models]

FORMAT 2 - GUIDANCE FOR AUXILIARY MODEL (when tools needed):
ANALYSIS:
[Reasoning and understanding of the request context (trace the context, uncertainties, and potential solution paths sequentially, refining thoughts while keeping continuity)]

GUIDANCE:
[Instructions for the auxiliary model's tasks (include which tools to call and what operations to perform, and the content of the operations should be detailed)]

FORMAT 3 - OTHER (any other response will trigger a loop retry):
[Any response that doesn't match FORMAT 1 or 2]

---
Current ReAct Loop: {loop_count}
Previous Attempts: {previous_attempts}

User Request: {user_request}

Available Tools:
{tools_text}";

/// A validated wrapper template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperTemplate {
    template: String,
}

impl Default for WrapperTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

impl WrapperTemplate {
    pub fn builtin() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Custom template; must contain every placeholder.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let missing: Vec<&str> = PLACEHOLDERS
            .iter()
            .copied()
            .filter(|p| !template.contains(p))
            .collect();
        if !missing.is_empty() {
            return Err(BoostError::InvalidTemplate(format!("missing {}", missing.join(", "))));
        }
        Ok(Self { template })
    }

    /// Template from configuration; absent or blank selects the built-in one.
    pub fn from_config(template: Option<&str>) -> Result<Self> {
        match template {
            Some(t) if !t.trim().is_empty() => Self::new(t),
            _ => Ok(Self::builtin()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Render the planning prompt for the current loop state.
    pub fn render(&self, state: &LoopState, request: &BoostRequest) -> String {
        self.substitute(
            &state.iteration().to_string(),
            &render_attempts(state.attempts()),
            &request.user_request(),
            &render_tools(&request.tools),
        )
    }

    /// Single-pass substitution; inserted values are never re-scanned.
    pub fn substitute(&self, loop_count: &str, previous_attempts: &str, user_request: &str, tools_text: &str) -> String {
        let values = [loop_count, previous_attempts, user_request, tools_text];
        let mut out = String::with_capacity(self.template.len() + values.iter().map(|v| v.len()).sum::<usize>());
        let mut rest = self.template.as_str();

        while let Some((pos, idx)) = PLACEHOLDERS
            .iter()
            .enumerate()
            .filter_map(|(i, p)| rest.find(p).map(|pos| (pos, i)))
            .min()
        {
            out.push_str(&rest[..pos]);
            out.push_str(values[idx]);
            rest = &rest[pos + PLACEHOLDERS[idx].len()..];
        }
        out.push_str(rest);
        out
    }
}

/// First `max` characters of `text`, with `...` when cut.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// One line per rejected attempt, or `None`.
pub fn render_attempts(attempts: &[LoopAttempt]) -> String {
    if attempts.is_empty() {
        return NO_ATTEMPTS.to_string();
    }
    attempts
        .iter()
        .map(|a| {
            format!(
                "- Attempt {} [{}]: {}. Response: {}",
                a.iteration + 1,
                a.kind,
                a.reason,
                preview(a.raw_text.trim(), ATTEMPT_PREVIEW_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_parameter(name: &str, info: &Value, required: &[&str]) -> String {
    let kind = info.get("type").and_then(Value::as_str).unwrap_or("string");
    let description = info.get("description").and_then(Value::as_str).unwrap_or("");
    let marker = if required.contains(&name) { "required" } else { "optional" };
    format!("- {}: {} ({}) - {}", name, kind, marker, description)
}

fn render_tool(tool: &ToolDescriptor) -> String {
    let description = if tool.description.trim().is_empty() {
        "No description"
    } else {
        tool.description.trim()
    };

    let properties = tool
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
        .filter(|p| !p.is_empty());

    let Some(properties) = properties else {
        return format!("- {}: {}", tool.name, description);
    };

    let required: Vec<&str> = tool
        .input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let params: Vec<String> = properties
        .iter()
        .map(|(name, info)| render_parameter(name, info, &required))
        .collect();

    format!("- {}: {}. Parameters: {}", tool.name, description, params.join(", "))
}

/// Text rendering of the tool catalog.
pub fn render_tools(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return NO_TOOLS.to_string();
    }
    tools.iter().map(render_tool).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boost::sections::ResponseKind;
    use crate::boost::state::REASON_NO_SECTION;
    use serde_json::json;

    fn read_file_tool() -> ToolDescriptor {
        ToolDescriptor::new(
            "read_file",
            "Read a file",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"},
                    "limit": {"type": "integer"}
                },
                "required": ["path"]
            }),
        )
    }

    #[test]
    fn test_builtin_template_is_valid() {
        assert!(WrapperTemplate::new(DEFAULT_TEMPLATE).is_ok());
        assert_eq!(WrapperTemplate::default().as_str(), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        let err = WrapperTemplate::new("{loop_count} {user_request}").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("{previous_attempts}"));
        assert!(message.contains("{tools_text}"));
    }

    #[test]
    fn test_blank_config_uses_builtin() {
        assert_eq!(WrapperTemplate::from_config(Some("  \n")).unwrap(), WrapperTemplate::builtin());
        assert_eq!(WrapperTemplate::from_config(None).unwrap(), WrapperTemplate::builtin());
    }

    #[test]
    fn test_loop_count_position() {
        let template = WrapperTemplate::new("L={loop_count}|{previous_attempts}|{user_request}|{tools_text}").unwrap();
        assert_eq!(template.substitute("2", "None", "hi", "No tools available"), "L=2|None|hi|No tools available");
    }

    #[test]
    fn test_single_pass_substitution() {
        let template = WrapperTemplate::new("{user_request}/{tools_text}/{loop_count}/{previous_attempts}").unwrap();
        let out = template.substitute("0", "None", "echo {tools_text} {loop_count}", "T");
        assert_eq!(out, "echo {tools_text} {loop_count}/T/0/None");
    }

    #[test]
    fn test_render_uses_state_and_request() {
        let request = BoostRequest::new("m")
            .with_user_message("What is in main.rs?")
            .with_tools(vec![read_file_tool()]);
        let state = LoopState::new(3)
            .record(LoopAttempt::new(0, "hmm", ResponseKind::Other, REASON_NO_SECTION))
            .record(LoopAttempt::new(1, "hmm again", ResponseKind::Other, REASON_NO_SECTION));

        let prompt = WrapperTemplate::builtin().render(&state, &request);
        assert!(prompt.contains("Current ReAct Loop: 2\n"));
        assert!(prompt.contains("User Request: What is in main.rs?"));
        assert!(prompt.contains("- Attempt 1 [OTHER]: no SUMMARY or GUIDANCE section. Response: hmm"));
        assert!(prompt.contains("- read_file: Read a file. Parameters:"));
        assert_eq!(prompt, WrapperTemplate::builtin().render(&state, &request));
    }

    #[test]
    fn test_render_tools() {
        let text = render_tools(&[read_file_tool()]);
        assert_eq!(
            text,
            "- read_file: Read a file. Parameters: - limit: integer (optional) - , - path: string (required) - File path"
        );
    }

    #[test]
    fn test_render_tool_without_properties() {
        let tool = ToolDescriptor::new("now", "Current time", json!({"type": "object"}));
        assert_eq!(render_tools(&[tool]), "- now: Current time");
    }

    #[test]
    fn test_render_no_tools() {
        assert_eq!(render_tools(&[]), NO_TOOLS);
    }

    #[test]
    fn test_render_attempts_empty() {
        assert_eq!(render_attempts(&[]), "None");
    }

    #[test]
    fn test_attempt_preview_truncated() {
        let long = "x".repeat(250);
        let line = render_attempts(&[LoopAttempt::new(0, long, ResponseKind::Other, REASON_NO_SECTION)]);
        assert!(line.ends_with(&format!("{}...", "x".repeat(200))));
    }

    #[test]
    fn test_preview_multibyte() {
        assert_eq!(preview("ééé", 2), "éé...");
        assert_eq!(preview("ab", 2), "ab");
    }
}
