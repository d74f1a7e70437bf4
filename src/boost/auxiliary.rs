//! Auxiliary request builder: the executor request with the real tool schema.

use crate::boost::request::BoostRequest;
use crate::llm::{ChatMessage, ChatRequest, Role};

/// Analysis and guidance lifted from a planning reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanGuidance {
    pub analysis: Option<String>,
    pub guidance: String,
}

impl PlanGuidance {
    pub fn new(analysis: Option<String>, guidance: impl Into<String>) -> Self {
        Self {
            analysis,
            guidance: guidance.into(),
        }
    }
}

/// System message that hands the planner's guidance to the executor.
pub fn guidance_system_message(plan: &PlanGuidance) -> String {
    let mut text = String::from(
        "You are an AI assistant helping with a user request. \
         The boost model has provided the following analysis and guidance:\n\n",
    );
    if let Some(analysis) = plan.analysis.as_deref() {
        text.push_str("ANALYSIS:\n");
        text.push_str(analysis);
        text.push_str("\n\n");
    }
    text.push_str("GUIDANCE:\n");
    text.push_str(&plan.guidance);
    text.push_str(
        "\n\nPlease follow the guidance to complete the user's request. \
         Use the available tools as instructed.",
    );
    text
}

/// Build the executor request.
///
/// With guidance, the request's own system messages are replaced by one
/// carrying the plan. Without guidance (direct execution) the messages are
/// passed through unchanged. Tools, stream, max_tokens and temperature
/// always come from the original request.
pub fn build_auxiliary_request(request: &BoostRequest, executor_model: &str, plan: Option<&PlanGuidance>) -> ChatRequest {
    let messages = match plan {
        Some(plan) => std::iter::once(ChatMessage::system(guidance_system_message(plan)))
            .chain(request.messages.iter().filter(|m| m.role != Role::System).cloned())
            .collect(),
        None => request.messages.clone(),
    };

    log::debug!(
        "Built auxiliary request for {} with {} tools (guided: {})",
        executor_model,
        request.tools.len(),
        plan.is_some()
    );

    ChatRequest {
        model: executor_model.to_string(),
        messages,
        tools: request.tools.clone(),
        tool_choice: (!request.tools.is_empty()).then(|| "auto".to_string()),
        stream: request.stream,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDescriptor;
    use serde_json::json;

    fn request() -> BoostRequest {
        let mut request = BoostRequest::new("claude-opus-4")
            .with_message(ChatMessage::system("You are Claude"))
            .with_user_message("list files")
            .with_message(ChatMessage::assistant("ok"))
            .with_tools(vec![ToolDescriptor::new("ls", "List files", json!({"type": "object"}))])
            .with_stream(true);
        request.max_tokens = Some(1024);
        request.temperature = Some(0.2);
        request
    }

    #[test]
    fn test_guided_request() {
        let plan = PlanGuidance::new(Some("Need a listing".to_string()), "Call ls on .");
        let aux = build_auxiliary_request(&request(), "gpt-4o", Some(&plan));

        assert_eq!(aux.model, "gpt-4o");
        assert_eq!(aux.messages.len(), 3);
        assert_eq!(aux.messages[0].role, Role::System);
        let system = aux.messages[0].content.text();
        assert!(system.contains("ANALYSIS:\nNeed a listing\n\nGUIDANCE:\nCall ls on ."));
        assert_eq!(aux.messages[1].content.text(), "list files");
        assert_eq!(aux.messages[2].role, Role::Assistant);

        assert_eq!(aux.tools.len(), 1);
        assert_eq!(aux.tool_choice.as_deref(), Some("auto"));
        assert!(aux.stream);
        assert_eq!(aux.max_tokens, Some(1024));
        assert_eq!(aux.temperature, Some(0.2));
    }

    #[test]
    fn test_guidance_without_analysis() {
        let plan = PlanGuidance::new(None, "Call ls");
        let text = guidance_system_message(&plan);
        assert!(!text.contains("ANALYSIS:"));
        assert!(text.contains("GUIDANCE:\nCall ls\n\nPlease follow the guidance"));
    }

    #[test]
    fn test_direct_request_keeps_messages() {
        let original = request();
        let aux = build_auxiliary_request(&original, "gpt-4o-mini", None);
        assert_eq!(aux.messages, original.messages);
        assert_eq!(aux.tools, original.tools);
        assert_eq!(aux.tool_choice.as_deref(), Some("auto"));
    }

    #[test]
    fn test_no_tools_no_tool_choice() {
        let original = BoostRequest::new("m").with_user_message("hi");
        let aux = build_auxiliary_request(&original, "gpt-4o", None);
        assert!(aux.tools.is_empty());
        assert_eq!(aux.tool_choice, None);
    }
}
