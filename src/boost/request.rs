//! Normalized request handed to the orchestrator by the translation layer.

use serde::{Deserialize, Serialize};

use crate::config::{Tier, TierModels};
use crate::llm::{ChatMessage, Role, ToolDescriptor};

/// Placeholder text when no user message exists
pub const MISSING_USER_REQUEST: &str = "User request not found";

/// One client request, already translated into chat form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoostRequest {
    /// Client-facing model name
    #[serde(default)]
    pub model: String,

    /// Explicit tier; resolved from `model` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,

    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Tool catalog; never mutated
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl BoostRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_user_message(self, text: impl Into<String>) -> Self {
        self.with_message(ChatMessage::user(text.into()))
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Tier for this request, resolving from the model name if not set
    pub fn tier(&self, models: &TierModels) -> Tier {
        self.tier.unwrap_or_else(|| Tier::resolve(&self.model, models))
    }

    /// Text of the last user message, or [`MISSING_USER_REQUEST`]
    pub fn user_request(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.text())
            .unwrap_or_else(|| MISSING_USER_REQUEST.to_string())
    }
}
