pub mod encoder;

use serde::Serialize;

/// Outbound Responses API request. Always streamed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsesRequest {
    /// Backend deployment name, not the inbound model alias.
    pub model: String,
    pub stream: bool,
    pub input: Vec<ResponsesInputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ResponsesTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_cache_key: Option<String>,
    pub reasoning: ResponsesReasoning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResponsesReasoning {
    pub effort: ReasoningEffort,
}

/// Reasoning effort, selected by the inbound `gpt-{effort}` model alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    High,
    Medium,
    Low,
    Minimal,
}

impl ReasoningEffort {
    pub const ALL: [ReasoningEffort; 4] = [Self::High, Self::Medium, Self::Low, Self::Minimal];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Minimal => "minimal",
        }
    }

    /// Exact, already-normalized lookup.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|effort| effort.as_str() == name)
    }

    /// The public model alias for this effort, e.g. `gpt-high`.
    #[must_use]
    pub fn model_alias(self) -> String {
        format!("gpt-{}", self.as_str())
    }
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of the `input` array. Messages carry no `type` tag on the
/// wire, function-call items do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsesInputItem {
    Message {
        role: String,
        content: Vec<ResponsesContentPart>,
    },
    Call(ResponsesCallItem),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ResponsesCallItem {
    #[serde(rename = "function_call")]
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "function_call_output")]
    FunctionCallOutput {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        /// A string, or structured JSON passed through unchanged.
        output: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ResponsesContentPart {
    #[serde(rename = "input_text")]
    InputText { text: String },
    #[serde(rename = "output_text")]
    OutputText { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ResponsesTool {
    #[serde(rename = "function")]
    Function {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        parameters: Option<serde_json::Value>,
        strict: bool,
    },
}

/// Backend stream event types the gateway reacts to. Anything else is
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsesEventKind {
    OutputItemAdded,
    ReasoningSummaryTextDelta,
    OutputTextDelta,
    FunctionCallArgumentsDelta,
    Completed,
}

impl ResponsesEventKind {
    const NAMES: [(&'static str, ResponsesEventKind); 7] = [
        ("response.output_item.added", Self::OutputItemAdded),
        (
            "response.reasoning_summary_text.delta",
            Self::ReasoningSummaryTextDelta,
        ),
        (
            "response.reasoning.summary_text.delta",
            Self::ReasoningSummaryTextDelta,
        ),
        ("response.output_text.delta", Self::OutputTextDelta),
        (
            "response.function_call_arguments.delta",
            Self::FunctionCallArgumentsDelta,
        ),
        (
            "response.function_call.arguments.delta",
            Self::FunctionCallArgumentsDelta,
        ),
        ("response.completed", Self::Completed),
    ];

    /// Case-insensitive match on the event's `type` field.
    #[must_use]
    pub fn from_type(event_type: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(event_type))
            .map(|(_, kind)| *kind)
    }
}

/// `item.type` values inside `response.output_item.added`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputItemKind {
    Reasoning,
    FunctionCall,
    /// `output_text`, or a `message` item that will carry it.
    Text,
    Other,
}

impl OutputItemKind {
    #[must_use]
    pub fn from_type(item_type: &str) -> Self {
        if item_type.eq_ignore_ascii_case("reasoning") {
            Self::Reasoning
        } else if item_type.eq_ignore_ascii_case("function_call") {
            Self::FunctionCall
        } else if item_type.eq_ignore_ascii_case("output_text")
            || item_type.eq_ignore_ascii_case("message")
        {
            Self::Text
        } else {
            Self::Other
        }
    }
}
