use serde_json::Value;

use crate::error::GatewayError;
use crate::protocol::openai_chat::{ChatCompletionsRequest, ChatMessage, ChatTool};

use super::{
    ReasoningEffort, ResponsesCallItem, ResponsesContentPart, ResponsesInputItem,
    ResponsesReasoning, ResponsesRequest, ResponsesTool,
};

const MODEL_PREFIX: &str = "gpt-";
const INSTRUCTION_SEPARATOR: &str = "\n\n";

/// Resolve the reasoning effort from an inbound model alias.
///
/// Surrounding whitespace is ignored and the `gpt-` prefix matches
/// case-insensitively, so `" GPT-High "` selects [`ReasoningEffort::High`].
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for any model that is not one of
/// `gpt-high`, `gpt-medium`, `gpt-low` or `gpt-minimal`.
pub fn parse_reasoning_effort(model: &str) -> Result<ReasoningEffort, GatewayError> {
    let trimmed = model.trim();
    trimmed
        .get(..MODEL_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(MODEL_PREFIX))
        .and_then(|_| {
            let effort = trimmed[MODEL_PREFIX.len()..].trim().to_ascii_lowercase();
            ReasoningEffort::from_name(&effort)
        })
        .ok_or_else(|| {
            GatewayError::InvalidRequest(format!(
                "Invalid model '{model}'. Allowed: gpt-high|gpt-medium|gpt-low|gpt-minimal."
            ))
        })
}

/// Translate a Chat Completions request into a streaming Responses request.
///
/// Returns the outbound body together with the trimmed inbound model name,
/// which every emitted chunk echoes back.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when the model alias is not
/// recognized, or [`GatewayError::Config`] when no backend deployment is
/// configured.
pub fn encode_responses_request(
    request: &ChatCompletionsRequest,
    deployment: &str,
) -> Result<(ResponsesRequest, String), GatewayError> {
    let effort = parse_reasoning_effort(&request.model)?;
    if deployment.trim().is_empty() {
        return Err(GatewayError::Config(
            "backend deployment is not configured".to_string(),
        ));
    }

    let (instructions, input) = encode_messages(&request.messages);

    let tools = request
        .tools
        .as_deref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.iter().map(encode_tool).collect());

    let body = ResponsesRequest {
        model: deployment.to_string(),
        stream: true,
        input,
        instructions,
        tools,
        tool_choice: request.tool_choice.clone().filter(is_meaningful_tool_choice),
        prompt_cache_key: non_blank(request.user.as_deref()).map(str::to_string),
        reasoning: ResponsesReasoning { effort },
    };
    Ok((body, request.model.trim().to_string()))
}

fn encode_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<ResponsesInputItem>) {
    let mut instruction_parts: Vec<&str> = Vec::new();
    let mut input = Vec::with_capacity(messages.len());

    for message in messages {
        let role = message.role.trim();
        if role.eq_ignore_ascii_case("system") || role.eq_ignore_ascii_case("developer") {
            // Only plain-string instructions are lifted; anything else is dropped.
            if let Some(Value::String(text)) = &message.content {
                if !text.trim().is_empty() {
                    instruction_parts.push(text);
                }
            }
            continue;
        }

        if role.eq_ignore_ascii_case("tool") {
            input.push(ResponsesInputItem::Call(
                ResponsesCallItem::FunctionCallOutput {
                    status: "completed".to_string(),
                    call_id: non_blank(message.tool_call_id.as_deref()).map(str::to_string),
                    output: tool_output(message.content.as_ref()),
                },
            ));
            continue;
        }

        let text = content_text(message.content.as_ref());
        let part = if role.eq_ignore_ascii_case("assistant") {
            ResponsesContentPart::OutputText { text }
        } else {
            ResponsesContentPart::InputText { text }
        };
        input.push(ResponsesInputItem::Message {
            role: role.to_ascii_lowercase(),
            content: vec![part],
        });

        for call in message.tool_calls.iter().flatten() {
            input.push(ResponsesInputItem::Call(ResponsesCallItem::FunctionCall {
                call_id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone().unwrap_or_default(),
            }));
        }
    }

    let instructions = if instruction_parts.is_empty() {
        None
    } else {
        Some(instruction_parts.join(INSTRUCTION_SEPARATOR))
    };
    (instructions, input)
}

/// Message text: strings verbatim, `null` as empty, anything else as its
/// compact JSON text.
fn content_text(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn tool_output(content: Option<&Value>) -> Value {
    match content {
        None | Some(Value::Null) => Value::String(String::new()),
        Some(other) => other.clone(),
    }
}

fn encode_tool(tool: &ChatTool) -> ResponsesTool {
    ResponsesTool::Function {
        name: tool.function.name.clone(),
        description: non_blank(tool.function.description.as_deref()).map(str::to_string),
        parameters: tool.function.parameters.clone().filter(|p| !p.is_null()),
        strict: false,
    }
}

fn is_meaningful_tool_choice(choice: &Value) -> bool {
    match choice {
        Value::Null => false,
        Value::String(mode) => !mode.trim().is_empty(),
        _ => true,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
