use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::protocol::openai_chat::{ChatCompletion, ChatCompletionsRequest};

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) to avoid loading model BPE tables.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

fn estimate_value_tokens(value: &Value) -> u64 {
    match value {
        Value::Null => 0,
        Value::String(text) => estimate_tokens(text),
        other => estimate_tokens(&other.to_string()),
    }
}

/// Estimate the prompt size of an inbound request.
///
/// Sums message content, tool-call names and arguments, and tool
/// definitions (name, description, serialized parameter schema).
#[must_use]
pub fn estimate_request_tokens(request: &ChatCompletionsRequest) -> u64 {
    let mut total: u64 = 0;

    for message in &request.messages {
        if let Some(content) = &message.content {
            total += estimate_value_tokens(content);
        }
        for call in message.tool_calls.iter().flatten() {
            total += estimate_tokens(&call.function.name);
            total += call.function.arguments.as_deref().map_or(0, estimate_tokens);
        }
    }

    for tool in request.tools.iter().flatten() {
        total += estimate_tokens(&tool.function.name);
        total += tool.function.description.as_deref().map_or(0, estimate_tokens);
        total += tool.function.parameters.as_ref().map_or(0, estimate_value_tokens);
    }

    total
}

/// Estimate the output size of an aggregated completion.
#[must_use]
pub fn estimate_completion_tokens(completion: &ChatCompletion) -> u64 {
    completion
        .choices
        .iter()
        .map(|choice| {
            let content = choice.message.content.as_deref().map_or(0, estimate_tokens);
            let calls: u64 = choice
                .message
                .tool_calls
                .iter()
                .flatten()
                .map(|call| {
                    estimate_tokens(&call.function.name)
                        + call.function.arguments.as_deref().map_or(0, estimate_tokens)
                })
                .sum();
            content + calls
        })
        .sum()
}

/// Log the outcome of a forwarded request.
pub fn log_request_usage(
    request_id: &str,
    model: &str,
    prompt_tokens: u64,
    completion_tokens: Option<u64>,
    elapsed: Duration,
) {
    info!(
        request_id = %request_id,
        model = %model,
        estimated_prompt_tokens = prompt_tokens,
        estimated_completion_tokens = completion_tokens,
        duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "request complete"
    );
}
