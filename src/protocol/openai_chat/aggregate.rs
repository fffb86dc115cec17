use super::{
    ChatCompletion, ChatCompletionChunk, ChatFunctionCall, ChatToolCall, CompletionChoice,
    CompletionMessage, FinishReason,
};

/// Folds streamed chunks into a single `chat.completion` for clients that
/// asked for `"stream": false`.
#[derive(Debug)]
pub struct ChatCompletionAggregator {
    id: String,
    created: u64,
    model: String,
    content: String,
    has_content: bool,
    tool_calls: Vec<ChatToolCall>,
    finish_reason: Option<FinishReason>,
}

impl ChatCompletionAggregator {
    #[must_use]
    pub fn new(id: impl Into<String>, created: u64, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created,
            model: model.into(),
            content: String::new(),
            has_content: false,
            tool_calls: Vec::new(),
            finish_reason: None,
        }
    }

    pub fn push_chunk(&mut self, chunk: &ChatCompletionChunk) {
        for choice in &chunk.choices {
            if let Some(text) = choice.delta.content.as_deref() {
                self.content.push_str(text);
                self.has_content = true;
            }
            for call in choice.delta.tool_calls.iter().flatten() {
                match call.function.name.as_deref() {
                    Some(name) => self.tool_calls.push(ChatToolCall {
                        id: call.id.clone(),
                        type_: call.type_.clone(),
                        function: ChatFunctionCall {
                            name: name.to_string(),
                            arguments: Some(call.function.arguments.clone()),
                        },
                    }),
                    None => self.append_arguments(&call.id, &call.function.arguments),
                }
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
    }

    fn append_arguments(&mut self, call_id: &str, fragment: &str) {
        if let Some(existing) = self.tool_calls.iter_mut().rev().find(|c| c.id == call_id) {
            existing
                .function
                .arguments
                .get_or_insert_with(String::new)
                .push_str(fragment);
            return;
        }
        // Arguments for a call whose opening fragment never arrived.
        self.tool_calls.push(ChatToolCall {
            id: call_id.to_string(),
            type_: "function".to_string(),
            function: ChatFunctionCall {
                name: String::new(),
                arguments: Some(fragment.to_string()),
            },
        });
    }

    #[must_use]
    pub fn finish(self) -> ChatCompletion {
        let tool_calls = if self.tool_calls.is_empty() {
            None
        } else {
            Some(self.tool_calls)
        };
        ChatCompletion {
            id: self.id,
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model,
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: "assistant".to_string(),
                    content: self.has_content.then_some(self.content),
                    tool_calls,
                },
                finish_reason: Some(self.finish_reason.unwrap_or(FinishReason::Stop)),
            }],
        }
    }
}
