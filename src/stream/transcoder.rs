//! Responses stream event to Chat Completions chunk transcoding.
//!
//! One [`TranscoderState`] lives for the duration of a single client stream.
//! Each backend `data:` payload is fed through [`transcode_payload`], which
//! returns zero or more frames to forward in order.
use std::borrow::Cow;

use rustc_hash::FxHashMap;
use serde_json::Value;
use smallvec::SmallVec;

use crate::protocol::openai_chat::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, ChunkToolCall, FinishReason,
};
use crate::protocol::openai_responses::{OutputItemKind, ResponsesEventKind};
use crate::util::unix_now_secs;

use super::sse::DONE_PAYLOAD;
use super::ChatStreamFrame;

pub const REASONING_OPEN_MARKER: &str = "<think>\n\n";
pub const REASONING_CLOSE_MARKER: &str = "</think>\n\n";

/// Frames produced by a single payload. Never more than three: a reasoning
/// close, a terminal chunk and the sentinel.
pub type Emission = SmallVec<[ChatStreamFrame; 3]>;

/// Coarse view of where a stream is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Nothing emitted yet.
    Idle,
    /// An open reasoning marker has been emitted and not yet closed.
    Reasoning,
    /// Content or tool calls are flowing.
    Emitting,
    /// The terminal chunk or sentinel has been emitted.
    Completed,
}

/// Per-stream transcoding state.
#[derive(Debug)]
pub struct TranscoderState {
    inbound_model: String,
    chunk_id: String,
    created_at: u64,
    role_announced: bool,
    reasoning_open: bool,
    completed: bool,
    finish_reason: Option<FinishReason>,
    chunks_emitted: usize,
    /// Backend output item id to client-facing tool call id. Entries are
    /// only ever added.
    item_to_call_id: FxHashMap<String, String>,
}

impl TranscoderState {
    #[must_use]
    pub fn new(inbound_model: impl Into<String>, chunk_id: impl Into<String>) -> Self {
        Self::with_created_at(inbound_model, chunk_id, unix_now_secs())
    }

    #[must_use]
    pub fn with_created_at(
        inbound_model: impl Into<String>,
        chunk_id: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            inbound_model: inbound_model.into(),
            chunk_id: chunk_id.into(),
            created_at,
            role_announced: false,
            reasoning_open: false,
            completed: false,
            finish_reason: None,
            chunks_emitted: 0,
            item_to_call_id: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        if self.completed {
            StreamPhase::Completed
        } else if self.reasoning_open {
            StreamPhase::Reasoning
        } else if self.role_announced {
            StreamPhase::Emitting
        } else {
            StreamPhase::Idle
        }
    }

    #[must_use]
    pub fn inbound_model(&self) -> &str {
        &self.inbound_model
    }

    #[must_use]
    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    #[must_use]
    pub fn chunks_emitted(&self) -> usize {
        self.chunks_emitted
    }

    #[must_use]
    pub fn call_id_for_item(&self, item_id: &str) -> Option<&str> {
        self.item_to_call_id.get(item_id).map(String::as_str)
    }

    /// The only place chunks are built. The first chunk of the stream
    /// carries `role: "assistant"`.
    fn chunk(
        &mut self,
        mut delta: ChunkDelta,
        finish_reason: Option<FinishReason>,
    ) -> ChatStreamFrame {
        if !self.role_announced {
            self.role_announced = true;
            delta.role = Some("assistant".to_string());
        }
        self.chunks_emitted += 1;
        ChatStreamFrame::Chunk(ChatCompletionChunk {
            id: self.chunk_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created_at,
            model: self.inbound_model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        })
    }

    fn content_chunk(&mut self, text: &str) -> ChatStreamFrame {
        self.chunk(
            ChunkDelta {
                content: Some(text.to_string()),
                ..ChunkDelta::default()
            },
            None,
        )
    }

    fn tool_call_chunk(&mut self, call: ChunkToolCall) -> ChatStreamFrame {
        self.chunk(
            ChunkDelta {
                tool_calls: Some(vec![call]),
                ..ChunkDelta::default()
            },
            None,
        )
    }

    fn open_reasoning(&mut self, out: &mut Emission) {
        if !self.reasoning_open {
            self.reasoning_open = true;
            out.push(self.content_chunk(REASONING_OPEN_MARKER));
        }
    }

    fn close_reasoning(&mut self, out: &mut Emission) {
        if self.reasoning_open {
            self.reasoning_open = false;
            out.push(self.content_chunk(REASONING_CLOSE_MARKER));
        }
    }

    fn terminate(&mut self, finish_reason: FinishReason, out: &mut Emission) {
        self.close_reasoning(out);
        out.push(self.chunk(ChunkDelta::default(), Some(finish_reason)));
        out.push(ChatStreamFrame::Done);
        self.finish_reason = Some(finish_reason);
        self.completed = true;
    }
}

/// Transcode one backend SSE payload.
///
/// Blank payloads, malformed JSON and unrecognized event types produce no
/// frames. Once the stream has completed every further payload is ignored.
pub fn transcode_payload(state: &mut TranscoderState, payload: &str) -> Emission {
    let mut out = Emission::new();
    if state.completed {
        return out;
    }
    let payload = payload.trim();
    if payload.is_empty() {
        return out;
    }
    if payload.eq_ignore_ascii_case(DONE_PAYLOAD) {
        state.close_reasoning(&mut out);
        out.push(ChatStreamFrame::Done);
        state.completed = true;
        return out;
    }

    let event: Value = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(error = %err, "dropping malformed backend payload");
            return out;
        }
    };
    let Some(kind) = event
        .get("type")
        .and_then(Value::as_str)
        .and_then(ResponsesEventKind::from_type)
    else {
        return out;
    };

    match kind {
        ResponsesEventKind::OutputItemAdded => on_output_item_added(state, &event, &mut out),
        ResponsesEventKind::ReasoningSummaryTextDelta => {
            if let Some(text) = text_delta(&event) {
                out.push(state.content_chunk(text));
            }
        }
        ResponsesEventKind::OutputTextDelta => {
            state.close_reasoning(&mut out);
            if let Some(text) = text_delta(&event) {
                out.push(state.content_chunk(text));
            }
        }
        ResponsesEventKind::FunctionCallArgumentsDelta => {
            on_arguments_delta(state, &event, &mut out);
        }
        ResponsesEventKind::Completed => {
            let finish_reason = if response_has_function_call(&event) {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            };
            state.terminate(finish_reason, &mut out);
        }
    }
    out
}

/// Terminate a stream whose backend ended (or failed) before
/// `response.completed`. Emits nothing if the stream already completed.
pub fn finish_stream(state: &mut TranscoderState) -> Emission {
    let mut out = Emission::new();
    if !state.completed {
        state.terminate(FinishReason::Stop, &mut out);
    }
    out
}

fn on_output_item_added(state: &mut TranscoderState, event: &Value, out: &mut Emission) {
    let Some(item) = event.get("item").filter(|item| item.is_object()) else {
        return;
    };
    let item_type = item.get("type").and_then(Value::as_str).unwrap_or_default();
    match OutputItemKind::from_type(item_type) {
        OutputItemKind::Reasoning => state.open_reasoning(out),
        OutputItemKind::Text => state.close_reasoning(out),
        OutputItemKind::FunctionCall => {
            let item_id = non_blank_str(item, "id");
            let call_id = non_blank_str(item, "call_id").or(item_id);
            if let (Some(item_id), Some(call_id)) = (item_id, call_id) {
                state
                    .item_to_call_id
                    .entry(item_id.to_string())
                    .or_insert_with(|| call_id.to_string());
            }
            let (Some(call_id), Some(name)) = (call_id, non_blank_str(item, "name")) else {
                tracing::debug!("skipping function_call item without call id or name");
                return;
            };
            state.close_reasoning(out);
            out.push(state.tool_call_chunk(ChunkToolCall::open(call_id, name)));
        }
        OutputItemKind::Other => {}
    }
}

fn on_arguments_delta(state: &mut TranscoderState, event: &Value, out: &mut Emission) {
    let Some(call_id) = resolve_call_id(state, event) else {
        tracing::debug!("dropping arguments delta with unresolvable call id");
        return;
    };
    let Some(fragment) = argument_fragment(event).filter(|fragment| !fragment.is_empty()) else {
        return;
    };
    state.close_reasoning(out);
    out.push(state.tool_call_chunk(ChunkToolCall::arguments(&call_id, &fragment)));
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// Where to look for a field: on the event itself or on its nested `item`.
#[derive(Debug, Clone, Copy)]
enum FieldPath {
    Event(&'static str),
    Item(&'static str),
}

impl FieldPath {
    fn lookup(self, event: &Value) -> Option<&Value> {
        match self {
            Self::Event(key) => event.get(key),
            Self::Item(key) => event.get("item").filter(|item| item.is_object())?.get(key),
        }
    }
}

/// Candidate sources for the call id of an arguments delta, tried in order.
#[derive(Debug, Clone, Copy)]
enum CallIdSource {
    Field(FieldPath),
    /// The item id, translated through the item-to-call-id map.
    MappedItemId,
    /// The item id used as the call id directly.
    ItemId,
}

const CALL_ID_SOURCES: [CallIdSource; 4] = [
    CallIdSource::Field(FieldPath::Event("call_id")),
    CallIdSource::Field(FieldPath::Item("call_id")),
    CallIdSource::MappedItemId,
    CallIdSource::ItemId,
];

const ITEM_ID_PATHS: [FieldPath; 3] = [
    FieldPath::Event("item_id"),
    FieldPath::Event("id"),
    FieldPath::Item("id"),
];

const ARGUMENT_FRAGMENT_PATHS: [FieldPath; 5] = [
    FieldPath::Event("delta"),
    FieldPath::Event("arguments"),
    FieldPath::Event("arguments_delta"),
    FieldPath::Item("delta"),
    FieldPath::Item("arguments"),
];

fn resolve_call_id(state: &TranscoderState, event: &Value) -> Option<String> {
    let item_id = ITEM_ID_PATHS
        .iter()
        .find_map(|path| path.lookup(event).and_then(as_non_blank));
    CALL_ID_SOURCES
        .iter()
        .find_map(|source| match source {
            CallIdSource::Field(path) => path.lookup(event).and_then(as_non_blank),
            CallIdSource::MappedItemId => item_id
                .and_then(|id| state.call_id_for_item(id))
                .filter(|id| !id.trim().is_empty()),
            CallIdSource::ItemId => item_id,
        })
        .map(str::to_string)
}

/// The first present fragment field wins. Strings are used verbatim; any
/// other JSON value is forwarded as its serialized text.
fn argument_fragment(event: &Value) -> Option<Cow<'_, str>> {
    ARGUMENT_FRAGMENT_PATHS
        .iter()
        .find_map(|path| path.lookup(event))
        .map(|value| match value {
            Value::String(text) => Cow::Borrowed(text.as_str()),
            other => Cow::Owned(other.to_string()),
        })
}

fn text_delta(event: &Value) -> Option<&str> {
    event
        .get("delta")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

fn response_has_function_call(event: &Value) -> bool {
    event
        .get("response")
        .and_then(|response| response.get("output"))
        .and_then(Value::as_array)
        .is_some_and(|output| {
            output.iter().any(|item| {
                item.get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.eq_ignore_ascii_case("function_call"))
            })
        })
}

fn as_non_blank(value: &Value) -> Option<&str> {
    value.as_str().filter(|text| !text.trim().is_empty())
}

fn non_blank_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(as_non_blank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> TranscoderState {
        TranscoderState::with_created_at("gpt-high", "chatcmpl-test", 42)
    }

    fn feed(state: &mut TranscoderState, event: &Value) -> Emission {
        transcode_payload(state, &event.to_string())
    }

    fn delta(frame: &ChatStreamFrame) -> &ChunkDelta {
        match frame {
            ChatStreamFrame::Chunk(chunk) => &chunk.choices[0].delta,
            ChatStreamFrame::Done => panic!("expected chunk, got sentinel"),
        }
    }

    #[test]
    fn test_phase_transitions() {
        let mut st = state();
        assert_eq!(st.phase(), StreamPhase::Idle);
        feed(
            &mut st,
            &json!({"type": "response.output_item.added", "item": {"type": "reasoning"}}),
        );
        assert_eq!(st.phase(), StreamPhase::Reasoning);
        feed(&mut st, &json!({"type": "response.output_text.delta", "delta": "x"}));
        assert_eq!(st.phase(), StreamPhase::Emitting);
        feed(&mut st, &json!({"type": "response.completed", "response": {}}));
        assert_eq!(st.phase(), StreamPhase::Completed);
        assert_eq!(st.finish_reason(), Some(FinishReason::Stop));
    }

    #[test]
    fn test_completed_with_reasoning_open_emits_close_then_stop() {
        let mut st = state();
        feed(
            &mut st,
            &json!({"type": "response.output_item.added", "item": {"type": "reasoning"}}),
        );
        feed(
            &mut st,
            &json!({"type": "response.reasoning.summary_text.delta", "delta": "hmm"}),
        );
        assert_eq!(st.phase(), StreamPhase::Reasoning);

        let out = feed(
            &mut st,
            &json!({"type": "response.completed", "response": {"output": []}}),
        );
        assert_eq!(out.len(), 3);
        assert_eq!(delta(&out[0]).content.as_deref(), Some(REASONING_CLOSE_MARKER));
        match &out[1] {
            ChatStreamFrame::Chunk(chunk) => {
                assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::Stop));
                assert!(chunk.choices[0].delta.content.is_none());
            }
            ChatStreamFrame::Done => panic!("expected terminal chunk"),
        }
        assert_eq!(out[2], ChatStreamFrame::Done);
        assert_eq!(st.phase(), StreamPhase::Completed);
    }

    #[test]
    fn test_reasoning_open_is_idempotent() {
        let mut st = state();
        let added = json!({"type": "response.output_item.added", "item": {"type": "reasoning"}});
        assert_eq!(feed(&mut st, &added).len(), 1);
        assert!(feed(&mut st, &added).is_empty());
    }

    #[test]
    fn test_role_only_on_first_chunk() {
        let mut st = state();
        let first = feed(&mut st, &json!({"type": "response.output_text.delta", "delta": "a"}));
        let second = feed(&mut st, &json!({"type": "response.output_text.delta", "delta": "b"}));
        assert_eq!(delta(&first[0]).role.as_deref(), Some("assistant"));
        assert!(delta(&second[0]).role.is_none());
        assert_eq!(st.chunks_emitted(), 2);
    }

    #[test]
    fn test_function_call_without_name_is_mapped_but_not_emitted() {
        let mut st = state();
        let out = feed(
            &mut st,
            &json!({
                "type": "response.output_item.added",
                "item": {"type": "function_call", "id": "it_1", "call_id": "call_1"}
            }),
        );
        assert!(out.is_empty());
        assert_eq!(st.call_id_for_item("it_1"), Some("call_1"));
    }

    #[test]
    fn test_function_call_skip_keeps_reasoning_open() {
        let mut st = state();
        feed(
            &mut st,
            &json!({"type": "response.output_item.added", "item": {"type": "reasoning"}}),
        );
        let out = feed(
            &mut st,
            &json!({"type": "response.output_item.added", "item": {"type": "function_call"}}),
        );
        assert!(out.is_empty());
        assert_eq!(st.phase(), StreamPhase::Reasoning);
    }

    #[test]
    fn test_call_id_falls_back_to_item_id() {
        let mut st = state();
        let out = feed(
            &mut st,
            &json!({
                "type": "response.output_item.added",
                "item": {"type": "function_call", "id": "fc_9", "name": "lookup"}
            }),
        );
        assert_eq!(out.len(), 1);
        let calls = delta(&out[0]).tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "fc_9");
        assert_eq!(calls[0].function.name.as_deref(), Some("lookup"));
    }

    #[test]
    fn test_arguments_delta_resolution_order() {
        let mut st = state();
        st.item_to_call_id
            .insert("it_1".to_string(), "call_mapped".to_string());

        let explicit = json!({"type": "response.function_call_arguments.delta", "call_id": "call_x", "item_id": "it_1", "delta": "1"});
        assert_eq!(resolve_call_id(&st, &explicit).as_deref(), Some("call_x"));

        let nested = json!({"type": "response.function_call_arguments.delta", "item": {"call_id": "call_y"}, "item_id": "it_1"});
        assert_eq!(resolve_call_id(&st, &nested).as_deref(), Some("call_y"));

        let mapped = json!({"type": "response.function_call_arguments.delta", "call_id": " ", "item_id": "it_1"});
        assert_eq!(resolve_call_id(&st, &mapped).as_deref(), Some("call_mapped"));

        let unmapped = json!({"type": "response.function_call_arguments.delta", "id": "it_2"});
        assert_eq!(resolve_call_id(&st, &unmapped).as_deref(), Some("it_2"));

        let nested_item_id = json!({"type": "response.function_call_arguments.delta", "item": {"id": "it_1"}});
        assert_eq!(
            resolve_call_id(&st, &nested_item_id).as_deref(),
            Some("call_mapped")
        );

        let none = json!({"type": "response.function_call_arguments.delta", "delta": "x"});
        assert!(resolve_call_id(&st, &none).is_none());
    }

    #[test]
    fn test_argument_fragment_first_present_field_wins() {
        let event = json!({"arguments": "", "arguments_delta": "ignored"});
        assert_eq!(argument_fragment(&event).as_deref(), Some(""));

        let structured = json!({"item": {"arguments": {"a": 1}}});
        assert_eq!(argument_fragment(&structured).as_deref(), Some("{\"a\":1}"));

        assert!(argument_fragment(&json!({})).is_none());
    }

    #[test]
    fn test_unresolvable_arguments_delta_is_dropped() {
        let mut st = state();
        let out = feed(
            &mut st,
            &json!({"type": "response.function_call_arguments.delta", "delta": "{}"}),
        );
        assert!(out.is_empty());
        assert_eq!(st.phase(), StreamPhase::Idle);
    }

    #[test]
    fn test_done_closes_reasoning_before_sentinel() {
        let mut st = state();
        feed(
            &mut st,
            &json!({"type": "response.output_item.added", "item": {"type": "reasoning"}}),
        );
        let out = transcode_payload(&mut st, " [done] ");
        assert_eq!(out.len(), 2);
        assert_eq!(delta(&out[0]).content.as_deref(), Some(REASONING_CLOSE_MARKER));
        assert_eq!(out[1], ChatStreamFrame::Done);
        assert!(st.is_completed());
    }

    #[test]
    fn test_payloads_after_completion_are_ignored() {
        let mut st = state();
        feed(&mut st, &json!({"type": "response.completed", "response": {"output": []}}));
        let out = feed(&mut st, &json!({"type": "response.output_text.delta", "delta": "late"}));
        assert!(out.is_empty());
        assert!(finish_stream(&mut st).is_empty());
    }

    #[test]
    fn test_malformed_and_unknown_payloads_are_ignored() {
        let mut st = state();
        assert!(transcode_payload(&mut st, "{not json").is_empty());
        assert!(transcode_payload(&mut st, "   ").is_empty());
        assert!(feed(&mut st, &json!({"type": "response.created"})).is_empty());
        assert!(feed(&mut st, &json!({"no_type": true})).is_empty());
        assert_eq!(st.phase(), StreamPhase::Idle);
    }

    #[test]
    fn test_finish_stream_synthesizes_stop() {
        let mut st = state();
        feed(
            &mut st,
            &json!({"type": "response.output_item.added", "item": {"type": "reasoning"}}),
        );
        let out = finish_stream(&mut st);
        assert_eq!(out.len(), 3);
        assert_eq!(delta(&out[0]).content.as_deref(), Some(REASONING_CLOSE_MARKER));
        match &out[1] {
            ChatStreamFrame::Chunk(chunk) => {
                assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::Stop));
            }
            ChatStreamFrame::Done => panic!("expected terminal chunk"),
        }
        assert_eq!(out[2], ChatStreamFrame::Done);
    }
}
