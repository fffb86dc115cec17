pub mod sse;
pub mod transcoder;

pub use sse::{LineSplitter, SseLineFramer};
pub use transcoder::{finish_stream, transcode_payload, StreamPhase, TranscoderState};

use std::collections::VecDeque;
use std::time::Instant;

use futures_util::{Stream, StreamExt};

use crate::error::GatewayError;
use crate::protocol::openai_chat::ChatCompletionChunk;

/// One unit of client-bound output.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatStreamFrame {
    Chunk(ChatCompletionChunk),
    /// The `data: [DONE]` sentinel.
    Done,
}

impl ChatStreamFrame {
    /// Encode as a complete SSE event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the chunk cannot be serialized.
    pub fn encode(&self) -> Result<String, GatewayError> {
        match self {
            Self::Chunk(chunk) => sse::encode_json(chunk),
            Self::Done => Ok(sse::done_frame()),
        }
    }
}

struct Relay<S> {
    upstream: std::pin::Pin<Box<S>>,
    splitter: LineSplitter,
    framer: SseLineFramer,
    transcoder: TranscoderState,
    lines: Vec<String>,
    pending: VecDeque<ChatStreamFrame>,
    upstream_done: bool,
    started: Instant,
}

impl<S> Relay<S> {
    fn dispatch_lines(&mut self) {
        let Self {
            lines,
            framer,
            transcoder,
            pending,
            ..
        } = self;
        for line in lines.drain(..) {
            if let Some(payload) = framer.push_line(&line) {
                pending.extend(transcode_payload(transcoder, &payload));
            }
        }
    }

    fn close(&mut self) {
        self.upstream_done = true;
        self.pending.extend(finish_stream(&mut self.transcoder));
        tracing::info!(
            chunk_id = %self.transcoder.chunk_id(),
            model = %self.transcoder.inbound_model(),
            chunks = self.transcoder.chunks_emitted(),
            finish_reason = self.transcoder.finish_reason().map_or("none", |r| r.as_str()),
            elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "chat completion stream finished"
        );
    }
}

/// Turn the backend's SSE byte stream into client frames.
///
/// The returned stream always ends with [`ChatStreamFrame::Done`]: if the
/// backend closes or fails before `response.completed`, a `stop` chunk and
/// the sentinel are synthesized. Dropping the stream drops the backend
/// connection with it.
pub fn transcode_byte_stream<S, B, E>(
    byte_stream: S,
    transcoder: TranscoderState,
) -> impl Stream<Item = ChatStreamFrame> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let relay = Relay {
        upstream: Box::pin(byte_stream),
        splitter: LineSplitter::new(),
        framer: SseLineFramer::new(),
        transcoder,
        lines: Vec::with_capacity(8),
        pending: VecDeque::with_capacity(4),
        upstream_done: false,
        started: Instant::now(),
    };

    futures_util::stream::unfold(relay, |mut relay| async move {
        loop {
            if let Some(frame) = relay.pending.pop_front() {
                return Some((frame, relay));
            }
            if relay.upstream_done {
                return None;
            }

            match relay.upstream.as_mut().next().await {
                Some(Ok(bytes)) => {
                    relay.splitter.feed(bytes.as_ref(), &mut relay.lines);
                    relay.dispatch_lines();
                    if relay.transcoder.is_completed() {
                        relay.close();
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        chunk_id = %relay.transcoder.chunk_id(),
                        error = %err,
                        "backend stream failed mid-response"
                    );
                    relay.close();
                }
                None => {
                    if let Some(line) = relay.splitter.finish() {
                        relay.lines.push(line);
                    }
                    relay.lines.push(String::new());
                    relay.dispatch_lines();
                    if !relay.transcoder.is_completed() {
                        tracing::warn!(
                            chunk_id = %relay.transcoder.chunk_id(),
                            "backend stream ended before response.completed"
                        );
                    }
                    relay.close();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_chat::FinishReason;

    fn chunks(parts: &[&str]) -> Vec<Result<bytes::Bytes, std::io::Error>> {
        parts
            .iter()
            .map(|p| Ok(bytes::Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    async fn collect(parts: Vec<Result<bytes::Bytes, std::io::Error>>) -> Vec<ChatStreamFrame> {
        let state = TranscoderState::with_created_at("gpt-low", "chatcmpl-t", 1);
        transcode_byte_stream(futures_util::stream::iter(parts), state)
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_relay_handles_split_events() {
        let frames = collect(chunks(&[
            "data: {\"type\":\"response.output_text.del",
            "ta\",\"delta\":\"hi\"}\n\ndata: {\"type\":\"response.completed\",",
            "\"response\":{\"output\":[]}}\n\n",
        ]))
        .await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], ChatStreamFrame::Done);
    }

    #[tokio::test]
    async fn test_relay_dispatches_unterminated_final_event() {
        let frames = collect(chunks(&[
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"x\"}",
        ]))
        .await;
        // content, synthesized stop, sentinel
        assert_eq!(frames.len(), 3);
        match &frames[1] {
            ChatStreamFrame::Chunk(chunk) => {
                assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::Stop));
            }
            ChatStreamFrame::Done => panic!("expected stop chunk"),
        }
    }

    #[tokio::test]
    async fn test_relay_synthesizes_end_on_error() {
        let parts = vec![
            Ok(bytes::Bytes::from_static(
                b"data: {\"type\":\"response.output_item.added\",\"item\":{\"type\":\"reasoning\"}}\n\n",
            )),
            Err(std::io::Error::other("reset")),
            Ok(bytes::Bytes::from_static(b"data: ignored\n\n")),
        ];
        let frames = collect(parts).await;
        // open marker, close marker, stop, sentinel
        assert_eq!(frames.len(), 4);
        assert_eq!(frames.last(), Some(&ChatStreamFrame::Done));
    }

    #[test]
    fn test_done_frame_encoding() {
        assert_eq!(ChatStreamFrame::Done.encode().unwrap(), "data: [DONE]\n\n");
    }
}
