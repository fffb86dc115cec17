use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use crate::error::GatewayError;
use crate::observability::token_counter::{
    estimate_completion_tokens, estimate_request_tokens, log_request_usage,
};
use crate::protocol::openai_chat::aggregate::ChatCompletionAggregator;
use crate::protocol::openai_chat::ChatCompletionsRequest;
use crate::protocol::openai_responses::encoder::encode_responses_request;
use crate::state::AppState;
use crate::stream::{transcode_byte_stream, ChatStreamFrame, TranscoderState};

/// `POST /v1/chat/completions`.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    match handler_inner(state, headers, body).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                GatewayError::Auth(_) | GatewayError::InvalidRequest(_) => {
                    tracing::debug!(error = %err, "rejected chat completion request");
                }
                _ => tracing::warn!(error = %err, "chat completion request failed"),
            }
            err.into_response()
        }
    }
}

async fn handler_inner(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Result<Response, GatewayError> {
    let started = Instant::now();
    state.authenticate(&headers)?;

    let request: ChatCompletionsRequest = serde_json::from_slice(&body).map_err(|err| {
        GatewayError::InvalidRequest(format!("Failed to parse Chat Completions request: {err}"))
    })?;
    let (backend_request, inbound_model) =
        encode_responses_request(&request, &state.config.backend.deployment)?;

    let completion_id = state.completion_id(state.next_request_seq());
    let prompt_tokens = estimate_request_tokens(&request);
    tracing::info!(
        request_id = %completion_id,
        model = %inbound_model,
        effort = %backend_request.reasoning.effort,
        estimated_prompt_tokens = prompt_tokens,
        stream = request.wants_stream(),
        "forwarding chat completion to responses backend"
    );

    let upstream = state
        .transport
        .open_responses_stream(&backend_request)
        .await?;
    let transcoder = TranscoderState::new(inbound_model, completion_id);

    if request.wants_stream() {
        return Ok(stream_response(transcoder, upstream));
    }

    let completion_id = transcoder.chunk_id().to_string();
    let mut aggregator = ChatCompletionAggregator::new(
        transcoder.chunk_id(),
        transcoder.created_at(),
        transcoder.inbound_model(),
    );
    let model = transcoder.inbound_model().to_string();
    let mut frames = std::pin::pin!(transcode_byte_stream(upstream.bytes_stream(), transcoder));
    while let Some(frame) = frames.next().await {
        if let ChatStreamFrame::Chunk(chunk) = frame {
            aggregator.push_chunk(&chunk);
        }
    }
    let completion = aggregator.finish();
    log_request_usage(
        &completion_id,
        &model,
        prompt_tokens,
        Some(estimate_completion_tokens(&completion)),
        started.elapsed(),
    );
    Ok(axum::Json(completion).into_response())
}

fn stream_response(transcoder: TranscoderState, upstream: reqwest::Response) -> Response {
    let frames = transcode_byte_stream(upstream.bytes_stream(), transcoder);
    let body_stream = frames.filter_map(|frame| {
        let encoded = match frame.encode() {
            Ok(text) => Some(Ok::<_, Infallible>(bytes::Bytes::from(text))),
            Err(err) => {
                tracing::error!(error = %err, "dropping unencodable chunk");
                None
            }
        };
        futures_util::future::ready(encoded)
    });
    sse_ok_response(axum::body::Body::from_stream(body_stream))
}

fn sse_ok_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
