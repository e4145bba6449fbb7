//! `POST /v1/messages` and `POST /v1/messages/count_tokens`.
//!
//! The messages handler is the proxy's main path: validate and normalize the
//! Anthropic request, convert to the intermediate shape, call the resolved
//! upstream, and translate the reply back — as a JSON body, or as the
//! Anthropic SSE event sequence when the client asked to stream.
//!
//! The SSE body is a lazy transform over the upstream chunk stream rather
//! than a spawned relay task: when the client disconnects the response body
//! is dropped, which drops the upstream stream and cancels the request.
//! Backpressure is inherited from the client socket for the same reason.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::backends::{ChunkStream, UpstreamClient};
use crate::convert;
use crate::error::ProxyError;
use crate::schema::anthropic::{CountTokensRequest, MessagesRequest};
use crate::schema::{self, provider_of};
use crate::stream::{StreamEvent, StreamTranslator};
use crate::tokens;

use super::AppState;

/// `POST /v1/messages`.
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ProxyError> {
    let mut request: MessagesRequest = serde_json::from_value(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid request body: {e}")))?;
    request.validate()?;
    schema::normalize_request(&mut request, &state.config);

    let provider = provider_of(&request.model);
    let chat_request = convert::to_chat_request(&request);
    let client = UpstreamClient::new(provider, &state.config)?;

    tracing::debug!(
        model = %request.model,
        provider = %provider,
        stream = request.wants_stream(),
        messages = chat_request.messages.len(),
        "dispatching messages request"
    );

    if request.wants_stream() {
        let chunks = client.complete_stream(&chat_request).await?;
        let translator = StreamTranslator::new(
            request.original_model.clone(),
            schema::supports_function_calling(&request.model),
        );
        tracing::debug!(message_id = %translator.message_id(), "starting stream translation");
        Ok(sse_response(chunks, translator))
    } else {
        let response = client.complete(&chat_request).await?;
        let out = convert::to_messages_response(&response, &request)?;
        Ok(Json(out).into_response())
    }
}

/// `POST /v1/messages/count_tokens`.
pub async fn count_tokens(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ProxyError> {
    let request: CountTokensRequest = serde_json::from_value(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid request body: {e}")))?;
    if request.model.trim().is_empty() {
        return Err(ProxyError::InvalidRequest("`model` must not be empty".into()));
    }

    let effective_model = schema::normalize_model(&request.model, &state.config);
    let input_tokens = tokens::estimate_input_tokens(&request, &effective_model);
    Ok(Json(json!({ "input_tokens": input_tokens })))
}

/// Drive the translator over the upstream chunks, yielding the Anthropic
/// event sequence.
///
/// This is a lazy transform: nothing is pulled from the upstream until the
/// client reads, and dropping the returned stream drops the upstream one.
/// Once the headers have flushed, upstream failures can no longer become
/// HTTP errors; the translator closes the stream legally instead and the
/// error is logged out-of-band.
fn translate_stream(
    upstream: ChunkStream,
    translator: StreamTranslator,
) -> impl futures_util::Stream<Item = StreamEvent> + Send {
    struct Pipe {
        upstream: ChunkStream,
        translator: StreamTranslator,
        queue: VecDeque<StreamEvent>,
        done: bool,
    }

    let pipe = Pipe { upstream, translator, queue: VecDeque::new(), done: false };

    futures_util::stream::unfold(pipe, |mut pipe| async move {
        loop {
            if let Some(event) = pipe.queue.pop_front() {
                return Some((event, pipe));
            }
            if pipe.done {
                return None;
            }
            match pipe.upstream.next().await {
                Some(Ok(chunk)) => {
                    let produced = pipe.translator.on_chunk(&chunk);
                    pipe.queue.extend(produced);
                }
                Some(Err(error)) => {
                    tracing::error!(error = %error, "upstream stream failed mid-response");
                    let produced = pipe.translator.finish_after_error();
                    pipe.queue.extend(produced);
                    pipe.done = true;
                }
                None => {
                    let produced = pipe.translator.finish();
                    pipe.queue.extend(produced);
                    pipe.done = true;
                }
            }
        }
    })
}

fn sse_response(upstream: ChunkStream, translator: StreamTranslator) -> Response {
    let events = translate_stream(upstream, translator).map(to_sse_event);
    let sse = Sse::new(events.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    )
        .into_response()
}

/// Render a translator event as an SSE frame.
fn to_sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Event { name, data } => Event::default().event(name).data(data.to_string()),
        StreamEvent::Done => Event::default().data("[DONE]"),
    }
}
