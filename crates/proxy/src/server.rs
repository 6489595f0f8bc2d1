use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use banter_llm::{LlmProvider, ProviderStreamHandle, StreamEventPayload, StreamRequest};
use banter_wire::{ChatRequest, StreamEvent};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Shared per-server state. The proxy itself is stateless per request;
/// this only carries the upstream provider handle.
pub struct AppState {
    pub provider: Arc<dyn LlmProvider>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Bridges one chat request to one upstream streaming call.
///
/// Request-parse failures answer with a plain 500 before any stream
/// exists; everything after that point is reported on the stream itself,
/// so the client can tell "ended normally" from "failed mid-stream".
async fn chat(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request: ChatRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(error) => {
            warn!(error = %error, "rejecting malformed chat request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to process chat request"})),
            )
                .into_response();
        }
    };

    let model = request
        .model
        .filter(|model| !model.is_empty())
        .unwrap_or_else(|| state.provider.default_model().to_string());

    debug!(%model, message_count = request.messages.len(), "starting chat stream");

    let stream_request = StreamRequest::new(model, request.messages);

    let (event_tx, event_rx) = mpsc::channel::<Result<Event, io::Error>>(64);
    tokio::spawn(run_stream_bridge(state, stream_request, event_tx));

    let mut response = Sse::new(ReceiverStream::new(event_rx)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    response
}

/// Forwards provider events to the SSE channel, one record per event.
///
/// A provider failure is surfaced as a stream item error, which aborts the
/// transport instead of closing it cleanly.
async fn run_stream_bridge(
    state: Arc<AppState>,
    request: StreamRequest,
    event_tx: mpsc::Sender<Result<Event, io::Error>>,
) {
    let ProviderStreamHandle { mut stream, worker } = match state.provider.stream_chat(request) {
        Ok(handle) => handle,
        Err(error) => {
            warn!(error = %error, "failed to start upstream stream");
            let _ = event_tx.send(Err(io::Error::other(error.to_string()))).await;
            return;
        }
    };

    tokio::spawn(worker);

    while let Some(payload) = stream.recv().await {
        let event = match payload {
            StreamEventPayload::Delta(content) => StreamEvent::Content { content },
            StreamEventPayload::ToolCalls(tool_calls) => StreamEvent::ToolCalls { tool_calls },
            StreamEventPayload::Finished { reason } => StreamEvent::Done {
                finish_reason: reason,
            },
            StreamEventPayload::Error(message) => {
                warn!(error = %message, "upstream stream failed, aborting response");
                let _ = event_tx.send(Err(io::Error::other(message))).await;
                // Dropping the stream cancels the provider worker.
                return;
            }
        };

        if event_tx.send(Ok(sse_event(&event))).await.is_err() {
            tracing::trace!("client disconnected, stopping stream");
            return;
        }
    }
}

fn sse_event(event: &StreamEvent) -> Event {
    let json = serde_json::to_string(event).expect("wire events serialize infallibly");
    Event::default().data(json)
}
