use banter_wire::{ContentPart, MessageContent, ToolCall, WireMessage};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::json;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::provider::{
    EmptyMessageSetSnafu, HttpClientSnafu, LlmProvider, MissingApiKeySnafu, ProviderConfig,
    ProviderError, ProviderResult, ProviderStreamHandle, ProviderWorker, StreamEventPayload,
    StreamRequest, UpstreamStatusSnafu, make_event_stream,
};

pub const MISTRAL_PROVIDER_ID: &str = "mistral";

pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-small-latest";

const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// OpenAI-style end-of-stream sentinel.
const DONE_SENTINEL: &str = "[DONE]";

/// Streaming chat-completions client for the Mistral API.
pub struct MistralProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl MistralProvider {
    pub fn new(mut config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "mistral-provider-new",
            }
        );

        if config.base_url.is_empty() {
            config.base_url = DEFAULT_BASE_URL.to_string();
        }

        Ok(Self {
            config,
            http: reqwest::Client::new(),
        })
    }

    fn build_request_body(request: &StreamRequest) -> serde_json::Value {
        let messages = request
            .messages
            .iter()
            .map(Self::upstream_message)
            .collect::<Vec<_>>();

        let mut body = json!({
            "model": request.model_id,
            "messages": messages,
            "stream": true,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        body
    }

    /// Re-spells one wire message in the upstream chat-completions shape.
    ///
    /// The only difference is the image part: the proxy wire uses `imageUrl`
    /// while the upstream API expects `image_url`.
    fn upstream_message(message: &WireMessage) -> serde_json::Value {
        match &message.content {
            MessageContent::Text(text) => json!({
                "role": message.role,
                "content": text,
            }),
            MessageContent::Parts(parts) => {
                let parts = parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => json!({"type": "text", "text": text}),
                        ContentPart::ImageUrl { image_url } => {
                            json!({"type": "image_url", "image_url": image_url})
                        }
                    })
                    .collect::<Vec<_>>();

                json!({
                    "role": message.role,
                    "content": parts,
                })
            }
        }
    }

    async fn open_stream(
        http: &reqwest::Client,
        config: &ProviderConfig,
        request: &StreamRequest,
    ) -> ProviderResult<UpstreamEvents> {
        let body = Self::build_request_body(request);

        debug!(model_id = %request.model_id, "opening upstream chat stream");

        let response = http
            .post(format!("{}/v1/chat/completions", config.base_url))
            .bearer_auth(&config.api_key)
            .json(&body)
            .send()
            .await
            .context(HttpClientSnafu {
                stage: "send-chat-request",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return UpstreamStatusSnafu {
                stage: "chat-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(response.bytes_stream().eventsource().boxed())
    }

    /// Maps one upstream chunk to zero or more stream payloads.
    ///
    /// A single chunk may carry both a delta and a finish reason; the delta
    /// is forwarded first so concatenation order is preserved.
    fn map_chunk(chunk: ChatChunk) -> Vec<StreamEventPayload> {
        let mut payloads = Vec::new();

        let Some(choice) = chunk.choices.into_iter().next() else {
            return payloads;
        };

        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            payloads.push(StreamEventPayload::Delta(content));
        }

        if let Some(deltas) = choice.delta.tool_calls
            && !deltas.is_empty()
        {
            let calls = deltas.into_iter().map(ToolCallDelta::into_tool_call).collect();
            payloads.push(StreamEventPayload::ToolCalls(calls));
        }

        if let Some(reason) = choice.finish_reason {
            payloads.push(StreamEventPayload::Finished { reason });
        }

        payloads
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventPayload>,
        error: impl std::fmt::Display,
    ) {
        let _ = event_tx.send(StreamEventPayload::Error(error.to_string()));
    }

    async fn run_stream_worker(
        http: reqwest::Client,
        config: ProviderConfig,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEventPayload>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut events = match Self::open_stream(&http, &config, &request).await {
            Ok(events) => events,
            Err(error) => {
                tracing::error!(
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open upstream stream"
                );
                Self::emit_error_event(&event_tx, error);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    // Dropping the response stream closes the upstream connection.
                    debug!(model_id = %request.model_id, "upstream stream cancelled");
                    return;
                }
                next_event = events.next() => {
                    match next_event {
                        Some(Ok(event)) => {
                            if event.data == DONE_SENTINEL {
                                return;
                            }

                            let chunk = match serde_json::from_str::<ChatChunk>(&event.data) {
                                Ok(chunk) => chunk,
                                Err(error) => {
                                    warn!(error = %error, "skipping unparsable upstream chunk");
                                    continue;
                                }
                            };

                            for payload in Self::map_chunk(chunk) {
                                if event_tx.send(payload).is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(source)) => {
                            warn!(error = %source, "upstream stream failed mid-read");
                            Self::emit_error_event(&event_tx, source);
                            return;
                        }
                        None => return,
                    }
                }
            }
        }
    }
}

impl LlmProvider for MistralProvider {
    fn id(&self) -> &str {
        MISTRAL_PROVIDER_ID
    }

    fn name(&self) -> &str {
        "Mistral"
    }

    fn default_model(&self) -> &str {
        self.config
            .default_model
            .as_deref()
            .unwrap_or(DEFAULT_MISTRAL_MODEL)
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream();
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.http.clone(),
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}

/// Upstream SSE events after eventsource framing, before chunk parsing.
type UpstreamEvents = BoxStream<
    'static,
    Result<eventsource_stream::Event, eventsource_stream::EventStreamError<reqwest::Error>>,
>;

/// Upstream chat-completion chunk, reduced to the fields the proxy forwards.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl ToolCallDelta {
    /// Providers may omit the tool-call id on some chunks; fall back to a
    /// stable synthetic id per index so deltas stay associated downstream.
    fn into_tool_call(self) -> ToolCall {
        let index = self.index.unwrap_or(0);
        let id = self
            .id
            .unwrap_or_else(|| format!("tool_index_{index}"));

        let (name, arguments) = match self.function {
            Some(function) => {
                let arguments = match function.arguments {
                    Some(raw) => {
                        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
                    }
                    None => serde_json::Value::Null,
                };
                (function.name.unwrap_or_default(), arguments)
            }
            None => (String::new(), serde_json::Value::Null),
        };

        ToolCall { id, name, arguments }
    }
}
