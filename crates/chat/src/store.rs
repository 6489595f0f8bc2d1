use std::sync::Arc;

use banter_wire::{ChatRequest, ContentPart, MessageContent, StreamEvent, WireMessage};
use futures::StreamExt;
use tracing::debug;

use crate::client::ChatTransport;
use crate::message::{FileAttachment, Message, MessageId, MessageStatus, Role, StreamSessionId};

/// What a `send`/`retry` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Caller-misuse guard tripped (empty send, invalid retry target);
    /// state untouched.
    Ignored,
    /// A stream is already active; sends are serialized.
    Busy,
    Completed,
    Failed { message: String },
}

/// Owns the conversation: the ordered message list plus the derived
/// loading flags the UI renders from.
///
/// The message list is append-only except for streaming appends to the
/// current assistant target and the error/retry mutations of `retry`.
pub struct ChatStore {
    transport: Arc<dyn ChatTransport>,
    messages: Vec<Message>,
    is_loading: bool,
    streaming_message_id: Option<MessageId>,
    active_session: Option<StreamSessionId>,
    next_message_id: u64,
    next_session_id: u64,
}

impl ChatStore {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            messages: Vec::new(),
            is_loading: false,
            streaming_message_id: None,
            active_session: None,
            next_message_id: 1,
            next_session_id: 1,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn streaming_message_id(&self) -> Option<MessageId> {
        self.streaming_message_id
    }

    /// Sends one user turn and folds the response stream to completion.
    ///
    /// Failures never escape as `Err`: they are recorded on the assistant
    /// placeholder so the UI layer needs no exception handling of its own.
    pub async fn send(
        &mut self,
        content: &str,
        model: &str,
        files: Vec<FileAttachment>,
    ) -> SendOutcome {
        if content.trim().is_empty() && files.is_empty() {
            return SendOutcome::Ignored;
        }

        if self.is_loading {
            // Serialized sends: a second stream would steal the streaming
            // target and let stale chunks land in the wrong message.
            return SendOutcome::Busy;
        }

        let user_id = self.alloc_message_id();
        self.messages.push(Message::user(user_id, content, files));

        // Request history includes the new user turn but not the placeholder.
        let request = self.build_request(model);

        let session = self.alloc_session_id();
        let assistant_id = self.alloc_message_id();
        self.messages
            .push(Message::assistant_streaming(assistant_id, session));
        self.streaming_message_id = Some(assistant_id);
        self.active_session = Some(session);
        self.is_loading = true;

        let mut chunks = self.transport.stream_chat(request);

        let mut saw_done = false;
        let mut failure = None;

        while let Some(item) = chunks.next().await {
            match item {
                Ok(event) => {
                    if self.apply_event(session, assistant_id, event) {
                        saw_done = true;
                        break;
                    }
                }
                Err(error) => {
                    failure = Some(error.to_string());
                    break;
                }
            }
        }

        if saw_done {
            self.finalize_done(session, assistant_id);
            return SendOutcome::Completed;
        }

        let message =
            failure.unwrap_or_else(|| "stream ended before a done event".to_string());
        self.finalize_error(session, assistant_id, message.clone());
        SendOutcome::Failed { message }
    }

    /// Re-runs the send that produced an errored assistant message.
    ///
    /// This is a brand-new attempt with a fresh placeholder and session,
    /// never a resumption of the failed stream.
    pub async fn retry(&mut self, message_id: MessageId, model: &str) -> SendOutcome {
        let Some(index) = self
            .messages
            .iter()
            .position(|message| message.id == message_id)
        else {
            return SendOutcome::Ignored;
        };

        if index == 0 {
            return SendOutcome::Ignored;
        }

        let preceding = &self.messages[index - 1];
        if preceding.role != Role::User {
            return SendOutcome::Ignored;
        }

        if self.is_loading {
            return SendOutcome::Busy;
        }

        let content = preceding.content.clone();
        let files = preceding.files.clone();
        self.messages.remove(index);

        self.send(&content, model, files).await
    }

    /// Applies one stream event; returns true when the stream is done.
    ///
    /// Events from a superseded session are discarded, never re-routed.
    fn apply_event(
        &mut self,
        session: StreamSessionId,
        assistant_id: MessageId,
        event: StreamEvent,
    ) -> bool {
        if self.active_session != Some(session) {
            debug!(session = session.0, "discarding stale stream event");
            return false;
        }

        match event {
            StreamEvent::Content { content } => {
                if let Some(message) = self.message_mut(assistant_id) {
                    // Strict append: the final text is the concatenation of
                    // deltas in arrival order.
                    message.content.push_str(&content);
                }
                false
            }
            StreamEvent::ToolCalls { tool_calls } => {
                if let Some(message) = self.message_mut(assistant_id) {
                    message.tool_calls.extend(tool_calls);
                }
                false
            }
            StreamEvent::Done { finish_reason } => {
                debug!(%finish_reason, "stream finished");
                true
            }
        }
    }

    fn finalize_done(&mut self, session: StreamSessionId, assistant_id: MessageId) {
        if self.active_session != Some(session) {
            return;
        }

        if let Some(message) = self.message_mut(assistant_id) {
            message.status = MessageStatus::Done;
        }
        self.clear_stream_flags();
    }

    fn finalize_error(
        &mut self,
        session: StreamSessionId,
        assistant_id: MessageId,
        error_message: String,
    ) {
        if self.active_session != Some(session) {
            return;
        }

        if let Some(message) = self.message_mut(assistant_id) {
            // Errored messages render with no content, only the indicator.
            message.content.clear();
            message.status = MessageStatus::Error(error_message);
        }
        self.clear_stream_flags();
    }

    fn clear_stream_flags(&mut self) {
        self.is_loading = false;
        self.streaming_message_id = None;
        self.active_session = None;
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    fn build_request(&self, model: &str) -> ChatRequest {
        let messages = self.messages.iter().map(wire_message).collect();

        ChatRequest {
            messages,
            model: (!model.is_empty()).then(|| model.to_string()),
            use_tools: Some(true),
        }
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    fn alloc_session_id(&mut self) -> StreamSessionId {
        let id = StreamSessionId::new(self.next_session_id);
        self.next_session_id += 1;
        id
    }
}

/// Lowers one message to its wire form.
///
/// Image attachments become a multi-part body: the text part (when any)
/// followed by one `image_url` part per image, hosted URL preferred over
/// the inline payload. Non-image attachments never reach the wire.
fn wire_message(message: &Message) -> WireMessage {
    let images: Vec<&FileAttachment> = message
        .files
        .iter()
        .filter(|file| file.is_image())
        .collect();

    if images.is_empty() {
        return WireMessage {
            role: message.role.to_wire(),
            content: MessageContent::Text(message.content.clone()),
        };
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    if !message.content.is_empty() {
        parts.push(ContentPart::Text {
            text: message.content.clone(),
        });
    }
    for image in images {
        parts.push(ContentPart::ImageUrl {
            image_url: image.source().unwrap_or_default().to_string(),
        });
    }

    WireMessage {
        role: message.role.to_wire(),
        content: MessageContent::Parts(parts),
    }
}
