use banter_wire::{ToolCall, WireRole};
use chrono::{DateTime, Utc};

/// Stable identifier for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identifier for one streaming generation session.
///
/// This must change on every send/retry so stale chunks can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamSessionId(pub u64);

impl StreamSessionId {
    /// Creates a typed stream session identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn to_wire(self) -> WireRole {
        match self {
            Self::System => WireRole::System,
            Self::User => WireRole::User,
            Self::Assistant => WireRole::Assistant,
        }
    }
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    Done,
    Streaming(StreamSessionId),
    Error(String),
}

/// One file attached to a user message, fixed at creation.
///
/// At most one of `url` and `data` is meaningful; `data` carries an inline
/// base64 payload produced by the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub url: Option<String>,
    pub data: Option<String>,
}

impl FileAttachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Hosted URL when present, inline payload otherwise.
    pub fn source(&self) -> Option<&str> {
        self.url.as_deref().or(self.data.as_deref())
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub files: Vec<FileAttachment>,
    pub tool_calls: Vec<ToolCall>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a finished user message.
    pub fn user(id: MessageId, content: impl Into<String>, files: Vec<FileAttachment>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            files,
            tool_calls: Vec::new(),
            status: MessageStatus::Done,
            created_at: Utc::now(),
        }
    }

    /// Creates the empty assistant placeholder filled in while streaming.
    pub fn assistant_streaming(id: MessageId, session_id: StreamSessionId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            files: Vec::new(),
            tool_calls: Vec::new(),
            status: MessageStatus::Streaming(session_id),
            created_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, MessageStatus::Error(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            MessageStatus::Error(message) => Some(message),
            MessageStatus::Done | MessageStatus::Streaming(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_starts_empty_and_streaming() {
        let session = StreamSessionId::new(7);
        let message = Message::assistant_streaming(MessageId::new(2), session);

        assert_eq!(message.role, Role::Assistant);
        assert!(message.content.is_empty());
        assert_eq!(message.status, MessageStatus::Streaming(session));
        assert!(!message.is_error());
    }

    #[test]
    fn error_status_exposes_the_message() {
        let mut message = Message::assistant_streaming(MessageId::new(1), StreamSessionId::new(1));
        message.status = MessageStatus::Error("boom".to_string());

        assert!(message.is_error());
        assert_eq!(message.error_message(), Some("boom"));
    }

    #[test]
    fn attachment_source_prefers_hosted_url() {
        let attachment = FileAttachment {
            id: "f1".into(),
            name: "cat.png".into(),
            mime_type: "image/png".into(),
            size: 3,
            url: Some("https://example.com/cat.png".into()),
            data: Some("data:image/png;base64,aGk=".into()),
        };

        assert!(attachment.is_image());
        assert_eq!(attachment.source(), Some("https://example.com/cat.png"));
    }
}
