mod client;
mod message;
mod settings;
mod store;

pub use client::{
    ChatTransport, ChunkStream, DecodeError, HttpChatApi, MAX_RECORD_BYTES, SseDecoder,
    TransportError,
};
pub use message::{FileAttachment, Message, MessageId, MessageStatus, Role, StreamSessionId};
pub use settings::{ChatSettings, DEFAULT_MODEL};
pub use store::{ChatStore, SendOutcome};
