mod event;
mod request;

pub use event::{
    RECORD_SEPARATOR, SSE_DATA_PREFIX, SseRecordError, StreamEvent, ToolCall, parse_sse_record,
};
pub use request::{ChatRequest, ContentPart, MessageContent, WireMessage, WireRole};
