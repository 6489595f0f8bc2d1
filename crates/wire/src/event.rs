use serde::{Deserialize, Serialize};

/// Literal prefix of every SSE record the proxy emits.
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Blank-line separator terminating one SSE record.
pub const RECORD_SEPARATOR: &str = "\n\n";

/// One tool invocation reported by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One wire-level event on the proxy-to-client stream.
///
/// The union is closed on purpose: unknown record shapes are the decoder's
/// problem (it skips them), never a fourth variant here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Content {
        content: String,
    },
    ToolCalls {
        #[serde(rename = "toolCalls")]
        tool_calls: Vec<ToolCall>,
    },
    Done {
        #[serde(rename = "finishReason")]
        finish_reason: String,
    },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            content: text.into(),
        }
    }

    pub fn done(reason: impl Into<String>) -> Self {
        Self::Done {
            finish_reason: reason.into(),
        }
    }

    /// Returns true for the terminal `done` event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Encodes this event as one complete SSE record, separator included.
    pub fn to_sse_record(&self) -> String {
        let json = serde_json::to_string(self).expect("wire events serialize infallibly");
        format!("{SSE_DATA_PREFIX}{json}{RECORD_SEPARATOR}")
    }
}

/// Failure to parse the payload of a `data: ` record.
#[derive(Debug)]
pub struct SseRecordError {
    pub source: serde_json::Error,
}

impl std::fmt::Display for SseRecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed stream event payload: {}", self.source)
    }
}

impl std::error::Error for SseRecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Parses one complete SSE record (separator already stripped).
///
/// Records without the `data: ` prefix parse to `None`; that is the
/// forward-compatible no-op path, not an error.
pub fn parse_sse_record(record: &str) -> Result<Option<StreamEvent>, SseRecordError> {
    let Some(payload) = record.strip_prefix(SSE_DATA_PREFIX) else {
        return Ok(None);
    };

    serde_json::from_str(payload)
        .map(Some)
        .map_err(|source| SseRecordError { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_the_wire_field_names() {
        let json = serde_json::to_string(&StreamEvent::content("Hi")).unwrap();
        assert_eq!(json, r#"{"type":"content","content":"Hi"}"#);

        let json = serde_json::to_string(&StreamEvent::done("stop")).unwrap();
        assert_eq!(json, r#"{"type":"done","finishReason":"stop"}"#);

        let event = StreamEvent::ToolCalls {
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: "lookup".to_string(),
                arguments: serde_json::json!({"query": "weather"}),
            }],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with(r#"{"type":"tool_calls","toolCalls":["#));
    }

    #[test]
    fn record_round_trips_multi_byte_text() {
        let event = StreamEvent::content("héllo");
        let record = event.to_sse_record();
        assert!(record.ends_with(RECORD_SEPARATOR));

        let stripped = record.strip_suffix(RECORD_SEPARATOR).unwrap();
        let decoded = parse_sse_record(stripped).unwrap();
        assert_eq!(decoded, Some(event));
    }

    #[test]
    fn non_data_records_are_skipped() {
        assert_eq!(parse_sse_record(": keep-alive").unwrap(), None);
        assert_eq!(parse_sse_record("event: ping").unwrap(), None);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(parse_sse_record("data: {\"type\":").is_err());
    }

    #[test]
    fn only_done_is_terminal() {
        assert!(StreamEvent::done("stop").is_terminal());
        assert!(!StreamEvent::content("x").is_terminal());
    }
}
