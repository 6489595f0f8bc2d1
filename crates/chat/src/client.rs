use banter_wire::{ChatRequest, SseRecordError, StreamEvent};
use futures::StreamExt;
use futures::stream::BoxStream;
use snafu::{ResultExt, Snafu};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Upper bound on bytes buffered without a record separator.
///
/// Wire records are a few KB at most; only a broken upstream that never
/// sends a separator can reach this.
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("buffered {buffered} bytes without a record separator (limit {limit})"))]
    RecordTooLarge { buffered: usize, limit: usize },
    #[snafu(display("record is not valid UTF-8: {source}"))]
    InvalidUtf8 { source: std::str::Utf8Error },
    #[snafu(display("{source}"))]
    MalformedEvent { source: SseRecordError },
}

/// Incremental SSE record decoder.
///
/// Bytes are accumulated until a blank-line separator completes a record,
/// so a logical record may span any number of physical reads and one read
/// may carry any number of records. Splitting happens at the byte level,
/// which keeps multi-byte UTF-8 sequences intact across read boundaries.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly read bytes and drains every complete record.
    ///
    /// Records without the `data: ` prefix are skipped silently; a record
    /// that fails to parse as a stream event is an error.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>, DecodeError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(separator) = find_record_separator(&self.buffer) {
            let record: Vec<u8> = self.buffer.drain(..separator + 2).collect();
            let record = std::str::from_utf8(&record[..separator]).context(InvalidUtf8Snafu)?;

            if let Some(event) =
                banter_wire::parse_sse_record(record).context(MalformedEventSnafu)?
            {
                events.push(event);
            }
        }

        snafu::ensure!(
            self.buffer.len() <= MAX_RECORD_BYTES,
            RecordTooLargeSnafu {
                buffered: self.buffer.len(),
                limit: MAX_RECORD_BYTES,
            }
        );

        Ok(events)
    }
}

fn find_record_separator(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

#[derive(Debug, Snafu)]
pub enum TransportError {
    #[snafu(display("http request failed on `{stage}`, {source}"))]
    Http {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("chat endpoint returned status {status}"))]
    EndpointStatus { status: u16 },
    #[snafu(display("stream decode failed: {source}"))]
    Decode { source: DecodeError },
}

/// Ordered stream of wire events for one send.
///
/// The stream either ends normally or yields exactly one `Err` and then
/// ends; it never does both.
pub type ChunkStream = BoxStream<'static, Result<StreamEvent, TransportError>>;

/// Seam between the conversation store and the HTTP stream client.
pub trait ChatTransport: Send + Sync {
    fn stream_chat(&self, request: ChatRequest) -> ChunkStream;
}

/// Stream client against the proxy's chat endpoint.
///
/// Holds no per-call state; every send gets a fresh decoder.
pub struct HttpChatApi {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpChatApi {
    /// Creates a client for the given endpoint URL, e.g.
    /// `http://localhost:8080/api/chat`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl ChatTransport for HttpChatApi {
    fn stream_chat(&self, request: ChatRequest) -> ChunkStream {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_transport_worker(http, endpoint, request, event_tx));

        UnboundedReceiverStream::new(event_rx).boxed()
    }
}

async fn run_transport_worker(
    http: reqwest::Client,
    endpoint: String,
    request: ChatRequest,
    event_tx: mpsc::UnboundedSender<Result<StreamEvent, TransportError>>,
) {
    let response = match http
        .post(endpoint.as_str())
        .json(&request)
        .send()
        .await
        .context(HttpSnafu {
            stage: "send-chat-request",
        }) {
        Ok(response) => response,
        Err(error) => {
            let _ = event_tx.send(Err(error));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let _ = event_tx.send(Err(TransportError::EndpointStatus {
            status: status.as_u16(),
        }));
        return;
    }

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    while let Some(read) = body.next().await {
        let bytes = match read.context(HttpSnafu {
            stage: "read-stream-chunk",
        }) {
            Ok(bytes) => bytes,
            Err(error) => {
                let _ = event_tx.send(Err(error));
                return;
            }
        };

        match decoder.feed(&bytes) {
            Ok(events) => {
                for event in events {
                    if event_tx.send(Ok(event)).is_err() {
                        // Receiver dropped: the send was cancelled.
                        debug!("chat stream receiver dropped, closing transport");
                        return;
                    }
                }
            }
            Err(source) => {
                let _ = event_tx.send(Err(TransportError::Decode { source }));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut SseDecoder, reads: &[&[u8]]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for read in reads {
            events.extend(decoder.feed(read).unwrap());
        }
        events
    }

    #[test]
    fn one_read_may_carry_multiple_records() {
        let mut decoder = SseDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[b"data: {\"type\":\"content\",\"content\":\"a\"}\n\ndata: {\"type\":\"content\",\"content\":\"b\"}\n\n"],
        );

        assert_eq!(
            events,
            vec![StreamEvent::content("a"), StreamEvent::content("b")]
        );
    }

    #[test]
    fn a_record_may_span_multiple_reads() {
        let mut decoder = SseDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[
                b"data: {\"typ",
                b"e\":\"content\",\"content\":\"Hi\"}\n\n",
            ],
        );

        assert_eq!(events, vec![StreamEvent::content("Hi")]);
    }

    #[test]
    fn byte_at_a_time_yields_the_same_events() {
        let record = "data: {\"type\":\"content\",\"content\":\"h\\u00e9llo\"}\n\ndata: {\"type\":\"done\",\"finishReason\":\"stop\"}\n\n";

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for byte in record.as_bytes() {
            events.extend(decoder.feed(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(
            events,
            vec![StreamEvent::content("héllo"), StreamEvent::done("stop")]
        );
    }

    #[test]
    fn multi_byte_utf8_survives_a_mid_codepoint_split() {
        // "é" is two bytes; split the record between them.
        let record = StreamEvent::content("héllo").to_sse_record();
        let bytes = record.as_bytes();
        let split = record.find('é').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        let events = feed_all(&mut decoder, &[&bytes[..split], &bytes[split..]]);

        assert_eq!(events, vec![StreamEvent::content("héllo")]);
    }

    #[test]
    fn records_without_the_data_prefix_are_skipped() {
        let mut decoder = SseDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[b": comment\n\ndata: {\"type\":\"content\",\"content\":\"x\"}\n\n"],
        );

        assert_eq!(events, vec![StreamEvent::content("x")]);
    }

    #[test]
    fn malformed_payload_after_the_prefix_is_an_error() {
        let mut decoder = SseDecoder::new();
        let result = decoder.feed(b"data: {\"type\":\n\n");
        assert!(matches!(result, Err(DecodeError::MalformedEvent { .. })));
    }

    #[test]
    fn runaway_record_without_separator_is_bounded() {
        let mut decoder = SseDecoder::new();
        let chunk = vec![b'x'; MAX_RECORD_BYTES + 1];
        let result = decoder.feed(&chunk);
        assert!(matches!(result, Err(DecodeError::RecordTooLarge { .. })));
    }

    #[test]
    fn trailing_partial_record_stays_buffered() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed(b"data: {\"type\":\"content\",\"content\":\"a\"}\n\ndata: {\"type\":\"co")
            .unwrap();

        assert_eq!(events, vec![StreamEvent::content("a")]);
        assert_eq!(
            decoder.feed(b"ntent\",\"content\":\"b\"}\n\n").unwrap(),
            vec![StreamEvent::content("b")]
        );
    }
}
