//! Server-Sent Events parsing and per-provider event decoding.
//!
//! Every provider streams over SSE. [`SseStream`] turns a byte stream into
//! [`SseEvent`]s; an [`EventDecoder`] turns those into unified
//! [`StreamEvent`]s, and [`decode_sse`] glues the two into a [`Response`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_util::{Stream, StreamExt};
use memchr::{memchr, memmem};

use crate::error::BoxError;
use crate::{Error, Response, StreamEvent};

/// Upper bound on bytes buffered while waiting for an event separator.
const MAX_BUFFER_BYTES: usize = 1_000_000;

/// A Server-Sent Events (SSE) event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
    pub id: Option<String>,
    /// Retry delay in milliseconds
    pub retry: Option<u64>,
}

impl SseEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    pub fn with_type(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            ..Self::new(data)
        }
    }

    /// OpenAI-style end-of-stream sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    /// Parse one event block (the text between two blank lines).
    fn parse(block: &str) -> Option<Self> {
        let mut event_type = None;
        let mut data_lines = Vec::new();
        let mut id = None;
        let mut retry = None;

        for line in block.lines() {
            // Comments start with ':' and carry keep-alives
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event_type = Some(value.to_string()),
                "data" => data_lines.push(value),
                "id" => id = Some(value.to_string()),
                "retry" => retry = value.trim().parse().ok(),
                _ => {}
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
            id,
            retry,
        })
    }
}

/// A stream adapter that parses SSE events from a byte stream.
/// Handles events and UTF-8 sequences split across chunks.
pub struct SseStream<S> {
    inner: S,
    /// Raw bytes not yet terminated by a blank line
    buffer: Vec<u8>,
    events: VecDeque<SseEvent>,
}

impl<S> SseStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            events: VecDeque::new(),
        }
    }

    fn push_chunk(&mut self, chunk: &[u8]) {
        // CRLF framing is folded to LF so one separator search covers both
        if memchr(b'\r', chunk).is_some() {
            self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
        } else {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Move every complete event out of the buffer.
    fn drain_events(&mut self) -> Result<(), Error> {
        let finder = memmem::Finder::new(b"\n\n");
        let mut start = 0;

        while let Some(pos) = finder.find(&self.buffer[start..]) {
            let end = start + pos;
            let block = std::str::from_utf8(&self.buffer[start..end])
                .map_err(|e| Error::streaming(format!("Invalid UTF-8 in SSE event: {e}")))?;
            if let Some(event) = SseEvent::parse(block) {
                self.events.push_back(event);
            }
            start = end + 2;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        Ok(())
    }

    /// The stream ended; whatever is left may be a final event without a
    /// trailing blank line.
    fn take_trailing_event(&mut self) -> Option<SseEvent> {
        let buffer = std::mem::take(&mut self.buffer);
        let text = std::str::from_utf8(&buffer).ok()?.trim();
        if text.is_empty() {
            return None;
        }
        SseEvent::parse(text)
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<BoxError>,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    let e: BoxError = e.into();
                    return Poll::Ready(Some(Err(Error::streaming(format!("Stream error: {e}")))));
                }
                None => return Poll::Ready(self.take_trailing_event().map(Ok)),
            };

            self.push_chunk(&chunk);

            if self.buffer.len() > MAX_BUFFER_BYTES {
                self.buffer.clear();
                return Poll::Ready(Some(Err(Error::streaming(
                    "SSE buffer exceeded maximum size",
                ))));
            }

            if let Err(e) = self.drain_events() {
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

/// Extension trait to add SSE parsing to byte streams.
pub trait SseStreamExt: Stream {
    fn sse_events(self) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::new(self)
    }
}

impl<S: Stream> SseStreamExt for S {}

/// Stateful translation of one provider's SSE events into unified events.
pub trait EventDecoder: Send + 'static {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<StreamEvent>, Error>;

    /// Called once when the byte stream ends.
    fn finish(&mut self) -> Result<Vec<StreamEvent>, Error> {
        Ok(Vec::new())
    }
}

struct DecodeState<S, D> {
    sse: SseStream<S>,
    decoder: D,
    pending: VecDeque<Result<StreamEvent, Error>>,
    finished: bool,
}

/// Build a [`Response`] from a provider's SSE byte stream.
///
/// Events are decoded lazily: nothing is read from the network until the
/// consumer polls. The first error ends the stream.
pub fn decode_sse<S, E, D>(bytes: S, decoder: D) -> Response
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin + Send + 'static,
    E: Into<BoxError> + Send + 'static,
    D: EventDecoder,
{
    let state = DecodeState {
        sse: bytes.sse_events(),
        decoder,
        pending: VecDeque::new(),
        finished: false,
    };

    let events = futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            let decoded = match state.sse.next().await {
                Some(Ok(event)) => state.decoder.decode(&event),
                Some(Err(e)) => Err(e),
                None => {
                    state.finished = true;
                    state.decoder.finish()
                }
            };
            match decoded {
                Ok(events) => state.pending.extend(events.into_iter().map(Ok)),
                Err(e) => {
                    state.pending.push_back(Err(e));
                    state.finished = true;
                }
            }
        }
    });

    Response::from_stream(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FinishReason;
    use futures_util::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>> + Unpin {
        let parts: Vec<_> = parts
            .iter()
            .map(|p| Ok::<_, std::io::Error>(bytes::Bytes::from_static(p)))
            .collect();
        stream::iter(parts)
    }

    #[tokio::test]
    async fn test_sse_stream_complete_events() {
        let mut sse = chunks(&[b"data: Hello\n\ndata: World\n\n"]).sse_events();
        assert_eq!(sse.next().await.unwrap().unwrap().data, "Hello");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "World");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_stream_split_events() {
        let mut sse = chunks(&[b"data: Hel", b"lo World\n\ndata: ", b"Second\n\n"]).sse_events();
        assert_eq!(sse.next().await.unwrap().unwrap().data, "Hello World");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "Second");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_stream_multiline_and_fields() {
        let mut sse = chunks(&[
            b": keep-alive\n\nevent: custom\ndata: Line 1\ndata: Line 2\nid: 123\n\n",
        ])
        .sse_events();
        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.event_type.as_deref(), Some("custom"));
        assert_eq!(event.data, "Line 1\nLine 2");
        assert_eq!(event.id.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_sse_stream_crlf_framing() {
        let mut sse = chunks(&[b"event: ping\r\ndata: {}\r\n\r\ndata: next\r\n\r\n"]).sse_events();
        assert_eq!(sse.next().await.unwrap().unwrap().data, "{}");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "next");
    }

    #[tokio::test]
    async fn test_sse_stream_utf8_boundary() {
        // Euro sign is three bytes: E2 82 AC
        let mut sse = chunks(&[b"data: Price: \xE2\x82", b"\xAC100\n\n"]).sse_events();
        assert_eq!(sse.next().await.unwrap().unwrap().data, "Price: €100");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_stream_invalid_utf8_error() {
        let mut sse = chunks(&[b"data: Valid start \xFF\xFE invalid bytes\n\n"]).sse_events();
        assert!(sse.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_sse_stream_ends_without_final_newline() {
        let mut sse = chunks(&[b"data: First event\n\n", b"data: [DONE]"]).sse_events();
        assert_eq!(sse.next().await.unwrap().unwrap().data, "First event");
        assert!(sse.next().await.unwrap().unwrap().is_done());
        assert!(sse.next().await.is_none());
    }

    /// Emits one delta per event and a terminal event on finish.
    struct EchoDecoder;

    impl EventDecoder for EchoDecoder {
        fn decode(&mut self, event: &SseEvent) -> Result<Vec<StreamEvent>, Error> {
            if event.data == "fail" {
                return Err(Error::provider("Echo", "bad event"));
            }
            Ok(vec![StreamEvent::ContentDelta {
                delta: event.data.clone(),
            }])
        }

        fn finish(&mut self) -> Result<Vec<StreamEvent>, Error> {
            Ok(vec![StreamEvent::done(FinishReason::Stop)])
        }
    }

    #[tokio::test]
    async fn test_decode_sse_runs_finish_hook() {
        let response = decode_sse(chunks(&[b"data: a\n\ndata: b\n\n"]), EchoDecoder);
        let complete = response.buffer().await.unwrap();
        assert_eq!(complete.content(), "ab");
        assert_eq!(complete.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_decode_sse_stops_at_first_error() {
        let response = decode_sse(chunks(&[b"data: a\n\ndata: fail\n\ndata: c\n\n"]), EchoDecoder);
        let events: Vec<_> = response.stream().collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(Error::Provider { .. })));
    }
}
