//! Forwarding streamed text to a caller-supplied handler with backpressure.

use std::future::Future;

use futures_util::StreamExt;
use tracing::debug;

use crate::accumulator::ResponseAccumulator;
use crate::error::BoxError;
use crate::{CompleteResponse, Error, Response, StreamEvent};

/// Receives text deltas as they stream in.
///
/// The next upstream event is not read until `on_delta` returns, so a slow
/// handler slows the stream down instead of buffering it.
#[async_trait::async_trait]
pub trait StreamHandler: Send {
    async fn on_delta(&mut self, delta: &str) -> Result<(), BoxError>;
}

#[async_trait::async_trait]
impl<F, Fut, E> StreamHandler for F
where
    F: FnMut(String) -> Fut + Send,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn on_delta(&mut self, delta: &str) -> Result<(), BoxError> {
        (self)(delta.to_string()).await.map_err(Into::into)
    }
}

/// Drives provider streams through a [`StreamHandler`], one event at a time.
///
/// One aggregator spans every provider call of a resolution loop, so
/// [`text`](Self::text) is everything the handler was given.
pub struct StreamAggregator<H> {
    handler: H,
    text: String,
    deltas: usize,
}

impl<H: StreamHandler> StreamAggregator<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            text: String::new(),
            deltas: 0,
        }
    }

    /// Consume one provider response.
    ///
    /// Tool call events are buffered in the returned response. A handler
    /// failure stops reading immediately and yields [`Error::Consumer`].
    pub async fn consume(&mut self, response: Response) -> Result<CompleteResponse, Error> {
        let mut stream = response.stream();
        let mut accumulator = ResponseAccumulator::new();

        while let Some(event) = stream.next().await {
            let event = event?;
            if let StreamEvent::ContentDelta { delta } = &event {
                self.handler.on_delta(delta).await.map_err(Error::Consumer)?;
                self.text.push_str(delta);
                self.deltas += 1;
            }
            accumulator.process_event(event)?;
            if accumulator.is_done() {
                break;
            }
        }

        debug!(deltas = self.deltas, "Stream consumed");
        accumulator.finalize()
    }

    /// All text delivered to the handler so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
