//! Adapter from raw byte-chunk transports to typed event streams.

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use tokio_stream::Stream;

use crate::event::StreamEvent;
use crate::frame::FrameDecoder;

/// A stream of decoded chat events
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Decode a fallible byte-chunk stream (e.g. `reqwest::Response::bytes_stream`)
/// into typed events.
///
/// Malformed frames are dropped without ending the stream. A transport error
/// or a close without an `end` frame becomes a terminal `error` event, so
/// consumers always observe exactly one terminal event.
pub fn decode_stream<S, B, E>(chunks: S) -> StreamEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(stream! {
        let mut chunks = Box::pin(chunks);
        let mut decoder = FrameDecoder::new();

        while let Some(next) = chunks.next().await {
            match next {
                Ok(chunk) => {
                    for frame in decoder.push(chunk.as_ref()) {
                        let Some(event) = StreamEvent::parse(&frame) else {
                            continue;
                        };
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            return;
                        }
                    }
                }
                Err(e) => {
                    yield StreamEvent::Error { error: e.to_string() };
                    return;
                }
            }
        }

        if let Some(rest) = decoder.finish() {
            tracing::warn!(bytes = rest.len(), "stream ended with unterminated frame");
        }
        yield StreamEvent::Error {
            error: "stream closed before end event".to_string(),
        };
    })
}
