//! rill-wire: chat stream wire protocol
//!
//! Decodes the backend's delimited text-frame stream (`data: <json>\n\n`)
//! into typed events, independent of how the raw transport chunks it.

pub mod event;
pub mod frame;
pub mod stream;

pub use event::{ContextUsage, StreamEvent};
pub use frame::FrameDecoder;
pub use stream::{StreamEventStream, decode_stream};
