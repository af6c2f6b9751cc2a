//! Delimiter-based frame extraction from raw transport chunks.
//!
//! The transport gives no framing guarantee: a delimiter or a multi-byte
//! character may straddle two chunks. `FrameDecoder` owns one rolling text
//! buffer per stream instance plus the carry-over state needed to decode
//! UTF-8 incrementally.

/// Frame delimiter emitted by the backend after every frame.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Incremental splitter turning arbitrary byte chunks into delimited frames.
///
/// The buffer only grows until a delimiter is found, then shrinks by exactly
/// the consumed prefix (delimiter inclusive). No frame is emitted twice and
/// no byte is dropped except delimiter bytes.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: String,
    carry: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder for one stream instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk, returning every frame it completes, in order.
    ///
    /// Text after the last delimiter is retained for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode_chunk(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.find(FRAME_DELIMITER) {
            frames.push(self.buf[..pos].to_string());
            self.buf.drain(..pos + FRAME_DELIMITER.len());
        }
        frames
    }

    /// Decode `chunk` (prefixed by any carried bytes) into the text buffer.
    ///
    /// An incomplete trailing sequence is carried to the next push; a
    /// genuinely invalid sequence becomes U+FFFD and decoding continues.
    fn decode_chunk(&mut self, chunk: &[u8]) {
        let owned;
        let mut rest: &[u8] = if self.carry.is_empty() {
            chunk
        } else {
            let mut bytes = std::mem::take(&mut self.carry);
            bytes.extend_from_slice(chunk);
            owned = bytes;
            &owned
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buf.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    self.buf.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        // May complete once the next chunk arrives.
                        None => {
                            self.carry = tail.to_vec();
                            return;
                        }
                        Some(len) => {
                            self.buf.push('\u{FFFD}');
                            rest = &tail[len..];
                        }
                    }
                }
            }
        }
    }

    /// Unterminated frame text currently held for the next chunk.
    pub fn pending(&self) -> &str {
        &self.buf
    }

    /// Flush any trailing unterminated frame at end of stream.
    ///
    /// Carried bytes that never completed decode as U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if !self.carry.is_empty() {
            self.carry.clear();
            self.buf.push('\u{FFFD}');
        }
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}
