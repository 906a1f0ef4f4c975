//! Chunk decoding: raw byte fragments to complete protocol frames
//!
//! The backend streams records of the form:
//! ```text
//! data: {"type":"reasoning","content":"Let"}
//!
//! data: {"type":"answer","content":"42"}
//!
//! ```
//! Fragments may split or merge records at any byte. Only lines that are
//! complete are decoded, so the produced frames do not depend on where the
//! transport cut the stream.

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use tokio_stream::Stream;

use crate::error::{Error, Result};

/// Marker that every payload line must begin with
pub const DATA_PREFIX: &str = "data:";

/// One complete record extracted from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload with the prefix removed; multiple data lines joined by `\n`
    pub payload: String,
}

/// A stream of decoded frames
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Incremental frame decoder.
///
/// Feed fragments with [`FrameDecoder::push`]; call [`FrameDecoder::finish`]
/// at end of stream to drop whatever was left unterminated.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes not yet terminated by a newline
    buffer: Vec<u8>,
    /// Data lines of the record currently being assembled
    pending: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a fragment and return every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = &self.buffer[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let line = std::str::from_utf8(line)
                .map_err(|e| Error::protocol(format!("invalid UTF-8 in stream: {}", e)))?;

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
            } else if let Some(data) = line.strip_prefix(DATA_PREFIX) {
                let data = data.strip_prefix(' ').unwrap_or(data);
                self.pending.push(data.to_string());
            } else {
                tracing::trace!("Skipping non-data line: {:?}", line);
            }

            start = end + 1;
        }
        self.buffer.drain(..start);

        Ok(frames)
    }

    /// Signal end of stream.
    ///
    /// Unterminated data is never emitted as a frame. Returns the number of
    /// bytes discarded (buffered line plus pending record lines).
    pub fn finish(self) -> usize {
        let residual =
            self.buffer.len() + self.pending.iter().map(|l| l.len()).sum::<usize>();
        if residual > 0 {
            tracing::debug!("Discarding {} bytes of unterminated stream data", residual);
        }
        residual
    }

    /// Whether any partial data is held back
    pub fn has_residual(&self) -> bool {
        !self.buffer.is_empty() || !self.pending.is_empty()
    }

    fn take_frame(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            return None;
        }
        let payload = self.pending.join("\n");
        self.pending.clear();
        Some(Frame { payload })
    }
}

/// Lazily decode a byte stream into frames.
///
/// A read error is yielded once and ends the frame stream.
pub fn decode_frames<S, B>(byte_stream: S) -> FrameStream
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    Box::pin(stream! {
        let mut decoder = FrameDecoder::new();
        let mut byte_stream = std::pin::pin!(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            match decoder.push(chunk.as_ref()) {
                Ok(frames) => {
                    for frame in frames {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        decoder.finish();
    })
}
