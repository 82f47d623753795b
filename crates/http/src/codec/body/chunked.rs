//! Chunked transfer-encoding codec (RFC 7230 section 4.1).
//!
//! A chunked payload is a sequence of `size CRLF data CRLF` units in which
//! the size is hexadecimal, terminated by a zero-sized chunk and a final
//! CRLF. Chunk extensions and trailer fields are tolerated and discarded.

use bytes::{Buf, Bytes, BytesMut};
use std::io::Write;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::BufWriter;
use crate::protocol::{ParseError, PayloadItem, SendError};

/// Streaming decoder for chunked payloads.
///
/// Bytes are consumed incrementally: the decoder yields a `Chunk` as soon
/// as any part of a chunk's data is available and keeps its position across
/// calls, so a chunk split over several reads is handled transparently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDecoder {
    state: State,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accumulating hex digits of the chunk size.
    Size,
    /// Whitespace between the size and the end of the size line.
    SizeWs,
    /// Inside a chunk extension; ignored until CR.
    Extension,
    /// Expecting the LF that closes the size line.
    SizeLf,
    /// Consuming chunk data.
    Data,
    /// Expecting the CR after chunk data.
    DataCr,
    /// Expecting the LF after chunk data.
    DataLf,
    /// Inside a trailer field; ignored until CR.
    Trailer,
    /// Expecting the LF that closes a trailer field.
    TrailerLf,
    /// Expecting the CR of the closing CRLF.
    FinalCr,
    /// Expecting the LF of the closing CRLF.
    FinalLf,
    /// The terminating chunk has been fully consumed.
    Finished,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Ok(None);
        }
        $src.get_u8()
    }};
}

impl Decoder for ChunkDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == State::Finished {
                trace!("chunked payload complete");
                return Ok(Some(PayloadItem::Eof));
            }

            if let Some(bytes) = self.step(src)? {
                trace!(len = bytes.len(), "decoded chunk data");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }

            if src.is_empty() && self.state != State::Finished {
                return Ok(None);
            }
        }
    }
}

impl ChunkDecoder {
    /// Advances the state machine by one byte (or one run of data bytes).
    /// Returns decoded chunk data when available; `Ok(None)` means the
    /// state advanced without producing data.
    #[allow(clippy::too_many_lines, reason = "one arm per protocol state")]
    fn step(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ParseError> {
        match self.state {
            State::Size => {
                let b = next_byte!(src);
                let digit = match b {
                    b'0'..=b'9' => u64::from(b - b'0'),
                    b'a'..=b'f' => u64::from(b - b'a' + 10),
                    b'A'..=b'F' => u64::from(b - b'A' + 10),
                    b'\t' | b' ' => {
                        self.state = State::SizeWs;
                        return Ok(None);
                    }
                    b';' => {
                        self.state = State::Extension;
                        return Ok(None);
                    }
                    b'\r' => {
                        self.state = State::SizeLf;
                        return Ok(None);
                    }
                    _ => return Err(ParseError::invalid_body("invalid character in chunk size")),
                };

                self.remaining = self
                    .remaining
                    .checked_mul(16)
                    .and_then(|size| size.checked_add(digit))
                    .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))?;
                Ok(None)
            }

            State::SizeWs => {
                match next_byte!(src) {
                    b'\t' | b' ' => {}
                    b';' => self.state = State::Extension,
                    b'\r' => self.state = State::SizeLf,
                    _ => return Err(ParseError::invalid_body("invalid whitespace after chunk size")),
                }
                Ok(None)
            }

            State::Extension => {
                // Extensions are ignored wholesale, but a bare LF inside one
                // is rejected so sloppy peers cannot smuggle a line ending.
                match next_byte!(src) {
                    b'\r' => self.state = State::SizeLf,
                    b'\n' => return Err(ParseError::invalid_body("bare LF inside chunk extension")),
                    _ => {}
                }
                Ok(None)
            }

            State::SizeLf => {
                match next_byte!(src) {
                    b'\n' => {
                        self.state = if self.remaining == 0 { State::FinalCr } else { State::Data };
                    }
                    _ => return Err(ParseError::invalid_body("chunk size line not terminated by CRLF")),
                }
                Ok(None)
            }

            State::Data => {
                if src.is_empty() {
                    return Ok(None);
                }
                if self.remaining == 0 {
                    self.state = State::DataCr;
                    return Ok(None);
                }

                let take = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(src.len());
                self.remaining -= take as u64;
                if self.remaining == 0 {
                    self.state = State::DataCr;
                }
                Ok(Some(src.split_to(take).freeze()))
            }

            State::DataCr => {
                match next_byte!(src) {
                    b'\r' => self.state = State::DataLf,
                    _ => return Err(ParseError::invalid_body("chunk data not terminated by CR")),
                }
                Ok(None)
            }

            State::DataLf => {
                match next_byte!(src) {
                    b'\n' => self.state = State::Size,
                    _ => return Err(ParseError::invalid_body("chunk data not terminated by LF")),
                }
                Ok(None)
            }

            State::Trailer => {
                match next_byte!(src) {
                    b'\r' => self.state = State::TrailerLf,
                    _ => {}
                }
                Ok(None)
            }

            State::TrailerLf => {
                match next_byte!(src) {
                    b'\n' => self.state = State::FinalCr,
                    _ => return Err(ParseError::invalid_body("trailer field not terminated by CRLF")),
                }
                Ok(None)
            }

            State::FinalCr => {
                // Anything other than the closing CR starts a trailer field.
                match next_byte!(src) {
                    b'\r' => self.state = State::FinalLf,
                    _ => self.state = State::Trailer,
                }
                Ok(None)
            }

            State::FinalLf => {
                match next_byte!(src) {
                    b'\n' => self.state = State::Finished,
                    _ => return Err(ParseError::invalid_body("chunked payload not terminated by CRLF")),
                }
                Ok(None)
            }

            State::Finished => Ok(None),
        }
    }
}

/// Encoder producing chunked framing from payload items.
///
/// Empty chunks are suppressed — a zero-sized chunk would terminate the
/// payload prematurely. `Eof` emits the terminating chunk exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEncoder {
    finished: bool,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self { finished: false }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<PayloadItem> for ChunkEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.finished {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                write!(BufWriter(dst), "{:X}\r\n", bytes.len())?;
                dst.reserve(bytes.len() + 2);
                dst.extend_from_slice(&bytes);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.finished = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}
