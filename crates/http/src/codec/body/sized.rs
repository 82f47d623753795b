//! Content-Length payload codec (RFC 7230 section 3.3.2).

use bytes::BytesMut;
use std::cmp;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::{ParseError, PayloadItem, SendError};

/// Decoder for a payload framed by `Content-Length`.
///
/// At most `remaining` bytes are ever taken from the buffer; once the
/// declared length has been consumed the decoder reports `Eof` without
/// touching whatever follows (typically the next message head).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedDecoder {
    remaining: u64,
}

impl SizedDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl Decoder for SizedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let take = cmp::min(self.remaining, src.len() as u64) as usize;
        let bytes = src.split_to(take).freeze();
        self.remaining -= bytes.len() as u64;

        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

/// Encoder for a payload framed by `Content-Length`.
///
/// The serializer must write exactly the declared number of bytes: writing
/// past the declared length is truncated with an error, and an `Eof` before
/// the length is reached is an error as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedEncoder {
    remaining: u64,
}

impl SizedEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

impl Encoder<PayloadItem> for SizedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                if bytes.len() as u64 > self.remaining {
                    return Err(SendError::invalid_body("body longer than declared content-length"));
                }
                dst.extend_from_slice(&bytes);
                self.remaining -= bytes.len() as u64;
                Ok(())
            }
            PayloadItem::Eof => {
                if self.remaining > 0 {
                    return Err(SendError::invalid_body("body shorter than declared content-length"));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn decoder_stops_at_declared_length() {
        let mut src = BytesMut::from(&b"0123456789extra"[..]);
        let mut decoder = SizedDecoder::new(10);

        let chunk = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().as_ref(), b"0123456789");

        assert!(decoder.decode(&mut src).unwrap().unwrap().is_eof());
        assert_eq!(&src[..], b"extra");
    }

    #[test]
    fn decoder_accumulates_partial_reads() {
        let mut src = BytesMut::from(&b"01234"[..]);
        let mut decoder = SizedDecoder::new(10);

        let chunk = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().len(), 5);
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(b"56789");
        let chunk = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().as_ref(), b"56789");
        assert!(decoder.decode(&mut src).unwrap().unwrap().is_eof());
    }

    #[test]
    fn encoder_writes_exact_length() {
        let mut dst = BytesMut::new();
        let mut encoder = SizedEncoder::new(5);

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"hello");
        assert!(encoder.is_finished());
    }

    #[test]
    fn encoder_rejects_overflow() {
        let mut dst = BytesMut::new();
        let mut encoder = SizedEncoder::new(3);

        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).is_err());
    }

    #[test]
    fn encoder_rejects_short_body() {
        let mut dst = BytesMut::new();
        let mut encoder = SizedEncoder::new(10);

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        assert!(encoder.encode(PayloadItem::Eof, &mut dst).is_err());
    }
}
