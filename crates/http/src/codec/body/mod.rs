//! Payload codecs.
//!
//! [`BodyDecoder`] and [`BodyEncoder`] dispatch over the three body
//! framings: `Content-Length` ([`SizedDecoder`]/[`SizedEncoder`]), chunked
//! transfer encoding ([`ChunkDecoder`]/[`ChunkEncoder`]) and no body at
//! all. Which variant applies is decided once per message from the parsed
//! [`BodyKind`](crate::protocol::BodyKind).

mod chunked;
pub use chunked::ChunkDecoder;
pub use chunked::ChunkEncoder;

mod sized;
pub use sized::SizedDecoder;
pub use sized::SizedEncoder;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::{BodyKind, ParseError, PayloadItem, SendError};

/// Decoder for a message payload, selected from the body framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDecoder {
    repr: DecoderRepr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DecoderRepr {
    Sized(SizedDecoder),
    Chunked(ChunkDecoder),
    None,
}

impl From<BodyKind> for BodyDecoder {
    fn from(kind: BodyKind) -> Self {
        let repr = match kind {
            BodyKind::Empty => DecoderRepr::None,
            BodyKind::Sized(n) => DecoderRepr::Sized(SizedDecoder::new(n)),
            BodyKind::Chunked => DecoderRepr::Chunked(ChunkDecoder::new()),
        };
        Self { repr }
    }
}

impl Decoder for BodyDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.repr {
            DecoderRepr::Sized(decoder) => decoder.decode(src),
            DecoderRepr::Chunked(decoder) => decoder.decode(src),
            DecoderRepr::None => Ok(Some(PayloadItem::Eof)),
        }
    }
}

/// Encoder for a message payload, selected from the body framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyEncoder {
    repr: EncoderRepr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EncoderRepr {
    Sized(SizedEncoder),
    Chunked(ChunkEncoder),
    None,
}

impl From<BodyKind> for BodyEncoder {
    fn from(kind: BodyKind) -> Self {
        let repr = match kind {
            BodyKind::Empty => EncoderRepr::None,
            BodyKind::Sized(n) => EncoderRepr::Sized(SizedEncoder::new(n)),
            BodyKind::Chunked => EncoderRepr::Chunked(ChunkEncoder::new()),
        };
        Self { repr }
    }
}

impl BodyEncoder {
    /// Whether the payload has been completely written.
    pub fn is_finished(&self) -> bool {
        match &self.repr {
            EncoderRepr::Sized(encoder) => encoder.is_finished(),
            EncoderRepr::Chunked(encoder) => encoder.is_finished(),
            EncoderRepr::None => true,
        }
    }
}

impl Encoder<PayloadItem> for BodyEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.repr {
            EncoderRepr::Sized(encoder) => encoder.encode(item, dst),
            EncoderRepr::Chunked(encoder) => encoder.encode(item, dst),
            EncoderRepr::None => Ok(()),
        }
    }
}
