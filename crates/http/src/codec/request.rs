//! Whole-request codecs: the server-side decoder and client-side encoder.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::error;

use crate::codec::body::{BodyDecoder, BodyEncoder};
use crate::codec::head::{RequestHeadDecoder, RequestHeadEncoder};
use crate::protocol::{BodyKind, Message, ParseError, PayloadItem, RequestHead, SendError};

/// Server-side decoder for complete requests.
///
/// Two-phase state machine: while no body decoder is installed the head
/// decoder runs; once a head with a non-empty body has been produced, the
/// matching [`BodyDecoder`] consumes payload until `Eof`, after which the
/// decoder flips back to head mode. Requests without a body never install
/// a payload phase, so the next head can be decoded immediately.
pub struct RequestDecoder {
    head_decoder: RequestHeadDecoder,
    body_decoder: Option<BodyDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { head_decoder: RequestHeadDecoder, body_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, BodyKind)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(body_decoder) = &mut self.body_decoder {
            let message = match body_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.body_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        let message = match self.head_decoder.decode(src)? {
            Some((head, kind)) => {
                if !kind.is_empty() {
                    self.body_decoder = Some(kind.into());
                }
                Some(Message::Head((head, kind)))
            }
            None => None,
        };

        Ok(message)
    }
}

/// Client-side encoder for complete requests.
///
/// Accepts a head followed by payload items; installs the payload encoder
/// matching the head's [`BodyKind`] and removes it once the payload is
/// finished. Feeding items out of order is a caller bug and is rejected.
pub struct RequestEncoder {
    head_encoder: RequestHeadEncoder,
    body_encoder: Option<BodyEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestEncoder {
    fn default() -> Self {
        Self { head_encoder: RequestHeadEncoder, body_encoder: None }
    }
}

impl Encoder<Message<(RequestHead, BodyKind)>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(RequestHead, BodyKind)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Head((head, kind)) => {
                if self.body_encoder.is_some() {
                    error!("request head encoded while the previous payload is unfinished");
                    return Err(SendError::invalid_body("previous request payload unfinished"));
                }

                if !kind.is_empty() {
                    self.body_encoder = Some(kind.into());
                }
                self.head_encoder.encode((head, kind), dst)
            }

            Message::Payload(item) => {
                let Some(encoder) = &mut self.body_encoder else {
                    // A bodyless request has no payload phase; a bare Eof is
                    // harmless there, anything else is a caller bug.
                    if item.is_eof() {
                        return Ok(());
                    }
                    error!("request payload encoded without a preceding head");
                    return Err(SendError::invalid_body("payload without request head"));
                };

                let is_eof = item.is_eof();
                let result = encoder.encode(item, dst);
                if result.is_ok() && is_eof {
                    self.body_encoder.take();
                }
                result
            }
        }
    }
}
