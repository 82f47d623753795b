//! Whole-response codecs: the server-side encoder and client-side decoder.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::error;

use crate::codec::body::{BodyDecoder, BodyEncoder};
use crate::codec::head::{ResponseHeadDecoder, ResponseHeadEncoder};
use crate::protocol::{BodyKind, Message, ParseError, PayloadItem, ResponseHead, SendError};

/// Server-side encoder for complete responses.
///
/// Accepts a head followed by payload items. The payload encoder is
/// selected from the head's [`BodyKind`] and dropped once the payload ends,
/// leaving the encoder ready for the next exchange on a keep-alive
/// connection.
pub struct ResponseEncoder {
    head_encoder: ResponseHeadEncoder,
    body_encoder: Option<BodyEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { head_encoder: ResponseHeadEncoder, body_encoder: None }
    }
}

impl Encoder<Message<(ResponseHead, BodyKind)>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, BodyKind)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Head((head, kind)) => {
                if self.body_encoder.is_some() {
                    error!("response head encoded while the previous payload is unfinished");
                    return Err(SendError::invalid_body("previous response payload unfinished"));
                }

                if !kind.is_empty() {
                    self.body_encoder = Some(kind.into());
                }
                self.head_encoder.encode((head, kind), dst)
            }

            Message::Payload(item) => {
                let Some(encoder) = &mut self.body_encoder else {
                    // An empty response has no payload phase; a bare Eof is
                    // harmless there, anything else is a caller bug.
                    if item.is_eof() {
                        return Ok(());
                    }
                    error!("response payload encoded without a preceding head");
                    return Err(SendError::invalid_body("payload without response head"));
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

/// Client-side decoder for complete responses.
///
/// Two-phase like the request decoder, with one extra rule: interim (1xx)
/// heads never install a payload phase, so the decoder is immediately
/// ready for the head that follows them.
pub struct ResponseDecoder {
    head_decoder: ResponseHeadDecoder,
    body_decoder: Option<BodyDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self { head_decoder: ResponseHeadDecoder, body_decoder: None }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, BodyKind)>;
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
                if !head.status().is_informational() && !kind.is_empty() {
                    self.body_decoder = Some(kind.into());
                }
                Some(Message::Head((head, kind)))
            }
            None => None,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Response, StatusCode};

    #[test]
    fn encodes_sized_response() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();

        let mut wire = BytesMut::new();
        let mut encoder = ResponseEncoder::new();
        encoder.encode(Message::Head((head, BodyKind::Sized(2))), &mut wire).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hi"))), &mut wire).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Eof), &mut wire).unwrap();

        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nhi"));
    }

    #[test]
    fn encodes_chunked_response() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();

        let mut wire = BytesMut::new();
        let mut encoder = ResponseEncoder::new();
        encoder.encode(Message::Head((head, BodyKind::Chunked)), &mut wire).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello"))), &mut wire).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Eof), &mut wire).unwrap();

        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.contains("transfer-encoding: chunked\r\n"));
        assert!(text.ends_with("5\r\nhello\r\n0\r\n\r\n"));
    }

    #[test]
    fn empty_response_tolerates_trailing_eof() {
        let head = Response::builder().status(StatusCode::NOT_FOUND).body(()).unwrap();

        let mut wire = BytesMut::new();
        let mut encoder = ResponseEncoder::new();
        encoder.encode(Message::Head((head, BodyKind::Empty)), &mut wire).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Eof), &mut wire).unwrap();

        assert!(std::str::from_utf8(&wire).unwrap().contains("content-length: 0\r\n"));
    }

    #[test]
    fn decodes_sized_response_body() {
        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"[..]);
        let mut decoder = ResponseDecoder::new();

        let Message::Head((head, kind)) = decoder.decode(&mut src).unwrap().unwrap() else {
            panic!("expected head");
        };
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(kind, BodyKind::Sized(5));

        let chunk = decoder.decode(&mut src).unwrap().unwrap().into_payload().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().as_ref(), b"hello");
        assert!(decoder.decode(&mut src).unwrap().unwrap().into_payload().unwrap().is_eof());
    }

    #[test]
    fn interim_head_does_not_enter_payload_phase() {
        let wire = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
        let mut src = BytesMut::from(&wire[..]);
        let mut decoder = ResponseDecoder::new();

        let Message::Head((interim, _)) = decoder.decode(&mut src).unwrap().unwrap() else {
            panic!("expected head");
        };
        assert_eq!(interim.status(), StatusCode::CONTINUE);

        let Message::Head((finalhead, kind)) = decoder.decode(&mut src).unwrap().unwrap() else {
            panic!("expected head");
        };
        assert_eq!(finalhead.status(), StatusCode::OK);
        assert_eq!(kind, BodyKind::Sized(2));
    }
}
