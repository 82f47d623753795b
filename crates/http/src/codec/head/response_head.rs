//! Response-head codecs: the server-side serializer and the client-side
//! parser.

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Response, StatusCode, Version, header};
use httparse::Status;
use std::io::Write;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{error, trace};

use crate::codec::BufWriter;
use crate::codec::head::request_head::chunked_is_final;
use crate::codec::head::{EMPTY_SPAN, HeaderSpan, INIT_HEAD_SIZE, MAX_HEAD_BYTES, MAX_HEADERS};
use crate::ensure;
use crate::protocol::{BodyKind, ParseError, ResponseHead, SendError};

/// Server-side encoder for response heads.
///
/// Writes the status line and headers, replacing or inserting the framing
/// header that matches the [`BodyKind`]. An empty body is advertised as
/// `Content-Length: 0` so keep-alive peers know the message is complete.
pub struct ResponseHeadEncoder;

impl Encoder<(ResponseHead, BodyKind)> for ResponseHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, BodyKind), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, kind) = item;
        let mut head = head;

        dst.reserve(INIT_HEAD_SIZE);

        match head.version() {
            Version::HTTP_11 => {
                let status = head.status();
                write!(BufWriter(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;
            }
            v => {
                error!(version = ?v, "cannot serialize response for unsupported http version");
                return Err(SendError::io(std::io::Error::from(std::io::ErrorKind::Unsupported)));
            }
        }

        match kind {
            BodyKind::Sized(n) => {
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
            BodyKind::Chunked => {
                head.headers_mut().insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            BodyKind::Empty => {
                head.headers_mut().insert(header::CONTENT_LENGTH, 0.into());
            }
        }

        for (name, value) in head.headers() {
            dst.extend_from_slice(name.as_ref());
            dst.extend_from_slice(b": ");
            dst.extend_from_slice(value.as_ref());
            dst.extend_from_slice(b"\r\n");
        }
        dst.extend_from_slice(b"\r\n");

        Ok(())
    }
}

/// Client-side decoder for response heads.
///
/// Mirrors [`RequestHeadDecoder`](super::RequestHeadDecoder): same limits,
/// same zero-copy header handling. Interim (1xx) responses are produced
/// like any other head, with an empty body; the client connection decides
/// what to do with them.
pub struct ResponseHeadDecoder;

impl Decoder for ResponseHeadDecoder {
    type Item = (ResponseHead, BodyKind);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Not even a full status line yet; don't bother parsing.
        if src.len() < 14 {
            return Ok(None);
        }

        let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut header_buf);

        let status = parsed.parse(src).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::TooManyHeaders { limit: MAX_HEADERS },
            e => ParseError::invalid_head(e.to_string()),
        })?;

        let head_len = match status {
            Status::Complete(head_len) => head_len,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEAD_BYTES, ParseError::HeadTooLarge { size: src.len(), limit: MAX_HEAD_BYTES });
                return Ok(None);
            }
        };

        trace!(head_len, "parsed response head");
        ensure!(head_len <= MAX_HEAD_BYTES, ParseError::HeadTooLarge { size: head_len, limit: MAX_HEAD_BYTES });

        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            other => return Err(ParseError::InvalidVersion(other)),
        };

        let status_code = StatusCode::from_u16(parsed.code.ok_or_else(|| ParseError::invalid_head("missing status code"))?)
            .map_err(|e| ParseError::invalid_head(e.to_string()))?;

        let header_count = parsed.headers.len();
        let mut spans = [EMPTY_SPAN; MAX_HEADERS];
        HeaderSpan::record(src, parsed.headers, &mut spans);

        let head_bytes = src.split_to(head_len).freeze();

        let mut builder = Response::builder().status(status_code).version(version);
        let headers = builder.headers_mut().expect("freshly built response cannot carry an error");
        headers.reserve(header_count);

        for span in &spans[..header_count] {
            let name = HeaderName::from_bytes(&head_bytes[span.name.0..span.name.1])
                .map_err(|e| ParseError::invalid_head(e.to_string()))?;
            let value = HeaderValue::from_maybe_shared(head_bytes.slice(span.value.0..span.value.1))
                .map_err(|e| ParseError::invalid_head(e.to_string()))?;
            headers.append(name, value);
        }

        let head = builder.body(()).expect("validated response parts");
        let kind = response_body_framing(&head)?;

        Ok(Some((head, kind)))
    }
}

/// Determines the body framing of a response.
///
/// Interim, `204` and `304` responses never carry a body. Otherwise
/// chunked transfer encoding wins over `Content-Length`, and a response
/// with neither framing header is treated as having no readable body.
fn response_body_framing(head: &ResponseHead) -> Result<BodyKind, ParseError> {
    let status = head.status();
    if status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return Ok(BodyKind::Empty);
    }

    if head.headers().get(header::TRANSFER_ENCODING).is_some_and(chunked_is_final) {
        return Ok(BodyKind::Chunked);
    }

    if let Some(cl) = head.headers().get(header::CONTENT_LENGTH) {
        let text = cl.to_str().map_err(|_| ParseError::invalid_content_length("value is not visible ascii"))?;
        let length = text
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseError::invalid_content_length(format!("value {text} is not a u64")))?;
        return if length == 0 { Ok(BodyKind::Empty) } else { Ok(BodyKind::Sized(length)) };
    }

    Ok(BodyKind::Empty)
}
