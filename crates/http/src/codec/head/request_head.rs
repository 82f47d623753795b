//! Request-head codecs: the server-side parser and the client-side
//! serializer.

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Method, Request, Uri, Version, header};
use httparse::Status;
use std::io::Write;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::BufWriter;
use crate::codec::head::{EMPTY_SPAN, HeaderSpan, INIT_HEAD_SIZE, MAX_HEAD_BYTES, MAX_HEADERS};
use crate::ensure;
use crate::protocol::{BodyKind, ParseError, RequestHead, SendError};

/// Server-side decoder for request heads.
///
/// Produces the parsed [`RequestHead`] together with the [`BodyKind`]
/// derived from its framing headers. Enforces [`MAX_HEADERS`] and
/// [`MAX_HEAD_BYTES`] on untrusted input, including while the head is
/// still incomplete.
pub struct RequestHeadDecoder;

impl Decoder for RequestHeadDecoder {
    type Item = (RequestHead, BodyKind);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Not even a full request line yet; don't bother parsing.
        if src.len() < 14 {
            return Ok(None);
        }

        let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_buf);

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

        trace!(head_len, "parsed request head");
        ensure!(head_len <= MAX_HEAD_BYTES, ParseError::HeadTooLarge { size: head_len, limit: MAX_HEAD_BYTES });

        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            other => return Err(ParseError::InvalidVersion(other)),
        };

        let method =
            Method::from_bytes(parsed.method.ok_or(ParseError::InvalidMethod)?.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;

        let uri: Uri = parsed.path.ok_or(ParseError::InvalidUri)?.parse().map_err(|_| ParseError::InvalidUri)?;

        let header_count = parsed.headers.len();
        let mut spans = [EMPTY_SPAN; MAX_HEADERS];
        HeaderSpan::record(src, parsed.headers, &mut spans);

        let head_bytes = src.split_to(head_len).freeze();

        let mut builder = Request::builder().method(method).uri(uri).version(version);
        let headers = builder.headers_mut().expect("freshly built request cannot carry an error");
        headers.reserve(header_count);

        for span in &spans[..header_count] {
            let name = HeaderName::from_bytes(&head_bytes[span.name.0..span.name.1])
                .map_err(|e| ParseError::invalid_head(e.to_string()))?;
            let value = HeaderValue::from_maybe_shared(head_bytes.slice(span.value.0..span.value.1))
                .map_err(|e| ParseError::invalid_head(e.to_string()))?;
            headers.append(name, value);
        }

        let head = RequestHead::from(builder.body(()).expect("validated request parts"));
        let kind = request_body_framing(&head)?;

        Ok(Some((head, kind)))
    }
}

/// Determines the body framing of a request per RFC 9112 section 6.
///
/// `Transfer-Encoding` and `Content-Length` together are rejected; a
/// transfer-encoding whose final token is not `chunked` means the request
/// carries no framed body we can read.
fn request_body_framing(head: &RequestHead) -> Result<BodyKind, ParseError> {
    let te = head.headers().get(header::TRANSFER_ENCODING);
    let cl = head.headers().get(header::CONTENT_LENGTH);

    match (te, cl) {
        (None, None) => Ok(BodyKind::Empty),

        (Some(te), None) => {
            if chunked_is_final(te) {
                Ok(BodyKind::Chunked)
            } else {
                Ok(BodyKind::Empty)
            }
        }

        (None, Some(cl)) => {
            let text = cl.to_str().map_err(|_| ParseError::invalid_content_length("value is not visible ascii"))?;
            let length = text
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {text} is not a u64")))?;
            if length == 0 { Ok(BodyKind::Empty) } else { Ok(BodyKind::Sized(length)) }
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("both transfer-encoding and content-length present"))
        }
    }
}

/// `chunked` must be the final transfer coding to be readable (RFC 9112).
pub(crate) fn chunked_is_final(value: &HeaderValue) -> bool {
    value
        .as_bytes()
        .rsplit(|b| *b == b',')
        .next()
        .is_some_and(|token| token.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

/// Client-side encoder for request heads.
///
/// Serializes the request line and headers, injecting the framing header
/// that matches the [`BodyKind`]: `Content-Length` for sized bodies,
/// `Transfer-Encoding: chunked` for streaming ones, neither when there is
/// no body.
pub struct RequestHeadEncoder;

impl Encoder<(RequestHead, BodyKind)> for RequestHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHead, BodyKind), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, kind) = item;
        let mut head = head;

        dst.reserve(INIT_HEAD_SIZE);

        let target = head.uri().path_and_query().map_or("/", |pq| pq.as_str());
        write!(BufWriter(dst), "{} {} HTTP/1.1\r\n", head.method(), target)?;

        match kind {
            BodyKind::Sized(n) => {
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
            BodyKind::Chunked => {
                head.headers_mut().insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            BodyKind::Empty => {}
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

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode(input: &str) -> Result<Option<(RequestHead, BodyKind)>, ParseError> {
        let mut src = BytesMut::from(input);
        RequestHeadDecoder.decode(&mut src)
    }

    #[test]
    fn plain_get() {
        let input = indoc! {"
            GET /hello HTTP/1.1\r
            Host: example.com\r
            Accept: */*\r
            \r
        "};

        let (head, kind) = decode(input).unwrap().unwrap();
        assert_eq!(head.method(), &Method::GET);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.uri().path(), "/hello");
        assert_eq!(kind, BodyKind::Empty);
        assert_eq!(head.headers().len(), 2);
        assert_eq!(head.headers().get(header::HOST).unwrap(), "example.com");
    }

    #[test]
    fn target_with_query() {
        let input = "GET /search?q=1&lang=en HTTP/1.1\r\nHost: x\r\n\r\n";

        let (head, _) = decode(input).unwrap().unwrap();
        assert_eq!(head.uri().path(), "/search");
        assert_eq!(head.uri().query(), Some("q=1&lang=en"));
    }

    #[test]
    fn content_length_framing() {
        let input = "POST /p HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\nabcd";
        let mut src = BytesMut::from(input);

        let (head, kind) = RequestHeadDecoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(head.method(), &Method::POST);
        assert_eq!(kind, BodyKind::Sized(4));
        // the body stays in the buffer for the payload decoder
        assert_eq!(&src[..], b"abcd");
    }

    #[test]
    fn zero_content_length_is_empty() {
        let input = "POST /p HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n";
        let (_, kind) = decode(input).unwrap().unwrap();
        assert_eq!(kind, BodyKind::Empty);
    }

    #[test]
    fn chunked_framing() {
        let input = "POST /p HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n";
        let (_, kind) = decode(input).unwrap().unwrap();
        assert_eq!(kind, BodyKind::Chunked);
    }

    #[test]
    fn chunked_must_be_final_coding() {
        let input = "POST /p HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked, gzip\r\n\r\n";
        let (_, kind) = decode(input).unwrap().unwrap();
        assert_eq!(kind, BodyKind::Empty);

        let input = "POST /p HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: gzip, chunked\r\n\r\n";
        let (_, kind) = decode(input).unwrap().unwrap();
        assert_eq!(kind, BodyKind::Chunked);
    }

    #[test]
    fn conflicting_framing_headers_rejected() {
        let input = "POST /p HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\nTransfer-Encoding: chunked\r\n\r\n";
        assert!(matches!(decode(input), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn partial_head_waits_for_more() {
        let input = "GET /hello HTTP/1.1\r\nHost: exam";
        assert!(decode(input).unwrap().is_none());
    }

    #[test]
    fn http10_is_accepted() {
        let input = "GET / HTTP/1.0\r\nHost: x\r\n\r\n";
        let (head, _) = decode(input).unwrap().unwrap();
        assert_eq!(head.version(), Version::HTTP_10);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let input = "GET / HTTP/2.0\r\nHost: x\r\n\r\n";
        assert!(decode(input).is_err());
    }

    #[test]
    fn bad_content_length_is_rejected() {
        let input = "POST / HTTP/1.1\r\nHost: x\r\nContent-Length: banana\r\n\r\n";
        assert!(matches!(decode(input), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn encoder_writes_request_line_and_framing() {
        let head = RequestHead::from(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/items?page=2")
                .version(Version::HTTP_11)
                .header(header::HOST, "example.com")
                .body(())
                .unwrap(),
        );

        let mut dst = BytesMut::new();
        RequestHeadEncoder.encode((head, BodyKind::Sized(11)), &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.starts_with("POST /api/v1/items?page=2 HTTP/1.1\r\n"));
        assert!(text.contains("host: example.com\r\n"));
        assert!(text.contains("content-length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn encoder_omits_framing_for_empty_body() {
        let head =
            RequestHead::from(Request::builder().method(Method::GET).uri("/").header(header::HOST, "x").body(()).unwrap());

        let mut dst = BytesMut::new();
        RequestHeadEncoder.encode((head, BodyKind::Empty), &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(!text.contains("content-length"));
        assert!(!text.contains("transfer-encoding"));
    }

    #[test]
    fn head_round_trip_preserves_semantics() {
        let input = "POST /round/trip?x=1 HTTP/1.1\r\nHost: rt\r\nX-Custom: abc\r\nContent-Length: 2\r\n\r\n";
        let mut src = BytesMut::from(input);
        let (head, kind) = RequestHeadDecoder.decode(&mut src).unwrap().unwrap();

        let mut wire = BytesMut::new();
        RequestHeadEncoder.encode((head, kind), &mut wire).unwrap();

        let (reparsed, rekind) = RequestHeadDecoder.decode(&mut wire.clone()).unwrap().unwrap();
        assert_eq!(reparsed.method(), &Method::POST);
        assert_eq!(reparsed.uri().path(), "/round/trip");
        assert_eq!(reparsed.uri().query(), Some("x=1"));
        assert_eq!(reparsed.headers().get(header::HOST).unwrap(), "rt");
        assert_eq!(reparsed.headers().get("x-custom").unwrap(), "abc");
        assert_eq!(rekind, BodyKind::Sized(2));
    }
}
