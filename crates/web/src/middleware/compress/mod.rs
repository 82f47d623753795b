//! Content-coding middlewares.
//!
//! [`Gzip`] and [`Deflate`] negotiate via `Accept-Encoding` token
//! presence (`q=` weights are ignored, matching the wire behavior this
//! framework promises) and wrap the response body in a streaming
//! compressor. [`Decompress`] inverts the request side: it applies the
//! `Content-Encoding` codings in reverse order and strips the header, so
//! handlers always observe plain payloads.

mod body;
pub(crate) use body::Codec;
use body::{DecodedBody, EncodedBody};

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Response, StatusCode, header};
use http_body_util::combinators::UnsyncBoxBody;
use tracing::debug;

use crate::body::{OptionReqBody, ResponseBody};
use crate::middleware::{Middleware, Next};
use crate::request::RequestContext;
use crate::responder::ResponseBuilderExt;

/// Compresses response bodies with gzip when the client accepts it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Gzip;

impl Gzip {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Gzip {
    async fn handle(&self, ctx: &mut RequestContext, req_body: OptionReqBody, next: Next<'_>) -> Response<ResponseBody> {
        encode_response(ctx, req_body, next, Codec::Gzip).await
    }
}

/// Compresses response bodies with deflate when the client accepts it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Deflate;

impl Deflate {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Deflate {
    async fn handle(&self, ctx: &mut RequestContext, req_body: OptionReqBody, next: Next<'_>) -> Response<ResponseBody> {
        encode_response(ctx, req_body, next, Codec::Deflate).await
    }
}

async fn encode_response(
    ctx: &mut RequestContext,
    req_body: OptionReqBody,
    next: Next<'_>,
    codec: Codec,
) -> Response<ResponseBody> {
    let client_accepts = accepts_coding(ctx.headers(), codec.token());

    let mut response = next.run(ctx, req_body).await;
    if !client_accepts {
        return response;
    }

    let status = response.status();
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED || status == StatusCode::SWITCHING_PROTOCOLS {
        return response;
    }

    // already encoded upstream, or nothing to encode
    if response.headers().contains_key(header::CONTENT_ENCODING) || response.body().is_empty() {
        return response;
    }

    let plain = response.body_mut().take();
    response.body_mut().replace(ResponseBody::stream(EncodedBody::new(plain, codec)));

    response.headers_mut().remove(header::CONTENT_LENGTH);
    response.headers_mut().insert(header::CONTENT_ENCODING, HeaderValue::from_static(codec.token()));
    extend_vary(response.headers_mut());

    response
}

/// Token-presence matching over `Accept-Encoding`; `q=` weights are
/// deliberately ignored, `*` accepts everything.
fn accepts_coding(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value.split(',').any(|part| {
                let candidate = part.split(';').next().unwrap_or("").trim();
                candidate.eq_ignore_ascii_case(token) || candidate == "*"
            })
        })
}

/// Records that the response varies on `Accept-Encoding`. An existing `*`
/// already covers everything and is left alone.
fn extend_vary(headers: &mut HeaderMap) {
    const ACCEPT_ENCODING: &str = "Accept-Encoding";

    match headers.get(header::VARY) {
        None => {
            headers.insert(header::VARY, HeaderValue::from_static(ACCEPT_ENCODING));
        }
        Some(existing) => {
            let Ok(text) = existing.to_str() else {
                return;
            };
            let mut tokens = text.split(',').map(str::trim);
            if tokens.any(|token| token == "*" || token.eq_ignore_ascii_case(ACCEPT_ENCODING)) {
                return;
            }
            let extended = format!("{text}, {ACCEPT_ENCODING}");
            if let Ok(value) = HeaderValue::from_str(&extended) {
                headers.insert(header::VARY, value);
            }
        }
    }
}

/// Decodes compressed request bodies according to `Content-Encoding`.
///
/// Codings apply in reverse order of the header list; `identity` is a
/// no-op. An unknown coding is rejected with `415` unless the middleware
/// was built with [`Decompress::lenient`], in which case the request
/// passes through untouched.
#[derive(Debug, Clone, Copy)]
pub struct Decompress {
    reject_unknown: bool,
}

impl Decompress {
    pub fn new() -> Self {
        Self { reject_unknown: true }
    }

    /// Passes requests with unknown codings through instead of rejecting.
    pub fn lenient() -> Self {
        Self { reject_unknown: false }
    }
}

impl Default for Decompress {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for Decompress {
    async fn handle(&self, ctx: &mut RequestContext, body: OptionReqBody, next: Next<'_>) -> Response<ResponseBody> {
        let Some(value) = ctx.headers().get(header::CONTENT_ENCODING) else {
            return next.run(ctx, body).await;
        };

        let Ok(text) = value.to_str() else {
            return unsupported_coding_response();
        };

        let codings: Vec<String> =
            text.split(',').map(|token| token.trim().to_ascii_lowercase()).filter(|token| !token.is_empty()).collect();

        for coding in &codings {
            if !matches!(coding.as_str(), "identity" | "gzip" | "deflate") {
                debug!(coding = %coding, "unknown content-coding on request");
                if self.reject_unknown {
                    return unsupported_coding_response();
                }
                return next.run(ctx, body).await;
            }
        }

        let wrapped = body
            .map(|inner| {
                let mut current = inner;
                // last-applied coding is first to undo
                for coding in codings.iter().rev() {
                    current = match coding.as_str() {
                        "gzip" => UnsyncBoxBody::new(DecodedBody::new(current, Codec::Gzip)),
                        "deflate" => UnsyncBoxBody::new(DecodedBody::new(current, Codec::Deflate)),
                        _ => current,
                    };
                }
                current
            })
            .await;

        if wrapped.is_err() {
            return Response::builder().status(StatusCode::BAD_REQUEST).plaintext("request body unavailable");
        }

        ctx.headers_mut().remove(header::CONTENT_ENCODING);
        next.run(ctx, body).await
    }
}

fn unsupported_coding_response() -> Response<ResponseBody> {
    Response::builder().status(StatusCode::UNSUPPORTED_MEDIA_TYPE).plaintext("unsupported content-encoding")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::fold_chain;
    use crate::test_request::TestRequest;
    use bytes::Bytes;
    use flate2::Compression;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use flate2::write::GzEncoder;
    use http_body_util::BodyExt;
    use std::io::{Read, Write};
    use std::sync::Arc;

    async fn hello() -> &'static str {
        "hello"
    }

    async fn large_text() -> String {
        "the same phrase over and over ".repeat(200)
    }

    async fn echo(body: String) -> String {
        body
    }

    async fn run_chain(
        middleware: Arc<dyn Middleware>,
        request: TestRequest,
        handler: Arc<dyn crate::handler::RequestHandler>,
    ) -> Response<ResponseBody> {
        let chain = fold_chain(handler, &[middleware]);
        let (head, body) = request.into_parts("/");
        let path = head.uri().path().to_owned();
        let mut ctx = crate::request::RequestContext::new(
            head,
            crate::test_request::loopback_connect_info(),
            crate::router::PathInfo::none(path),
            crate::request::QueryMap::default(),
            crate::state::StateMap::default(),
        );
        chain.invoke(&mut ctx, body).await
    }

    async fn collect(response: Response<ResponseBody>) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn gzip_applies_when_accepted() {
        let response = run_chain(
            Arc::new(Gzip),
            TestRequest::get().header(header::ACCEPT_ENCODING, "gzip"),
            Arc::new(handler_fn(hello)),
        )
        .await;

        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Accept-Encoding");
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

        let compressed = collect(response).await;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "hello");
    }

    #[tokio::test]
    async fn gzip_skipped_without_accept_encoding() {
        let response = run_chain(Arc::new(Gzip), TestRequest::get(), Arc::new(handler_fn(hello))).await;

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(collect(response).await, b"hello");
    }

    #[tokio::test]
    async fn deflate_round_trip() {
        let response = run_chain(
            Arc::new(Deflate),
            TestRequest::get().header(header::ACCEPT_ENCODING, "deflate;q=0.5, br"),
            Arc::new(handler_fn(large_text)),
        )
        .await;

        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "deflate");

        let expected = large_text().await;
        let compressed = collect(response).await;
        assert!(compressed.len() < expected.len());

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, expected);
    }

    #[tokio::test]
    async fn wildcard_accept_encoding_matches() {
        let response = run_chain(
            Arc::new(Gzip),
            TestRequest::get().header(header::ACCEPT_ENCODING, "*"),
            Arc::new(handler_fn(hello)),
        )
        .await;
        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
    }

    #[tokio::test]
    async fn existing_vary_is_extended_not_replaced() {
        async fn with_vary() -> Response<ResponseBody> {
            Response::builder().header(header::VARY, "Origin").plaintext("body")
        }

        let response = run_chain(
            Arc::new(Gzip),
            TestRequest::get().header(header::ACCEPT_ENCODING, "gzip"),
            Arc::new(handler_fn(with_vary)),
        )
        .await;

        assert_eq!(response.headers().get(header::VARY).unwrap(), "Origin, Accept-Encoding");
    }

    #[tokio::test]
    async fn vary_star_absorbs_the_addition() {
        async fn with_star() -> Response<ResponseBody> {
            Response::builder().header(header::VARY, "*").plaintext("body")
        }

        let response = run_chain(
            Arc::new(Gzip),
            TestRequest::get().header(header::ACCEPT_ENCODING, "gzip"),
            Arc::new(handler_fn(with_star)),
        )
        .await;

        assert_eq!(response.headers().get(header::VARY).unwrap(), "*");
    }

    #[tokio::test]
    async fn already_encoded_responses_pass_through() {
        async fn pre_encoded() -> Response<ResponseBody> {
            Response::builder()
                .header(header::CONTENT_ENCODING, "br")
                .body(ResponseBody::once(Bytes::from_static(b"opaque")))
                .unwrap()
        }

        let response = run_chain(
            Arc::new(Gzip),
            TestRequest::get().header(header::ACCEPT_ENCODING, "gzip"),
            Arc::new(handler_fn(pre_encoded)),
        )
        .await;

        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "br");
        assert_eq!(collect(response).await, b"opaque");
    }

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn decompress_restores_the_request_body() {
        let compressed = gzip_bytes(b"squeezed payload");

        let response = run_chain(
            Arc::new(Decompress::new()),
            TestRequest::post().header(header::CONTENT_ENCODING, "gzip").bytes(compressed),
            Arc::new(handler_fn(echo)),
        )
        .await;

        assert_eq!(collect(response).await, b"squeezed payload");
    }

    #[tokio::test]
    async fn decompress_strips_the_header() {
        async fn header_probe(ctx: &crate::request::RequestContext) -> String {
            format!("{}", ctx.headers().contains_key(header::CONTENT_ENCODING))
        }

        let compressed = gzip_bytes(b"x");
        let response = run_chain(
            Arc::new(Decompress::new()),
            TestRequest::post().header(header::CONTENT_ENCODING, "gzip").bytes(compressed),
            Arc::new(handler_fn(header_probe)),
        )
        .await;

        assert_eq!(collect(response).await, b"false");
    }

    #[tokio::test]
    async fn decompress_rejects_unknown_coding() {
        let response = run_chain(
            Arc::new(Decompress::new()),
            TestRequest::post().header(header::CONTENT_ENCODING, "snappy").bytes("???"),
            Arc::new(handler_fn(echo)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn lenient_decompress_passes_unknown_through() {
        let response = run_chain(
            Arc::new(Decompress::lenient()),
            TestRequest::post().header(header::CONTENT_ENCODING, "snappy").bytes("opaque"),
            Arc::new(handler_fn(echo)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(collect(response).await, b"opaque");
    }

    #[tokio::test]
    async fn decompress_handles_stacked_codings() {
        // gzip applied over deflate: undo gzip first, then deflate
        let mut deflated = Vec::new();
        {
            let mut encoder = flate2::write::ZlibEncoder::new(&mut deflated, Compression::default());
            encoder.write_all(b"layered").unwrap();
            encoder.finish().unwrap();
        }
        let stacked = gzip_bytes(&deflated);

        let response = run_chain(
            Arc::new(Decompress::new()),
            TestRequest::post().header(header::CONTENT_ENCODING, "deflate, gzip").bytes(stacked),
            Arc::new(handler_fn(echo)),
        )
        .await;

        assert_eq!(collect(response).await, b"layered");
    }

    #[tokio::test]
    async fn corrupt_payload_is_bad_request() {
        let response = run_chain(
            Arc::new(Decompress::new()),
            TestRequest::post().header(header::CONTENT_ENCODING, "gzip").bytes("this is not gzip"),
            Arc::new(handler_fn(echo)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
