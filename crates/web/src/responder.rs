//! Conversion of handler return values into HTTP responses.

use crate::body::ResponseBody;
use crate::extract::Json;
use crate::request::RequestContext;
use bytes::Bytes;
use http::{Response, StatusCode, header};
use http_body::Body as HttpBody;
use plover_http::protocol::HttpError;
use serde::Serialize;
use std::convert::Infallible;
use tracing::error;

/// A value that can be turned into a response.
///
/// Implemented for the usual suspects so handlers can return strings,
/// status tuples, `Result`s and pre-built responses directly.
pub trait Responder {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody>;
}

impl<T: Responder, E: Responder> Responder for Result<T, E> {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
        match self {
            Ok(value) => value.response_to(ctx),
            Err(e) => e.response_to(ctx),
        }
    }
}

/// `None` responds with an empty `200`.
impl<T: Responder> Responder for Option<T> {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
        match self {
            Some(value) => value.response_to(ctx),
            None => Response::new(ResponseBody::empty()),
        }
    }
}

impl<B> Responder for Response<B>
where
    B: Into<ResponseBody>,
{
    fn response_to(self, _ctx: &RequestContext) -> Response<ResponseBody> {
        self.map(Into::into)
    }
}

impl<T: Responder> Responder for (StatusCode, T) {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
        let (status, responder) = self;
        let mut response = responder.response_to(ctx);
        *response.status_mut() = status;
        response
    }
}

impl<T: Responder> Responder for (T, StatusCode) {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
        let (responder, status) = self;
        (status, responder).response_to(ctx)
    }
}

impl Responder for StatusCode {
    fn response_to(self, _ctx: &RequestContext) -> Response<ResponseBody> {
        let mut response = Response::new(ResponseBody::empty());
        *response.status_mut() = self;
        response
    }
}

impl<T: Responder> Responder for Box<T> {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
        (*self).response_to(ctx)
    }
}

impl Responder for () {
    fn response_to(self, _ctx: &RequestContext) -> Response<ResponseBody> {
        Response::new(ResponseBody::empty())
    }
}

impl Responder for &'static str {
    fn response_to(self, _ctx: &RequestContext) -> Response<ResponseBody> {
        plaintext_response(ResponseBody::from(self))
    }
}

impl Responder for String {
    fn response_to(self, _ctx: &RequestContext) -> Response<ResponseBody> {
        plaintext_response(ResponseBody::from(self))
    }
}

impl Responder for Bytes {
    fn response_to(self, _ctx: &RequestContext) -> Response<ResponseBody> {
        octet_stream_response(ResponseBody::from(self))
    }
}

impl Responder for Vec<u8> {
    fn response_to(self, _ctx: &RequestContext) -> Response<ResponseBody> {
        octet_stream_response(ResponseBody::from(self))
    }
}

/// Serializes the wrapped value as a JSON response body.
impl<T: Serialize> Responder for Json<T> {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
        match serde_json::to_vec(&self.0) {
            Ok(buf) => {
                let mut builder = Response::builder();
                let headers = builder.headers_mut().unwrap();
                headers.insert(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref().parse().unwrap());
                builder.status(StatusCode::OK).body(ResponseBody::from(buf)).unwrap()
            }
            Err(e) => {
                error!("failed to serialize json response: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.response_to(ctx)
            }
        }
    }
}

impl Responder for Infallible {
    fn response_to(self, _ctx: &RequestContext) -> Response<ResponseBody> {
        match self {}
    }
}

fn plaintext_response(body: ResponseBody) -> Response<ResponseBody> {
    let mut builder = Response::builder();
    let headers = builder.headers_mut().unwrap();
    headers.reserve(8);
    headers.insert(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref().parse().unwrap());

    builder.status(StatusCode::OK).body(body).unwrap()
}

fn octet_stream_response(body: ResponseBody) -> Response<ResponseBody> {
    let mut builder = Response::builder();
    let headers = builder.headers_mut().unwrap();
    headers.reserve(8);
    headers.insert(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref().parse().unwrap());

    builder.status(StatusCode::OK).body(body).unwrap()
}

/// Response construction helpers on `http::response::Builder`, covering
/// the body flavors the framework knows how to frame.
pub trait ResponseBuilderExt {
    /// A sized `text/plain` body.
    fn plaintext(self, body: impl Into<Bytes>) -> Response<ResponseBody>;

    /// A sized `application/json` body serialized from `value`.
    fn json<T: Serialize>(self, value: &T) -> Response<ResponseBody>;

    /// A sized body with no content type attached.
    fn bytes_body(self, body: impl Into<Bytes>) -> Response<ResponseBody>;

    /// A streaming body; the framing on the wire will be chunked.
    fn stream_body<B>(self, body: B) -> Response<ResponseBody>
    where
        B: HttpBody<Data = Bytes, Error = HttpError> + Send + 'static;
}

impl ResponseBuilderExt for http::response::Builder {
    fn plaintext(self, body: impl Into<Bytes>) -> Response<ResponseBody> {
        self.header(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref())
            .body(ResponseBody::once(body.into()))
            .expect("response builder with valid parts")
    }

    fn json<T: Serialize>(self, value: &T) -> Response<ResponseBody> {
        match serde_json::to_vec(value) {
            Ok(buf) => self
                .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(ResponseBody::from(buf))
                .expect("response builder with valid parts"),
            Err(e) => {
                error!("failed to serialize json response: {}", e);
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(ResponseBody::empty())
                    .expect("static response parts are valid")
            }
        }
    }

    fn bytes_body(self, body: impl Into<Bytes>) -> Response<ResponseBody> {
        self.body(ResponseBody::once(body.into())).expect("response builder with valid parts")
    }

    fn stream_body<B>(self, body: B) -> Response<ResponseBody>
    where
        B: HttpBody<Data = Bytes, Error = HttpError> + Send + 'static,
    {
        self.body(ResponseBody::stream(body)).expect("response builder with valid parts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_request::TestRequest;

    fn ctx() -> RequestContext {
        TestRequest::get().into_context("/")
    }

    #[test]
    fn str_responds_with_plaintext() {
        let response = "hi".response_to(&ctx());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), mime::TEXT_PLAIN_UTF_8.as_ref());
    }

    #[test]
    fn status_tuple_overrides_status() {
        let response = (StatusCode::NOT_FOUND, "missing").response_to(&ctx());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn json_responder_sets_content_type() {
        let response = Json(serde_json::json!({"ok": true})).response_to(&ctx());
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), mime::APPLICATION_JSON.as_ref());
    }

    #[test]
    fn builder_ext_plaintext() {
        let response = Response::builder().status(StatusCode::CREATED).plaintext("made");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), mime::TEXT_PLAIN_UTF_8.as_ref());
    }
}
