//! Synthetic requests for exercising the pipeline without a socket.
//!
//! A [`TestRequest`] mirrors the client builder surface (method, version,
//! headers, query, body) and is submitted through
//! [`Server::serve_request`](crate::server::Server::serve_request), which
//! drives the full route + middleware + handler pipeline.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version, header};
use http_body::Body as HttpBody;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use plover_http::protocol::{ConnectInfo, ParseError, RequestHead};
use serde::Serialize;

use crate::body::{BoxReqBody, OptionReqBody};
use crate::request::{QueryMap, RequestContext};
use crate::router::PathInfo;
use crate::state::StateMap;

/// A request assembled in memory.
pub struct TestRequest {
    method: Method,
    version: Version,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: TestBody,
}

enum TestBody {
    Empty,
    Bytes(Bytes),
    Stream(BoxReqBody),
}

impl TestRequest {
    pub fn new(method: Method) -> Self {
        Self { method, version: Version::HTTP_11, headers: HeaderMap::new(), query: Vec::new(), body: TestBody::Empty }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    pub fn head() -> Self {
        Self::new(Method::HEAD)
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Panics on an invalid name or value; this is a test surface.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().unwrap_or_else(|_| panic!("invalid header name"));
        let value = value.try_into().unwrap_or_else(|_| panic!("invalid header value"));
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// A sized body with `Content-Type: text/plain`.
    pub fn plaintext(self, body: impl Into<Bytes>) -> Self {
        self.header(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref()).bytes(body)
    }

    /// A sized JSON body with `Content-Type: application/json`.
    pub fn json<T: Serialize>(self, value: &T) -> Self {
        let buf = serde_json::to_vec(value).expect("json serialization failed");
        self.header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref()).bytes(buf)
    }

    /// A sized form body with
    /// `Content-Type: application/x-www-form-urlencoded`.
    pub fn form<T: Serialize>(self, value: &T) -> Self {
        let text = serde_urlencoded::to_string(value).expect("form serialization failed");
        self.header(header::CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref()).bytes(text.into_bytes())
    }

    /// A raw sized body.
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = TestBody::Bytes(body.into());
        self
    }

    /// A streaming body (no known size).
    pub fn stream<B>(mut self, body: B) -> Self
    where
        B: HttpBody<Data = Bytes, Error = ParseError> + Send + 'static,
    {
        self.body = TestBody::Stream(UnsyncBoxBody::new(body));
        self
    }

    /// Splits into the pieces the dispatch pipeline consumes. `path` may
    /// carry its own query string; builder-added pairs are appended.
    pub(crate) fn into_parts(self, path: &str) -> (RequestHead, OptionReqBody) {
        let uri = self.build_uri(path);

        let mut builder = Request::builder().method(self.method.clone()).uri(uri).version(self.version);
        let header_map = builder.headers_mut().expect("freshly built request cannot carry an error");
        *header_map = self.headers.clone();

        if let TestBody::Bytes(bytes) = &self.body {
            if !header_map.contains_key(header::CONTENT_LENGTH) {
                header_map.insert(header::CONTENT_LENGTH, (bytes.len() as u64).into());
            }
        }

        let head = RequestHead::from(builder.body(()).expect("test request parts are valid"));

        let body = match self.body {
            TestBody::Empty => OptionReqBody::from(boxed_empty()),
            TestBody::Bytes(bytes) => {
                OptionReqBody::from(UnsyncBoxBody::new(
                    Full::new(bytes).map_err(|never: std::convert::Infallible| -> ParseError { match never {} }),
                ))
            }
            TestBody::Stream(stream) => OptionReqBody::from(stream),
        };

        (head, body)
    }

    /// A bare request context for unit tests that bypass routing.
    pub(crate) fn into_context(self, path: &str) -> RequestContext {
        let (head, _body) = self.into_parts(path);
        let query = QueryMap::parse(head.uri().query().unwrap_or("")).unwrap_or_default();
        let concrete_path = head.uri().path().to_owned();
        RequestContext::new(head, loopback_connect_info(), PathInfo::none(concrete_path), query, StateMap::default())
    }

    fn build_uri(&self, path: &str) -> Uri {
        let uri_text = if self.query.is_empty() {
            path.to_owned()
        } else {
            let appended = serde_urlencoded::to_string(&self.query).expect("query serialization failed");
            if path.contains('?') { format!("{path}&{appended}") } else { format!("{path}?{appended}") }
        };
        uri_text.parse().expect("test request path is not a valid uri")
    }
}

impl std::fmt::Debug for TestRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRequest").field("method", &self.method).field("version", &self.version).finish_non_exhaustive()
    }
}

fn boxed_empty() -> BoxReqBody {
    UnsyncBoxBody::new(Empty::new().map_err(|never| match never {}))
}

/// Connection endpoints used when no real transport is involved.
pub(crate) fn loopback_connect_info() -> ConnectInfo {
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    ConnectInfo { local: addr, remote: addr }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_are_appended_to_the_path() {
        let (head, _) = TestRequest::get().query("a", "1").query("b", "two words").into_parts("/p");
        assert_eq!(head.uri().path(), "/p");
        assert_eq!(head.uri().query(), Some("a=1&b=two+words"));
    }

    #[test]
    fn body_sets_content_length() {
        let (head, _) = TestRequest::post().plaintext("hello").into_parts("/p");
        assert_eq!(head.headers().get(header::CONTENT_LENGTH).unwrap(), "5");
        assert_eq!(head.headers().get(header::CONTENT_TYPE).unwrap(), mime::TEXT_PLAIN_UTF_8.as_ref());
    }

    #[tokio::test]
    async fn empty_body_is_consumable_once() {
        let (_, body) = TestRequest::get().into_parts("/");
        assert!(body.can_consume().await);
    }
}
