//! Request head handling.
//!
//! A [`RequestHead`] is the parsed head of an HTTP request before any body
//! is attached. It wraps `http::Request<()>` and adds the connection-level
//! decisions the state machine needs: keep-alive, `Expect: 100-continue`
//! and body attachment.

use std::net::SocketAddr;

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version, header};

/// The parsed head of an HTTP request: method, target, version and headers.
#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
}

/// The transport endpoints of the connection a request arrived on.
///
/// Carried in the request extensions so that handlers can extract it
/// without the connection layer knowing anything about the framework above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectInfo {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl RequestHead {
    /// Attaches a body, turning the head back into a full `http::Request`.
    pub fn into_request<B>(self, body: B) -> Request<B> {
        self.inner.map(|_| body)
    }

    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Whether the connection should be kept open after this exchange.
    ///
    /// HTTP/1.1 defaults to keep-alive unless the `Connection` header lists
    /// `close`; HTTP/1.0 defaults to close unless it lists `keep-alive`.
    /// Anything older is never kept alive.
    pub fn keep_alive(&self) -> bool {
        let connection = self.headers().get(header::CONNECTION).and_then(|value| value.to_str().ok());

        match self.version() {
            Version::HTTP_11 => !has_token(connection, "close"),
            Version::HTTP_10 => has_token(connection, "keep-alive"),
            _ => false,
        }
    }

    /// Whether the client asked for an interim `100 Continue` before
    /// sending the body.
    pub fn expects_continue(&self) -> bool {
        self.headers()
            .get(header::EXPECT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
    }
}

fn has_token(value: Option<&str>, token: &str) -> bool {
    value.is_some_and(|value| value.split(',').any(|part| part.trim().eq_ignore_ascii_case(token)))
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl From<Parts> for RequestHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(version: Version, connection: Option<&str>) -> RequestHead {
        let mut builder = Request::builder().method(Method::GET).uri("/").version(version);
        if let Some(value) = connection {
            builder = builder.header(header::CONNECTION, value);
        }
        RequestHead::from(builder.body(()).unwrap())
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        assert!(head(Version::HTTP_11, None).keep_alive());
        assert!(!head(Version::HTTP_10, None).keep_alive());
    }

    #[test]
    fn keep_alive_connection_header_overrides() {
        assert!(!head(Version::HTTP_11, Some("close")).keep_alive());
        assert!(!head(Version::HTTP_11, Some("Close")).keep_alive());
        assert!(head(Version::HTTP_10, Some("keep-alive")).keep_alive());
        assert!(head(Version::HTTP_11, Some("upgrade, keep-alive")).keep_alive());
    }

    #[test]
    fn expect_continue_detection() {
        let mut builder = Request::builder().method(Method::POST).uri("/upload");
        builder = builder.header(header::EXPECT, "100-continue");
        let head = RequestHead::from(builder.body(()).unwrap());
        assert!(head.expects_continue());

        let plain = Request::builder().method(Method::POST).uri("/upload").body(()).unwrap();
        assert!(!RequestHead::from(plain).expects_continue());
    }
}
