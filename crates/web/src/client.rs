//! One-shot HTTP client.
//!
//! A [`Client`] is a request builder mirroring the server-side surface
//! (method, URL, query, headers, body flavors). [`Client::send`] resolves
//! the host, connects to the first reachable address, drives the client
//! connection state machine and returns a [`ClientResponse`] whose body
//! streams over the live transport.
//!
//! ```no_run
//! # use plover_web::client::Client;
//! # async fn example() -> Result<(), plover_web::client::ClientError> {
//! let response = Client::get("http://example.com/status").send().await?;
//! let text = response.as_string(64 * 1024).await?;
//! # let _ = text;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, Version, header};
use http_body::Body as HttpBody;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use plover_http::connection::{ClientConnection, ClientResponseBody, DEFAULT_REQUEST_TIMEOUT};
use plover_http::protocol::HttpError;
use plover_http::protocol::body::read_until_eof;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path as FsPath;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::debug;

/// Client-side failures, from URL parsing through body consumption.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid url: {reason}")]
    InvalidUrl { reason: String },

    #[error("unsupported url scheme {scheme:?}")]
    UnsupportedScheme { scheme: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("could not resolve host {host:?}")]
    Resolve { host: String },

    #[error("failed to connect: {source}")]
    Connect { source: io::Error },

    #[error("deadline elapsed while connecting")]
    ConnectTimedOut,

    #[error("unexpected content-type: {found:?}")]
    ContentType { found: String },

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ClientError {
    fn invalid_url<S: ToString>(reason: S) -> Self {
        Self::InvalidUrl { reason: reason.to_string() }
    }

    fn invalid_request<S: ToString>(reason: S) -> Self {
        Self::InvalidRequest { reason: reason.to_string() }
    }
}

enum OutgoingBody {
    Empty,
    Buffered(Bytes),
    Streaming(UnsyncBoxBody<Bytes, HttpError>),
}

/// A one-shot request builder. Building never fails; deferred errors (bad
/// header values, serialization failures) surface from [`Client::send`].
pub struct Client {
    method: Method,
    url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: OutgoingBody,
    deadline: Duration,
    deferred_error: Option<ClientError>,
}

impl Client {
    pub fn request(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: OutgoingBody::Empty,
            deadline: DEFAULT_REQUEST_TIMEOUT,
            deferred_error: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::request(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::request(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::request(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::request(Method::DELETE, url)
    }

    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => self.defer(ClientError::invalid_request("invalid header name or value")),
        }
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Per-phase deadline: resolve/connect, each write, each read.
    pub fn timeout(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets `Expect: 100-continue`: the body is held back until the
    /// server sends an interim response (or the deadline elapses, in
    /// which case the body is sent anyway).
    pub fn expect_continue(self) -> Self {
        self.header(header::EXPECT, "100-continue")
    }

    /// A sized `text/plain` body.
    pub fn plaintext(self, body: impl Into<Bytes>) -> Self {
        self.header(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref()).bytes(body)
    }

    /// A sized `application/json` body serialized from `value`.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(buf) => self.header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref()).bytes(buf),
            Err(e) => {
                self.defer(ClientError::invalid_request(format!("json serialization failed: {e}")));
                self
            }
        }
    }

    /// A raw sized body.
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = OutgoingBody::Buffered(body.into());
        self
    }

    /// A streaming body, written with chunked transfer encoding.
    pub fn stream<B>(mut self, body: B) -> Self
    where
        B: HttpBody<Data = Bytes, Error = HttpError> + Send + 'static,
    {
        self.body = OutgoingBody::Streaming(UnsyncBoxBody::new(body));
        self
    }

    fn defer(&mut self, error: ClientError) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(error);
        }
    }

    /// Executes the exchange: resolve, connect, send, parse the response
    /// head. The response body remains a live stream over the socket.
    pub async fn send(self) -> Result<ClientResponse, ClientError> {
        if let Some(error) = self.deferred_error {
            return Err(error);
        }

        let uri: Uri = self.url.parse().map_err(ClientError::invalid_url)?;

        match uri.scheme_str() {
            None | Some("http") => {}
            Some(other) => return Err(ClientError::UnsupportedScheme { scheme: other.to_owned() }),
        }

        let host = uri.host().ok_or_else(|| ClientError::invalid_url("missing host"))?.to_owned();
        let port = uri.port_u16().unwrap_or(80);

        let stream = self.connect(&host, port).await?;
        let _ = stream.set_nodelay(true);

        let target = build_target(&uri, &self.query)?;

        let mut builder = Request::builder().method(self.method.clone()).uri(target).version(Version::HTTP_11);
        let headers = builder.headers_mut().expect("freshly built request cannot carry an error");
        *headers = self.headers.clone();
        if !headers.contains_key(header::HOST) {
            let authority = if port == 80 { host.clone() } else { format!("{host}:{port}") };
            headers.insert(
                header::HOST,
                HeaderValue::from_str(&authority).map_err(|_| ClientError::invalid_url("host is not a valid header value"))?,
            );
        }

        let connection = ClientConnection::new(stream, self.deadline);

        let response = match self.body {
            OutgoingBody::Empty => {
                let request =
                    builder.body(boxed_body(Empty::new())).map_err(|e| ClientError::invalid_request(e.to_string()))?;
                connection.send(request).await?
            }
            OutgoingBody::Buffered(bytes) => {
                let request =
                    builder.body(boxed_body(Full::new(bytes))).map_err(|e| ClientError::invalid_request(e.to_string()))?;
                connection.send(request).await?
            }
            OutgoingBody::Streaming(body) => {
                let request = builder.body(body).map_err(|e| ClientError::invalid_request(e.to_string()))?;
                connection.send(request).await?
            }
        };

        Ok(ClientResponse { inner: response })
    }

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, ClientError> {
        let addresses = match timeout(self.deadline, lookup_host((host, port))).await {
            Ok(Ok(addresses)) => addresses,
            Ok(Err(_)) => return Err(ClientError::Resolve { host: host.to_owned() }),
            Err(_) => return Err(ClientError::ConnectTimedOut),
        };

        let mut last_error: Option<io::Error> = None;
        for address in addresses {
            debug!(%address, "connecting");
            match timeout(self.deadline, TcpStream::connect(address)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => return Err(ClientError::ConnectTimedOut),
            }
        }

        match last_error {
            Some(source) => Err(ClientError::Connect { source }),
            None => Err(ClientError::Resolve { host: host.to_owned() }),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("method", &self.method).field("url", &self.url).finish_non_exhaustive()
    }
}

fn boxed_body<B>(body: B) -> UnsyncBoxBody<Bytes, HttpError>
where
    B: HttpBody<Data = Bytes, Error = std::convert::Infallible> + Send + 'static,
{
    UnsyncBoxBody::new(body.map_err(|never| match never {}))
}

/// Joins the URL's own query with builder-added pairs into an
/// origin-form request target.
fn build_target(uri: &Uri, extra: &[(String, String)]) -> Result<Uri, ClientError> {
    let path = if uri.path().is_empty() { "/" } else { uri.path() };

    let appended = if extra.is_empty() {
        None
    } else {
        Some(serde_urlencoded::to_string(extra).map_err(|e| ClientError::invalid_request(e.to_string()))?)
    };

    let target = match (uri.query(), appended) {
        (None, None) => path.to_owned(),
        (Some(query), None) => format!("{path}?{query}"),
        (None, Some(extra)) => format!("{path}?{extra}"),
        (Some(query), Some(extra)) => format!("{path}?{query}&{extra}"),
    };

    target.parse().map_err(|_| ClientError::invalid_url("request target is not a valid uri"))
}

/// The response of a completed exchange. The body owns the transport;
/// dropping the response closes the connection.
pub struct ClientResponse {
    inner: http::Response<ClientResponseBody<TcpStream>>,
}

impl ClientResponse {
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Drains the body into a byte vector, failing past `max` bytes.
    pub async fn as_vec(self, max: usize) -> Result<Vec<u8>, ClientError> {
        let mut body = self.inner.into_body();
        let collected = read_until_eof(&mut body, max).await.map_err(HttpError::from)?;
        Ok(collected.into())
    }

    /// Drains the body into a UTF-8 string, failing past `max` bytes.
    pub async fn as_string(self, max: usize) -> Result<String, ClientError> {
        let collected = self.as_vec(max).await?;
        String::from_utf8(collected).map_err(|_| ClientError::invalid_request("response body is not valid utf-8"))
    }

    /// Verifies the `application/json` content type, drains the body and
    /// deserializes it.
    pub async fn as_json<T: DeserializeOwned>(self, max: usize) -> Result<T, ClientError> {
        let content_type = self
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_default();

        let is_json = content_type
            .parse::<mime::Mime>()
            .is_ok_and(|m| m.type_() == mime::APPLICATION && m.subtype() == mime::JSON);
        if !is_json {
            return Err(ClientError::ContentType { found: content_type });
        }

        let collected = self.as_vec(max).await?;
        serde_json::from_slice(&collected).map_err(|e| ClientError::invalid_request(format!("invalid json body: {e}")))
    }

    /// Streams the body into a newly created file, returning the number
    /// of bytes written.
    pub async fn as_file(self, path: impl AsRef<FsPath>) -> Result<u64, ClientError> {
        let mut body = self.inner.into_body();
        let mut file = tokio::fs::File::create(path).await?;

        let mut written: u64 = 0;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(HttpError::from)?;
            if let Ok(data) = frame.into_data() {
                file.write_all(&data).await?;
                written += data.len() as u64;
            }
        }
        file.flush().await?;

        Ok(written)
    }
}

impl std::fmt::Debug for ClientResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientResponse").field("status", &self.status()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::router::{get, post};
    use crate::server::Server;
    use plover_http::connection::{ConnectionConfig, ServerConnection};
    use plover_http::protocol::ConnectInfo;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn hello() -> &'static str {
        "hi"
    }

    async fn echo(body: String) -> String {
        body
    }

    async fn shout(body: String) -> String {
        body.to_uppercase()
    }

    /// Spins up a real listener backed by the full dispatch pipeline and
    /// returns its address.
    async fn spawn_server(server: Server) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let dispatcher = server.test_dispatcher();

        tokio::spawn(async move {
            loop {
                let Ok((stream, remote)) = listener.accept().await else {
                    break;
                };
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let local = stream.local_addr().unwrap();
                    let (reader, writer) = stream.into_split();
                    let connection = ServerConnection::new(reader, writer, ConnectionConfig::default())
                        .with_connect_info(ConnectInfo { local, remote });
                    let _ = connection.process(dispatcher).await;
                });
            }
        });

        address
    }

    #[tokio::test]
    async fn get_round_trip() {
        let server = Server::builder().serve(get("/hello", handler_fn(hello))).build().unwrap();
        let address = spawn_server(server).await;

        let response = Client::get(format!("http://{address}/hello")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.as_string(1024).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn post_body_round_trip() {
        let server = Server::builder().serve(post("/echo", handler_fn(echo))).build().unwrap();
        let address = spawn_server(server).await;

        let response =
            Client::post(format!("http://{address}/echo")).plaintext("speak, friend").send().await.unwrap();
        assert_eq!(response.as_string(1024).await.unwrap(), "speak, friend");
    }

    #[tokio::test]
    async fn expect_continue_round_trip() {
        let server = Server::builder().serve(post("/shout", handler_fn(shout))).build().unwrap();
        let address = spawn_server(server).await;

        let response = Client::post(format!("http://{address}/shout"))
            .expect_continue()
            .plaintext("quiet")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.as_string(1024).await.unwrap(), "QUIET");
    }

    #[tokio::test]
    async fn streamed_request_body_goes_chunked() {
        let server = Server::builder().serve(post("/echo", handler_fn(echo))).build().unwrap();
        let address = spawn_server(server).await;

        let body = crate::body::ChunkedBytes::new(&b"sent in five byte pieces"[..], 5);
        let response = Client::post(format!("http://{address}/echo")).stream(body).send().await.unwrap();
        assert_eq!(response.as_string(1024).await.unwrap(), "sent in five byte pieces");
    }

    #[tokio::test]
    async fn as_json_checks_content_type() {
        use crate::extract::Json;

        async fn number() -> Json<serde_json::Value> {
            Json(serde_json::json!({"n": 7}))
        }

        async fn not_json() -> &'static str {
            "{\"n\": 7}"
        }

        let server = Server::builder()
            .serve(get("/json", handler_fn(number)))
            .serve(get("/text", handler_fn(not_json)))
            .build()
            .unwrap();
        let address = spawn_server(server).await;

        let value: serde_json::Value =
            Client::get(format!("http://{address}/json")).send().await.unwrap().as_json(1024).await.unwrap();
        assert_eq!(value["n"], 7);

        let response = Client::get(format!("http://{address}/text")).send().await.unwrap();
        assert!(matches!(response.as_json::<serde_json::Value>(1024).await, Err(ClientError::ContentType { .. })));
    }

    #[tokio::test]
    async fn as_file_writes_the_body() {
        let server = Server::builder().serve(get("/hello", handler_fn(hello))).build().unwrap();
        let address = spawn_server(server).await;

        let dir = std::env::temp_dir().join(format!("plover-client-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let target = dir.join("body.txt");

        let response = Client::get(format!("http://{address}/hello")).send().await.unwrap();
        let written = response.as_file(&target).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(tokio::fs::read_to_string(&target).await.unwrap(), "hi");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let result = Client::get("https://example.com/").send().await;
        assert!(matches!(result, Err(ClientError::UnsupportedScheme { .. })));
    }

    #[tokio::test]
    async fn query_pairs_are_appended() {
        async fn search(query: &crate::request::QueryMap) -> String {
            query.get("q").unwrap_or("").to_owned()
        }

        let server = Server::builder().serve(get("/search", handler_fn(search))).build().unwrap();
        let address = spawn_server(server).await;

        let response =
            Client::get(format!("http://{address}/search")).query("q", "needle").send().await.unwrap();
        assert_eq!(response.as_string(1024).await.unwrap(), "needle");
    }
}
