//! The server-side connection state machine.
//!
//! One [`ServerConnection`] is spawned per accepted transport. Its loop:
//!
//! 1. read and parse the next request head under the per-phase deadline;
//! 2. answer `Expect: 100-continue` with an interim response;
//! 3. invoke the handler while concurrently pumping the request body from
//!    the framed reader;
//! 4. serialize the response (sized or chunked, from the body's size
//!    hint), appending `Connection: close` on the final exchange;
//! 5. drain any request body bytes the handler left unread, so the framed
//!    reader is positioned at the next head;
//! 6. loop while keep-alive holds, then shut down the write half.
//!
//! Every transport operation is bounded by the configured deadline; an
//! expired deadline closes the connection without a response.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::{HeaderValue, Response, StatusCode, header};
use http_body::Body;
use http_body_util::{BodyExt, Empty};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info, trace};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::Handler;
use crate::protocol::body::{ReqBody, body_channel};
use crate::protocol::{
    BodyKind, ConnectInfo, HttpError, Message, ParseError, PayloadItem, RequestHead, ResponseHead, SendError,
};

/// Default per-phase deadline for transport operations.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection-level policies.
///
/// The deadline applies uniformly to every transport operation: reading a
/// head, writing the interim response, writing each piece of the response
/// and draining leftover body bytes.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub request_timeout: Duration,
    pub read_buffer_size: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ConnectionConfig {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout, read_buffer_size: 8 * 1024, shutdown: None }
    }

    /// Initial capacity of the transport read buffer.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Attaches a shutdown signal: once it flips to `true`, the connection
    /// stops reading new requests at the next keep-alive boundary.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// One accepted HTTP/1.1 connection.
pub struct ServerConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    config: ConnectionConfig,
    connect_info: Option<ConnectInfo>,
}

impl<R, W> ServerConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: ConnectionConfig) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), config.read_buffer_size),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            config,
            connect_info: None,
        }
    }

    /// Records the transport endpoints; they travel to the handler in the
    /// request extensions.
    pub fn with_connect_info(mut self, connect_info: ConnectInfo) -> Self {
        self.connect_info = Some(connect_info);
        self
    }

    /// Processes requests until the connection ends.
    ///
    /// A clean close (peer hung up between requests, deadline expired
    /// while idle, shutdown requested) returns `Ok(())`; protocol and
    /// transport failures return the error after a best-effort `400`.
    pub async fn process<H>(self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        let Self { mut framed_read, mut framed_write, config, connect_info } = self;

        loop {
            let mut shutdown = config.shutdown.clone();
            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("shutdown requested, closing connection at keep-alive boundary");
                    break;
                }
                next = timeout(config.request_timeout, framed_read.next()) => next,
            };

            let (head, kind) = match next {
                Err(_elapsed) => {
                    trace!("deadline expired waiting for the next request head");
                    break;
                }
                Ok(None) => {
                    trace!("peer closed the connection");
                    break;
                }
                Ok(Some(Ok(Message::Head(head)))) => head,
                Ok(Some(Ok(Message::Payload(_)))) => {
                    error!("received payload while expecting a request head");
                    let _ = write_message(&mut framed_write, empty_response(StatusCode::BAD_REQUEST), false, config.request_timeout)
                        .await;
                    return Err(ParseError::invalid_body("payload while expecting a request head").into());
                }
                Ok(Some(Err(e))) => {
                    error!("failed to parse request head: {}", e);
                    let _ = write_message(&mut framed_write, empty_response(StatusCode::BAD_REQUEST), false, config.request_timeout)
                        .await;
                    return Err(e.into());
                }
            };

            let keep_alive = head.keep_alive();

            if head.expects_continue() {
                send_interim_continue(&mut framed_write, config.request_timeout).await?;
            }

            run_exchange(&mut framed_read, &mut framed_write, &config, connect_info, handler.as_ref(), head, kind, keep_alive)
                .await?;

            if !keep_alive {
                trace!("connection not kept alive, closing");
                break;
            }
        }

        let _ = framed_write.get_mut().shutdown().await;
        Ok(())
    }
}

/// Writes the `100 Continue` interim response directly to the transport,
/// bypassing the response encoder (the real response still follows).
async fn send_interim_continue<W>(framed_write: &mut FramedWrite<W, ResponseEncoder>, deadline: Duration) -> Result<(), HttpError>
where
    W: AsyncWrite + Unpin,
{
    let io = async {
        let writer = framed_write.get_mut();
        writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        writer.flush().await
    };

    match timeout(deadline, io).await {
        Ok(Ok(())) => {
            info!("client expects 100-continue, interim response sent");
            Ok(())
        }
        Ok(Err(e)) => Err(SendError::io(e).into()),
        Err(_) => Err(SendError::TimedOut.into()),
    }
}

/// Runs one request/response exchange: handler concurrent with the body
/// pump, then the response, then the end-of-message drain.
#[allow(clippy::too_many_arguments, reason = "split borrows of the connection halves")]
async fn run_exchange<R, W, H>(
    framed_read: &mut FramedRead<R, RequestDecoder>,
    framed_write: &mut FramedWrite<W, ResponseEncoder>,
    config: &ConnectionConfig,
    connect_info: Option<ConnectInfo>,
    handler: &H,
    head: RequestHead,
    kind: BodyKind,
    keep_alive: bool,
) -> Result<(), HttpError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin,
    H: Handler,
    H::RespBody: Body<Data = Bytes> + Unpin,
    <H::RespBody as Body>::Error: Display,
{
    let (req_body, pump) = match kind {
        BodyKind::Empty => (ReqBody::empty(), None),
        _ => {
            let (body, pump) = body_channel(framed_read, kind);
            (body, Some(pump))
        }
    };

    let mut request = head.into_request(req_body);
    if let Some(info) = connect_info {
        request.extensions_mut().insert(info);
    }

    match pump {
        None => {
            let result = handler.call(request).await;
            write_handler_response(framed_write, result, keep_alive, config.request_timeout).await
        }
        Some(mut pump) => {
            // The handler and the body pump have to run concurrently: the
            // handler may block on body data only the pump can provide.
            let result = {
                tokio::pin! {
                    let handler_future = handler.call(request);
                    let pump_future = pump.pump();
                }

                let mut pump_done = false;
                loop {
                    tokio::select! {
                        biased;
                        result = &mut handler_future => break result,
                        _ = &mut pump_future, if !pump_done => {
                            pump_done = true;
                        }
                    }
                }
            };

            write_handler_response(framed_write, result, keep_alive, config.request_timeout).await?;

            // End-of-message invariant: whatever the handler left unread is
            // consumed here, before the next head is parsed.
            match timeout(config.request_timeout, pump.drain()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(ParseError::TimedOut.into()),
            }
        }
    }
}

/// Maps the handler outcome to a wire response: errors become a bodyless
/// `500 Internal Server Error`.
async fn write_handler_response<W, B, E>(
    framed_write: &mut FramedWrite<W, ResponseEncoder>,
    result: Result<Response<B>, E>,
    keep_alive: bool,
    deadline: Duration,
) -> Result<(), HttpError>
where
    W: AsyncWrite + Unpin,
    B: Body<Data = Bytes> + Unpin,
    B::Error: Display,
    E: Display,
{
    match result {
        Ok(response) => write_message(framed_write, response, keep_alive, deadline).await,
        Err(e) => {
            error!("handler failed: {}", e);
            write_message(framed_write, empty_response(StatusCode::INTERNAL_SERVER_ERROR), keep_alive, deadline).await
        }
    }
}

/// Serializes one response: head first, then the body stream, each write
/// bounded by the deadline.
async fn write_message<W, B>(
    framed_write: &mut FramedWrite<W, ResponseEncoder>,
    response: Response<B>,
    keep_alive: bool,
    deadline: Duration,
) -> Result<(), HttpError>
where
    W: AsyncWrite + Unpin,
    B: Body<Data = Bytes> + Unpin,
    B::Error: Display,
{
    let (mut parts, mut body) = response.into_parts();

    if !keep_alive {
        parts.headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    }

    let kind = BodyKind::from_size_hint(&body.size_hint());
    let head: ResponseHead = Response::from_parts(parts, ());

    if kind.is_empty() {
        return timed_send(framed_write, Message::Head((head, kind)), deadline).await;
    }

    // Feed the head without flushing; it goes out with the first chunk.
    match timeout(deadline, framed_write.feed(Message::Head((head, kind)))).await {
        Ok(result) => result.map_err(HttpError::from)?,
        Err(_) => return Err(SendError::TimedOut.into()),
    }

    loop {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    timed_send(framed_write, Message::Payload(PayloadItem::Chunk(data)), deadline).await?;
                }
            }
            Some(Err(e)) => return Err(SendError::invalid_body(format!("response body failed: {e}")).into()),
            None => {
                return timed_send(framed_write, Message::Payload(PayloadItem::Eof), deadline).await;
            }
        }
    }
}

async fn timed_send<W>(
    framed_write: &mut FramedWrite<W, ResponseEncoder>,
    message: Message<(ResponseHead, BodyKind)>,
    deadline: Duration,
) -> Result<(), HttpError>
where
    W: AsyncWrite + Unpin,
{
    match timeout(deadline, framed_write.send(message)).await {
        Ok(result) => result.map_err(HttpError::from),
        Err(_) => Err(SendError::TimedOut.into()),
    }
}

fn empty_response(status: StatusCode) -> Response<Empty<Bytes>> {
    Response::builder().status(status).body(Empty::new()).expect("static response parts are valid")
}

/// Resolves once shutdown is requested; pends forever when no shutdown
/// signal is attached or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        None => std::future::pending().await,
        Some(receiver) => loop {
            if *receiver.borrow() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use std::convert::Infallible;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use crate::protocol::body::read_until_eof;

    struct Echo;

    impl Handler for Echo {
        type RespBody = http_body_util::Full<Bytes>;
        type Error = Infallible;

        async fn call(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
            let (parts, mut body) = request.into_parts();
            let collected = read_until_eof(&mut body, 1 << 20).await.unwrap_or_default();
            let text = format!("{} {} {}", parts.method, parts.uri.path(), collected.len());
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
                .body(http_body_util::Full::new(Bytes::from(text)))
                .unwrap())
        }
    }

    async fn drive(wire_in: &[u8]) -> Vec<u8> {
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let connection = ServerConnection::new(server_read, server_write, ConnectionConfig::default());
        let task = tokio::spawn(connection.process(Arc::new(Echo)));

        client_write.write_all(wire_in).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut out = Vec::new();
        client_read.read_to_end(&mut out).await.unwrap();
        task.await.unwrap().unwrap();
        out
    }

    #[tokio::test]
    async fn simple_get_with_close() {
        let out = drive(b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("connection: close\r\n"));
        assert!(text.ends_with("GET /hello 0"));
    }

    #[tokio::test]
    async fn sized_body_reaches_handler() {
        let out = drive(b"POST /p HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\nConnection: close\r\n\r\nabcd").await;
        let text = String::from_utf8(out).unwrap();

        assert!(text.ends_with("POST /p 4"));
    }

    #[tokio::test]
    async fn chunked_body_reaches_handler() {
        let wire = b"POST /p HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n5\r\nabcde\r\n5\r\nfghij\r\n5\r\nklmno\r\n0\r\n\r\n";
        let out = drive(wire).await;
        let text = String::from_utf8(out).unwrap();

        assert!(text.ends_with("POST /p 15"));
    }

    #[tokio::test]
    async fn keep_alive_processes_requests_in_order() {
        let wire = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
        let out = drive(wire).await;
        let text = String::from_utf8(out).unwrap();

        let first = text.find("GET /a 0").expect("first response present");
        let second = text.find("GET /b 0").expect("second response present");
        assert!(first < second);
    }

    #[tokio::test]
    async fn expect_continue_gets_interim_response() {
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let connection = ServerConnection::new(server_read, server_write, ConnectionConfig::default());
        let task = tokio::spawn(connection.process(Arc::new(Echo)));

        client_write
            .write_all(b"POST /p HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\nExpect: 100-continue\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut interim = [0u8; 25];
        client_read.read_exact(&mut interim).await.unwrap();
        assert_eq!(&interim[..], b"HTTP/1.1 100 Continue\r\n\r\n");

        client_write.write_all(b"abcd").await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut rest = Vec::new();
        client_read.read_to_end(&mut rest).await.unwrap();
        let text = String::from_utf8(rest).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("POST /p 4"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unread_body_is_drained_between_requests() {
        struct Ignores;

        impl Handler for Ignores {
            type RespBody = http_body_util::Full<Bytes>;
            type Error = Infallible;

            async fn call(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
                let path = request.uri().path().to_owned();
                Ok(Response::new(http_body_util::Full::new(Bytes::from(path))))
            }
        }

        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let connection = ServerConnection::new(server_read, server_write, ConnectionConfig::default());
        let task = tokio::spawn(connection.process(Arc::new(Ignores)));

        let wire = b"POST /one HTTP/1.1\r\nHost: x\r\nContent-Length: 6\r\n\r\nunreadGET /two HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
        client_write.write_all(wire).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut out = Vec::new();
        client_read.read_to_end(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("/one"));
        assert!(text.contains("/two"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn parse_error_yields_bad_request() {
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let connection = ServerConnection::new(server_read, server_write, ConnectionConfig::default());
        let task = tokio::spawn(connection.process(Arc::new(Echo)));

        client_write.write_all(b"GET / HTTP/9.9\r\nHost: x\r\n\r\n").await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut out = Vec::new();
        client_read.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn shutdown_signal_closes_at_boundary() {
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = ConnectionConfig::new(Duration::from_secs(30)).with_shutdown(shutdown_rx);
        let connection = ServerConnection::new(server_read, server_write, config);
        let task = tokio::spawn(connection.process(Arc::new(Echo)));

        client_write.write_all(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();

        let mut buf = vec![0u8; 512];
        let n = client_read.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200 OK"));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
