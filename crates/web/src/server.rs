//! Server driver: builder, accept loops, shutdown, and the test entry
//! point.
//!
//! ```no_run
//! use plover_web::{Server, handler_fn};
//! use plover_web::router::get;
//!
//! async fn hello_world() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! fn main() {
//!     Server::builder()
//!         .bind("127.0.0.1:3000")
//!         .serve(get("/", handler_fn(hello_world)))
//!         .build()
//!         .unwrap()
//!         .run(4);
//! }
//! ```

use http::{Request, Response};
use plover_http::connection::{ConnectionConfig, DEFAULT_REQUEST_TIMEOUT, ServerConnection};
use plover_http::handler::Handler;
use plover_http::protocol::body::ReqBody;
use plover_http::protocol::{ConnectInfo, RequestHead};
use std::any::Any;
use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::body::{OptionReqBody, ResponseBody};
use crate::handler::RequestHandler;
use crate::middleware::{CatchPanic, Middleware, PanicHook};
use crate::router::{Route, Router, RouterBuilder, RouterError, Scope};
use crate::test_request::{TestRequest, loopback_connect_info};

/// Builder for a [`Server`]: listen addresses, routes, policies.
pub struct ServerBuilder {
    addresses: Vec<SocketAddr>,
    router: RouterBuilder,
    max_listen_connections: u32,
    client_request_timeout: Duration,
    read_buffer_size: usize,
    exception_handler: Option<PanicHook>,
    bind_error: Option<io::Error>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            addresses: Vec::new(),
            router: Router::builder(),
            max_listen_connections: 1024,
            client_request_timeout: DEFAULT_REQUEST_TIMEOUT,
            read_buffer_size: 8 * 1024,
            exception_handler: None,
            bind_error: None,
        }
    }

    /// Adds a listen address; may be called multiple times.
    pub fn bind<A: ToSocketAddrs>(mut self, address: A) -> Self {
        match address.to_socket_addrs() {
            Ok(addrs) => self.addresses.extend(addrs),
            Err(e) => self.bind_error = Some(e),
        }
        self
    }

    /// Registers a route.
    pub fn serve(mut self, route: Route) -> Self {
        self.router = self.router.route(route);
        self
    }

    /// Registers a scope of routes.
    pub fn serve_scope(mut self, scope: Scope) -> Self {
        self.router = self.router.scope(scope);
        self
    }

    /// Adds a server-wide middleware, outside all scope and route
    /// middleware.
    pub fn wrap<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.router = self.router.wrap(middleware);
        self
    }

    /// Replaces the built-in `404` handler.
    pub fn default_handler<H: RequestHandler + 'static>(mut self, handler: H) -> Self {
        self.router = self.router.default_handler(handler);
        self
    }

    /// Backlog passed to `listen(2)`.
    pub fn max_listen_connections(mut self, max: u32) -> Self {
        self.max_listen_connections = max;
        self
    }

    /// Per-phase transport deadline applied to every connection.
    pub fn client_request_timeout(mut self, timeout: Duration) -> Self {
        self.client_request_timeout = timeout;
        self
    }

    /// Initial capacity of each connection's transport read buffer.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Observes panic payloads escaping handlers. Regardless of the hook,
    /// the affected request is answered with a bodyless `500`.
    pub fn exception_handler<F>(mut self, hook: F) -> Self
    where
        F: Fn(&(dyn Any + Send)) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        if let Some(e) = self.bind_error {
            return Err(ServerBuildError::Bind { source: e });
        }

        let catcher = match self.exception_handler {
            Some(hook) => CatchPanic::with_hook(hook),
            None => CatchPanic::new(),
        };
        let router = self.router.wrap_first(Arc::new(catcher)).build()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Server {
            dispatcher: Arc::new(Dispatcher { router }),
            addresses: self.addresses,
            max_listen_connections: self.max_listen_connections,
            client_request_timeout: self.client_request_timeout,
            read_buffer_size: self.read_buffer_size,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder").field("addresses", &self.addresses).finish_non_exhaustive()
    }
}

/// Errors surfaced by [`ServerBuilder::build`].
#[derive(Error, Debug)]
pub enum ServerBuildError {
    /// A route failed to register (duplicate or malformed pattern).
    #[error(transparent)]
    Router(#[from] RouterError),

    /// A bind address did not resolve.
    #[error("failed to resolve bind address: {source}")]
    Bind { source: io::Error },
}

/// The built server: routes are frozen, listeners not yet open.
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    addresses: Vec<SocketAddr>,
    max_listen_connections: u32,
    client_request_timeout: Duration,
    read_buffer_size: usize,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// A handle that stops the accept loops and lets connections drain to
    /// their next keep-alive boundary.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: Arc::clone(&self.shutdown_tx) }
    }

    /// Builds a multi-threaded runtime, installs the tracing subscriber
    /// and blocks until shutdown (ctrl-c or a [`ShutdownHandle`]).
    pub fn run(self, threads: usize) {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            warn!("tracing subscriber was already installed");
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .enable_all()
            .build()
            .expect("failed to build the runtime");

        runtime.block_on(async move {
            let shutdown = self.shutdown_handle();
            let mut serving = tokio::spawn(self.async_run());

            tokio::select! {
                result = &mut serving => {
                    report_serve_result(result);
                    return;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("ctrl-c received, shutting down");
                    shutdown.shutdown();
                }
            }

            // let the accept loops wind down before returning
            report_serve_result(serving.await);
        });
    }

    /// Cooperative variant of [`Server::run`]: binds the listeners and
    /// serves until shutdown is requested.
    pub async fn async_run(self) -> io::Result<()> {
        if self.addresses.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no listen address configured"));
        }

        info!(addresses = ?self.addresses, "server starting");

        let mut accept_tasks = Vec::with_capacity(self.addresses.len());
        for address in &self.addresses {
            let listener = self.listener_on(*address)?;
            let dispatcher = Arc::clone(&self.dispatcher);
            let config = ConnectionConfig::new(self.client_request_timeout)
                .with_read_buffer_size(self.read_buffer_size)
                .with_shutdown(self.shutdown_rx.clone());
            let mut shutdown_rx = self.shutdown_rx.clone();

            accept_tasks.push(tokio::spawn(async move {
                loop {
                    let accepted = tokio::select! {
                        biased;
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                info!("accept loop stopping");
                                break;
                            }
                            continue;
                        }
                        accepted = listener.accept() => accepted,
                    };

                    match accepted {
                        Ok((stream, remote)) => {
                            spawn_connection(stream, remote, Arc::clone(&dispatcher), config.clone());
                        }
                        Err(e) => {
                            warn!("failed to accept connection: {}", e);
                        }
                    }
                }
            }));
        }

        for task in accept_tasks {
            let _ = task.await;
        }
        Ok(())
    }

    fn listener_on(&self, address: SocketAddr) -> io::Result<TcpListener> {
        let socket = match address {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(address)?;
        socket.listen(self.max_listen_connections)
    }

    pub(crate) fn test_dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Dispatches a synthesized request through the full route +
    /// middleware + handler pipeline, without a socket.
    pub async fn serve_request(&self, path: &str, request: TestRequest) -> Response<ResponseBody> {
        let (head, body) = request.into_parts(path);
        self.dispatcher.router.dispatch(head, body, loopback_connect_info()).await
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("addresses", &self.addresses).finish_non_exhaustive()
    }
}

fn report_serve_result(result: Result<io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("server stopped"),
        Ok(Err(e)) => error!("server failed: {}", e),
        Err(e) => error!("server task failed: {}", e),
    }
}

fn spawn_connection(stream: TcpStream, remote: SocketAddr, dispatcher: Arc<Dispatcher>, config: ConnectionConfig) {
    tokio::spawn(async move {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("failed to set nodelay: {}", e);
        }

        let local = stream.local_addr().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        let (reader, writer) = stream.into_split();

        let connection = ServerConnection::new(reader, writer, config)
            .with_connect_info(ConnectInfo { local, remote });

        match connection.process(dispatcher).await {
            Ok(()) => info!(%remote, "connection finished"),
            Err(e) => error!(%remote, "connection failed: {}", e),
        }
    });
}

/// Stops the accept loops; existing connections drain at their next
/// keep-alive boundary.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ShutdownHandle")
    }
}

/// Bridges the protocol engine to the router.
pub(crate) struct Dispatcher {
    pub(crate) router: Router,
}

impl Handler for Dispatcher {
    type RespBody = ResponseBody;
    type Error = Infallible;

    async fn call(&self, request: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error> {
        let connect_info = request.extensions().get::<ConnectInfo>().copied().unwrap_or_else(loopback_connect_info);

        let (parts, body) = request.into_parts();
        let head = RequestHead::from(Request::from_parts(parts, ()));
        let body = OptionReqBody::from(body);

        Ok(self.router.dispatch(head, body, connect_info).await)
    }
}
