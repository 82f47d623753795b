//! Per-connection state machines.
//!
//! A [`ServerConnection`] owns one accepted transport and processes
//! requests on it strictly sequentially until the peer goes away, a
//! deadline expires or the server shuts down. A [`ClientConnection`] owns
//! one established transport, sends a single request on it and hands the
//! caller back a response whose body streams from the same transport.

mod server;
pub use server::ConnectionConfig;
pub use server::DEFAULT_REQUEST_TIMEOUT;
pub use server::ServerConnection;

mod client;
pub use client::ClientConnection;
pub use client::ClientResponseBody;
