//! Async web framework on top of `plover-http`.
//!
//! The pieces, bottom up:
//!
//! - [`router`] — route patterns, scopes and the trie-based matcher;
//! - [`extract`] — typed handler arguments pulled from the request;
//! - [`middleware`] — wrappers around the handler chain, including the
//!   compression and panic-catching middlewares;
//! - [`server`] — the accept-loop driver and the socketless
//!   [`Server::serve_request`](server::Server::serve_request) test entry;
//! - [`client`] — the one-shot HTTP client;
//! - [`static_file`] — file responses with conditional and range support.
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

mod body;
pub use body::ChunkedBytes;
pub use body::OptionReqBody;
pub use body::ResponseBody;

mod request;
pub use request::QueryMap;
pub use request::RequestContext;

mod state;
pub use state::StateMap;

mod fn_trait;
pub use fn_trait::FnTrait;

mod handler;
pub use handler::FnHandler;
pub use handler::RequestHandler;
pub use handler::handler_fn;

mod responder;
pub use responder::Responder;
pub use responder::ResponseBuilderExt;

pub mod extract;
pub mod middleware;
pub mod router;

pub mod client;
pub mod server;
pub use server::Server;

mod static_file;
pub use static_file::StaticFile;

mod test_request;
pub use test_request::TestRequest;
