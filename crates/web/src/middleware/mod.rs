//! Middleware: wrappers around the rest of the handler chain.
//!
//! A middleware receives the request context, the body slot and a
//! [`Next`] continuation. It may short-circuit by building a response
//! without calling `next`, mutate the request headers before handing
//! over, or transform the response on the way back out.
//!
//! Composition order follows declaration order: the first middleware
//! declared is the outermost. Scope middleware composes outside
//! route-level middleware, and server-wide middleware outside both.

mod catch_panic;
pub use catch_panic::CatchPanic;
pub use catch_panic::PanicHook;

mod logger;
pub use logger::Logger;

pub mod compress;
pub use compress::Decompress;
pub use compress::Deflate;
pub use compress::Gzip;

use crate::body::{OptionReqBody, ResponseBody};
use crate::handler::RequestHandler;
use crate::request::RequestContext;
use async_trait::async_trait;
use http::Response;
use std::sync::Arc;

/// A wrapper around the remaining handler chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext, body: OptionReqBody, next: Next<'_>) -> Response<ResponseBody>;
}

/// The suspended remainder of the chain; consumed by running it.
pub struct Next<'a> {
    inner: &'a dyn RequestHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(inner: &'a dyn RequestHandler) -> Self {
        Self { inner }
    }

    pub async fn run(self, ctx: &mut RequestContext, body: OptionReqBody) -> Response<ResponseBody> {
        self.inner.invoke(ctx, body).await
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Next")
    }
}

/// One middleware layered over an inner handler.
struct Layered {
    middleware: Arc<dyn Middleware>,
    inner: Arc<dyn RequestHandler>,
}

#[async_trait]
impl RequestHandler for Layered {
    async fn invoke(&self, ctx: &mut RequestContext, body: OptionReqBody) -> Response<ResponseBody> {
        self.middleware.handle(ctx, body, Next::new(self.inner.as_ref())).await
    }
}

/// Folds `middleware` (declaration order, outermost first) around
/// `handler`.
pub(crate) fn fold_chain(handler: Arc<dyn RequestHandler>, middleware: &[Arc<dyn Middleware>]) -> Arc<dyn RequestHandler> {
    let mut chain = handler;
    for mw in middleware.iter().rev() {
        chain = Arc::new(Layered { middleware: Arc::clone(mw), inner: chain });
    }
    chain
}
