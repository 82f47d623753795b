use async_trait::async_trait;
use futures::FutureExt;
use http::{Response, StatusCode};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

use crate::body::{OptionReqBody, ResponseBody};
use crate::middleware::{Middleware, Next};
use crate::request::RequestContext;

/// Callback invoked with the panic payload of a handler that unwound.
pub type PanicHook = Arc<dyn Fn(&(dyn Any + Send)) + Send + Sync>;

/// Catches panics from the rest of the chain.
///
/// The configured hook observes the panic payload; the client receives a
/// bodyless `500 Internal Server Error` since nothing has been committed
/// to the wire at this point. This is the only place the framework lets a
/// panic cross a subsystem boundary.
#[derive(Clone)]
pub struct CatchPanic {
    hook: PanicHook,
}

impl CatchPanic {
    /// Default hook: log the panic message.
    pub fn new() -> Self {
        Self::with_hook(Arc::new(|payload| {
            error!("handler panicked: {}", describe_panic(payload));
        }))
    }

    pub fn with_hook(hook: PanicHook) -> Self {
        Self { hook }
    }
}

impl Default for CatchPanic {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CatchPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CatchPanic")
    }
}

#[async_trait]
impl Middleware for CatchPanic {
    async fn handle(&self, ctx: &mut RequestContext, body: OptionReqBody, next: Next<'_>) -> Response<ResponseBody> {
        match AssertUnwindSafe(next.run(ctx, body)).catch_unwind().await {
            Ok(response) => response,
            Err(payload) => {
                (self.hook)(payload.as_ref());
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(ResponseBody::empty())
                    .expect("static response parts are valid")
            }
        }
    }
}

/// Best-effort extraction of the panic message.
pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::fold_chain;
    use crate::test_request::TestRequest;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn explodes() -> &'static str {
        panic!("boom");
    }

    #[tokio::test]
    async fn panic_becomes_bodyless_500() {
        let observed = Arc::new(AtomicBool::new(false));
        let observed_in_hook = Arc::clone(&observed);

        let catcher = CatchPanic::with_hook(Arc::new(move |payload| {
            assert_eq!(describe_panic(payload), "boom");
            observed_in_hook.store(true, Ordering::SeqCst);
        }));

        let chain = fold_chain(Arc::new(handler_fn(explodes)), &[Arc::new(catcher) as Arc<dyn Middleware>]);

        let mut ctx = TestRequest::get().into_context("/");
        let response = chain.invoke(&mut ctx, OptionReqBody::empty()).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(observed.load(Ordering::SeqCst));
    }
}
