//! Request handlers.
//!
//! [`RequestHandler`] is the object-safe invocation interface the router
//! stores; [`handler_fn`] adapts a plain async function into one by
//! extracting its arguments from the request and converting its return
//! value through [`Responder`].

use crate::body::{OptionReqBody, ResponseBody};
use crate::extract::FromRequest;
use crate::fn_trait::FnTrait;
use crate::request::RequestContext;
use crate::responder::Responder;
use async_trait::async_trait;
use http::Response;
use std::marker::PhantomData;

/// An object-safe request handler: context plus body in, response out.
///
/// Failures are not part of this interface; anything that can go wrong is
/// already a response (extractor errors carry their own status mapping).
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, ctx: &mut RequestContext, body: OptionReqBody) -> Response<ResponseBody>;
}

#[async_trait]
impl<T: RequestHandler + ?Sized> RequestHandler for Box<T> {
    async fn invoke(&self, ctx: &mut RequestContext, body: OptionReqBody) -> Response<ResponseBody> {
        (**self).invoke(ctx, body).await
    }
}

#[async_trait]
impl<T: RequestHandler + ?Sized> RequestHandler for std::sync::Arc<T> {
    async fn invoke(&self, ctx: &mut RequestContext, body: OptionReqBody) -> Response<ResponseBody> {
        (**self).invoke(ctx, body).await
    }
}

#[async_trait]
impl RequestHandler for &dyn RequestHandler {
    async fn invoke(&self, ctx: &mut RequestContext, body: OptionReqBody) -> Response<ResponseBody> {
        (**self).invoke(ctx, body).await
    }
}

/// Adapter turning an async function into a [`RequestHandler`].
pub struct FnHandler<F, Args> {
    f: F,
    _args: PhantomData<fn(Args)>,
}

impl<F, Args> FnHandler<F, Args>
where
    F: FnTrait<Args>,
{
    fn new(f: F) -> Self {
        Self { f, _args: PhantomData }
    }
}

/// Wraps an async function as a request handler.
///
/// Each function parameter must implement [`FromRequest`]; the return
/// value must implement [`Responder`].
pub fn handler_fn<F, Args>(f: F) -> FnHandler<F, Args>
where
    F: FnTrait<Args>,
{
    FnHandler::new(f)
}

#[async_trait]
impl<F, Args> RequestHandler for FnHandler<F, Args>
where
    // the argument tuple is extracted from the request
    Args: FromRequest,
    // the function accepts the extracted tuple for any request lifetime
    for<'r> F: FnTrait<Args::Output<'r>>,
    // and its return value converts into a response
    for<'r> <F as FnTrait<Args::Output<'r>>>::Output: Responder,
{
    async fn invoke(&self, ctx: &mut RequestContext, body: OptionReqBody) -> Response<ResponseBody> {
        let args = match Args::from_request(ctx, body.clone()).await {
            Ok(args) => args,
            Err(rejection) => return rejection.response_to(ctx),
        };
        let output = self.f.call(args).await;
        output.response_to(ctx)
    }
}
