//! The request handler boundary between the protocol engine and whatever
//! sits above it (a router, a test harness, a closure).

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;

use crate::protocol::body::ReqBody;

/// An asynchronous request handler.
///
/// The connection hands the handler a request whose body is a lazy
/// [`ReqBody`] stream and expects a response whose body it can serialize.
/// Handler errors are not part of the wire protocol: the connection maps
/// them to a `500` with an empty body.
pub trait Handler: Send + Sync {
    type RespBody: Body<Data = Bytes>;
    type Error: Display;

    fn call(&self, request: Request<ReqBody>) -> impl Future<Output = Result<Response<Self::RespBody>, Self::Error>> + Send;
}

impl<H: Handler> Handler for Arc<H> {
    type RespBody = H::RespBody;
    type Error = H::Error;

    fn call(&self, request: Request<ReqBody>) -> impl Future<Output = Result<Response<Self::RespBody>, Self::Error>> + Send {
        (**self).call(request)
    }
}

impl<H: Handler> Handler for &H {
    type RespBody = H::RespBody;
    type Error = H::Error;

    fn call(&self, request: Request<ReqBody>) -> impl Future<Output = Result<Response<Self::RespBody>, Self::Error>> + Send {
        (**self).call(request)
    }
}
