//! The extraction trait and its structural implementations.

use async_trait::async_trait;
use http::StatusCode;
use plover_http::protocol::ParseError;

use crate::body::{OptionReqBody, ResponseBody};
use crate::request::RequestContext;
use crate::responder::Responder;

/// A type whose values are produced from a request.
///
/// `Output<'r>` may borrow from the request context (e.g. `&Method`), so
/// extractors can hand out references without cloning. The error must be
/// a [`Responder`]: each extractor owns the mapping of its failures to an
/// HTTP status.
#[async_trait]
pub trait FromRequest {
    type Output<'r>: Send;
    type Error: Responder + Send;

    async fn from_request<'r>(ctx: &'r RequestContext, body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error>;
}

/// Makes an extractor optional: failures become `None`.
#[async_trait]
impl<T> FromRequest for Option<T>
where
    T: FromRequest,
{
    type Output<'r> = Option<T::Output<'r>>;
    type Error = T::Error;

    async fn from_request<'r>(ctx: &'r RequestContext, body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(T::from_request(ctx, body).await.ok())
    }
}

/// Hands the extraction outcome to the handler for inspection.
#[async_trait]
impl<T> FromRequest for Result<T, T::Error>
where
    T: FromRequest,
{
    type Output<'r> = Result<T::Output<'r>, T::Error>;
    type Error = ParseError;

    async fn from_request<'r>(ctx: &'r RequestContext, body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(T::from_request(ctx, body).await)
    }
}

/// Unit: handlers without parameters.
#[async_trait]
impl FromRequest for () {
    type Output<'r> = ();
    type Error = ParseError;

    async fn from_request(_ctx: &RequestContext, _body: OptionReqBody) -> Result<Self::Output<'static>, Self::Error> {
        Ok(())
    }
}

/// Status mapping for protocol-level failures observed during extraction.
impl Responder for ParseError {
    fn response_to(self, ctx: &RequestContext) -> http::Response<ResponseBody> {
        match self {
            ParseError::HeadTooLarge { .. } => {
                (StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE, "request head too large").response_to(ctx)
            }
            ParseError::BodyTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").response_to(ctx),
            ParseError::TooManyHeaders { .. } => (StatusCode::BAD_REQUEST, "too many headers").response_to(ctx),
            ParseError::InvalidHead { .. } => (StatusCode::BAD_REQUEST, "invalid request head").response_to(ctx),
            ParseError::InvalidVersion(_) => (StatusCode::BAD_REQUEST, "invalid http version").response_to(ctx),
            ParseError::InvalidMethod => (StatusCode::BAD_REQUEST, "invalid http method").response_to(ctx),
            ParseError::InvalidUri => (StatusCode::BAD_REQUEST, "invalid request target").response_to(ctx),
            ParseError::InvalidContentLength { .. } => {
                (StatusCode::BAD_REQUEST, "invalid content-length").response_to(ctx)
            }
            ParseError::InvalidBody { .. } => (StatusCode::BAD_REQUEST, "invalid request body").response_to(ctx),
            ParseError::TimedOut | ParseError::UnexpectedEof | ParseError::Io { .. } => {
                (StatusCode::BAD_REQUEST, "connection error").response_to(ctx)
            }
        }
    }
}
