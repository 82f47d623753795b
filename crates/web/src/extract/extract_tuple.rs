//! Tuple composition of extractors.
//!
//! A handler taking several parameters extracts them as a tuple, left to
//! right; the first failure wins. Each arity gets its own rejection enum
//! so every element keeps its own error type and status mapping.

use crate::body::OptionReqBody;
use crate::extract::FromRequest;
use crate::request::RequestContext;
use crate::responder::Responder;
use crate::body::ResponseBody;
use http::Response;

macro_rules! impl_tuple_extract {
    ($rejection:ident, $($param:ident)*) => {
        #[async_trait::async_trait]
        impl<$($param,)*> FromRequest for ($($param,)*)
        where
            $($param: FromRequest,)*
            $(for<'any> $param::Output<'any>: Send,)*
        {
            type Output<'r> = ($($param::Output<'r>,)*);
            type Error = $rejection<$($param::Error,)*>;

            #[allow(non_snake_case, reason = "bindings reuse the type parameter names")]
            async fn from_request<'r>(ctx: &'r RequestContext, body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
                Ok(($($param::from_request(ctx, body.clone()).await.map_err($rejection::$param)?,)*))
            }
        }

        /// Rejection of the first failing element in the tuple.
        pub enum $rejection<$($param,)*> {
            $($param($param),)*
        }

        impl<$($param,)*> Responder for $rejection<$($param,)*>
        where
            $($param: Responder,)*
        {
            #[allow(non_snake_case, reason = "bindings reuse the type parameter names")]
            fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
                match self {
                    $($rejection::$param($param) => $param.response_to(ctx),)*
                }
            }
        }
    };
}

impl_tuple_extract! { Rejection1, A }
impl_tuple_extract! { Rejection2, A B }
impl_tuple_extract! { Rejection3, A B C }
impl_tuple_extract! { Rejection4, A B C D }
impl_tuple_extract! { Rejection5, A B C D E }
impl_tuple_extract! { Rejection6, A B C D E F }
impl_tuple_extract! { Rejection7, A B C D E F G }
impl_tuple_extract! { Rejection8, A B C D E F G H }
impl_tuple_extract! { Rejection9, A B C D E F G H I }
impl_tuple_extract! { Rejection10, A B C D E F G H I J }
impl_tuple_extract! { Rejection11, A B C D E F G H I J K }
impl_tuple_extract! { Rejection12, A B C D E F G H I J K L }

#[cfg(test)]
mod tests {
    use crate::handler::{RequestHandler, handler_fn};
    use crate::test_request::TestRequest;
    use http::{HeaderMap, Method};

    #[tokio::test]
    async fn multi_argument_handler_extracts_in_order() {
        async fn probe(method: &Method, headers: &HeaderMap, body: String) -> String {
            format!("{} {} {}", method, headers.len(), body)
        }

        let handler = handler_fn(probe);
        let (head, body) = TestRequest::post().plaintext("payload").into_parts("/");
        let path = head.uri().path().to_owned();
        let mut ctx = crate::request::RequestContext::new(
            head,
            crate::test_request::loopback_connect_info(),
            crate::router::PathInfo::none(path),
            crate::request::QueryMap::default(),
            crate::state::StateMap::default(),
        );

        let response = handler.invoke(&mut ctx, body).await;
        assert_eq!(response.status(), http::StatusCode::OK);
    }
}
