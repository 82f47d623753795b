//! Typed extraction from the query string.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::body::OptionReqBody;
use crate::extract::{ExtractError, FromRequest, Query};
use crate::request::RequestContext;

/// Deserializes the raw query string into `T` by field name.
#[async_trait]
impl<T> FromRequest for Query<T>
where
    T: DeserializeOwned + Send,
{
    type Output<'r> = Query<T>;
    type Error = ExtractError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        serde_urlencoded::from_str(ctx.query().raw()).map(Query).map_err(ExtractError::bad_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_request::TestRequest;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Paging {
        page: u32,
        per_page: Option<u32>,
    }

    #[tokio::test]
    async fn typed_query_extraction() {
        let ctx = TestRequest::get().query("page", "3").into_context("/list");
        let Query(paging) = Query::<Paging>::from_request(&ctx, OptionReqBody::empty()).await.unwrap();
        assert_eq!(paging, Paging { page: 3, per_page: None });
    }

    #[tokio::test]
    async fn missing_required_field_is_bad_request() {
        let ctx = TestRequest::get().into_context("/list");
        let result = Query::<Paging>::from_request(&ctx, OptionReqBody::empty()).await;
        assert!(matches!(result, Err(ExtractError::BadRequest { .. })));
    }

    #[tokio::test]
    async fn conversion_failure_is_bad_request() {
        let ctx = TestRequest::get().query("page", "banana").into_context("/list");
        let result = Query::<Paging>::from_request(&ctx, OptionReqBody::empty()).await;
        assert!(matches!(result, Err(ExtractError::BadRequest { .. })));
    }
}
