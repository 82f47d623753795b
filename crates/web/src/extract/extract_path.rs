//! Typed extraction from path captures.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::body::OptionReqBody;
use crate::extract::de::PathDeserializer;
use crate::extract::{ExtractError, FromRequest, Path};
use crate::request::RequestContext;

/// Destructures the path captures into `T`: structs by capture name,
/// tuples by capture position, a single primitive from a single capture.
/// Conversion failures and arity mismatches map to `400`.
#[async_trait]
impl<T> FromRequest for Path<T>
where
    T: DeserializeOwned + Send,
{
    type Output<'r> = Path<T>;
    type Error = ExtractError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        T::deserialize(PathDeserializer::new(ctx.path_info().params())).map(Path).map_err(ExtractError::bad_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::router::{Router, get};
    use crate::test_request::{TestRequest, loopback_connect_info};
    use http::StatusCode;
    use http_body_util::BodyExt;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Film {
        user: String,
        year: u16,
    }

    async fn by_name(Path(film): Path<Film>) -> String {
        format!("{}/{}", film.user, film.year)
    }

    async fn by_position(Path((user, year)): Path<(String, u16)>) -> String {
        format!("{user}:{year}")
    }

    async fn wants_two(Path((_a, _b)): Path<(String, String)>) -> &'static str {
        "unreachable"
    }

    async fn dispatch(router: &Router, path: &str) -> (StatusCode, String) {
        let (head, body) = TestRequest::get().into_parts(path);
        let response = router.dispatch(head, body, loopback_connect_info()).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn named_fields_from_captures() {
        let router =
            Router::builder().route(get("/users/{user}/y/{year}", handler_fn(by_name))).build().unwrap();

        let (status, body) = dispatch(&router, "/users/alice/y/2024").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice/2024");
    }

    #[tokio::test]
    async fn positional_tuple_from_captures() {
        let router =
            Router::builder().route(get("/users/{user}/y/{year}", handler_fn(by_position))).build().unwrap();

        let (status, body) = dispatch(&router, "/users/bob/y/1984").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "bob:1984");
    }

    #[tokio::test]
    async fn conversion_failure_is_bad_request() {
        let router =
            Router::builder().route(get("/users/{user}/y/{year}", handler_fn(by_name))).build().unwrap();

        let (status, _) = dispatch(&router, "/users/alice/y/not-a-year").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn too_few_captures_is_bad_request() {
        let router = Router::builder().route(get("/one/{a}", handler_fn(wants_two))).build().unwrap();

        let (status, _) = dispatch(&router, "/one/x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wildcard_capture_reaches_typed_path() {
        #[derive(Deserialize)]
        struct Rest {
            rest: String,
        }

        async fn tail(Path(Rest { rest }): Path<Rest>) -> String {
            rest
        }

        let router = Router::builder().route(get("/files/#rest", handler_fn(tail))).build().unwrap();

        let (status, body) = dispatch(&router, "/files/a/b/c.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "a/b/c.txt");
    }
}
