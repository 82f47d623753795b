//! Routes, scopes and the router.
//!
//! A [`Route`] couples an HTTP method and a path pattern with a handler,
//! per-route middleware and per-route state. A [`Scope`] groups routes
//! under a common path prefix with shared middleware and state. The
//! [`Router`] flattens everything into a [`PathTrie`] once, at build time,
//! and then serves lookups without locking.
//!
//! ```no_run
//! use plover_web::router::{Router, get};
//! use plover_web::handler_fn;
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! let router = Router::builder()
//!     .route(get("/hello", handler_fn(hello)))
//!     .build()
//!     .unwrap();
//! ```

mod tree;
pub use tree::Params;
pub use tree::PathInfo;
pub use tree::RouterError;

pub(crate) use tree::MatchError;
use tree::PathTrie;

use http::{Method, Response, StatusCode, header};
use plover_http::protocol::{ConnectInfo, RequestHead};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

use crate::body::{OptionReqBody, ResponseBody};
use crate::handler::{RequestHandler, handler_fn};
use crate::middleware::{Middleware, fold_chain};
use crate::request::{QueryMap, RequestContext};
use crate::responder::ResponseBuilderExt;
use crate::state::StateMap;

/// One registered route: method, pattern, handler, and the middleware and
/// state that apply to it.
pub struct Route {
    method: Method,
    pattern: String,
    handler: Arc<dyn RequestHandler>,
    middleware: Vec<Arc<dyn Middleware>>,
    state: StateMap,
}

impl Route {
    /// Registers `handler` for `method` on `pattern`.
    pub fn new<H: RequestHandler + 'static>(method: Method, pattern: impl Into<String>, handler: H) -> Self {
        Self { method, pattern: pattern.into(), handler: Arc::new(handler), middleware: Vec::new(), state: StateMap::new() }
    }

    /// Adds a middleware; the first one added is the outermost.
    pub fn wrap<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Shares `value` with every request dispatched through this route.
    pub fn with_state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("method", &self.method).field("pattern", &self.pattern).finish_non_exhaustive()
    }
}

macro_rules! method_route {
    ($name:ident, $method:ident) => {
        #[doc = concat!("A route answering `", stringify!($method), "` requests on `pattern`.")]
        pub fn $name<H: RequestHandler + 'static>(pattern: impl Into<String>, handler: H) -> Route {
            Route::new(Method::$method, pattern, handler)
        }
    };
}

method_route!(get, GET);
method_route!(post, POST);
method_route!(put, PUT);
method_route!(delete, DELETE);
method_route!(head, HEAD);
method_route!(options, OPTIONS);
method_route!(patch, PATCH);
method_route!(trace, TRACE);
method_route!(connect, CONNECT);

/// A group of routes under a common path prefix, with shared middleware
/// and state.
///
/// Prefixes concatenate through nesting; state maps merge with the inner
/// scope overriding the outer on a type collision; scope middleware
/// applies outside route-level middleware.
pub struct Scope {
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
    state: StateMap,
    routes: Vec<Route>,
    scopes: Vec<Scope>,
}

/// Creates a scope with the given path prefix (e.g. `"/api/v1"`).
pub fn scope(prefix: impl Into<String>) -> Scope {
    Scope { prefix: prefix.into(), middleware: Vec::new(), state: StateMap::new(), routes: Vec::new(), scopes: Vec::new() }
}

impl Scope {
    pub fn wrap<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn with_state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    pub fn serve(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn serve_scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    fn flatten(self) -> Vec<Route> {
        let Scope { prefix, middleware, state, routes, scopes } = self;

        let nested = scopes.into_iter().flat_map(Scope::flatten);
        routes
            .into_iter()
            .chain(nested)
            .map(|mut route| {
                route.pattern = join_pattern(&prefix, &route.pattern);

                let mut combined = middleware.clone();
                combined.extend(route.middleware);
                route.middleware = combined;

                let mut merged = state.clone();
                merged.merge(&route.state);
                route.state = merged;

                route
            })
            .collect()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("prefix", &self.prefix)
            .field("routes", &self.routes.len())
            .field("scopes", &self.scopes.len())
            .finish_non_exhaustive()
    }
}

fn join_pattern(prefix: &str, pattern: &str) -> String {
    if prefix == "/" || prefix.is_empty() {
        return pattern.to_owned();
    }
    if pattern == "/" { prefix.to_owned() } else { format!("{prefix}{pattern}") }
}

struct Endpoint {
    handler: Arc<dyn RequestHandler>,
    state: StateMap,
}

/// Builder collecting routes, scopes, router-wide middleware and the
/// default handler.
#[derive(Default)]
pub struct RouterBuilder {
    routes: Vec<Route>,
    scopes: Vec<Scope>,
    middleware: Vec<Arc<dyn Middleware>>,
    default_handler: Option<Arc<dyn RequestHandler>>,
}

impl RouterBuilder {
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Adds a router-wide middleware, outside scope and route middleware.
    pub fn wrap<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Installs a middleware outside everything registered so far and
    /// everything yet to come. The server uses this for panic catching.
    pub(crate) fn wrap_first(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.insert(0, middleware);
        self
    }

    /// Replaces the built-in `404` handler.
    pub fn default_handler<H: RequestHandler + 'static>(mut self, handler: H) -> Self {
        self.default_handler = Some(Arc::new(handler));
        self
    }

    /// Builds the route table; duplicate `(method, pattern)` pairs and
    /// malformed patterns are reported here.
    pub fn build(self) -> Result<Router, RouterError> {
        let mut trie = PathTrie::new();

        let mut flat = self.routes;
        for scope in self.scopes {
            flat.extend(scope.flatten());
        }

        for route in flat {
            let mut middleware = self.middleware.clone();
            middleware.extend(route.middleware);

            let endpoint = Endpoint { handler: fold_chain(route.handler, &middleware), state: route.state };
            trie.insert(route.method, &route.pattern, endpoint)?;
        }

        let default_handler = self.default_handler.unwrap_or_else(|| Arc::new(handler_fn(default_not_found)));

        Ok(Router { trie, default_handler })
    }
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.routes.len())
            .field("scopes", &self.scopes.len())
            .finish_non_exhaustive()
    }
}

async fn default_not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "request path is not found")
}

/// The immutable route table plus the dispatch pipeline.
///
/// [`Router::dispatch`] is the single path every request takes, whether it
/// arrived over a socket or through the test entry point.
pub struct Router {
    trie: PathTrie<Endpoint>,
    default_handler: Arc<dyn RequestHandler>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Runs the full pipeline for one request: target parse, route
    /// lookup, context construction, middleware chain, handler.
    pub async fn dispatch(&self, head: RequestHead, body: OptionReqBody, connect_info: ConnectInfo) -> Response<ResponseBody> {
        let path = head.uri().path().to_owned();
        let raw_query = head.uri().query().unwrap_or("");

        let query = match QueryMap::parse(raw_query) {
            Ok(query) => query,
            Err(e) => {
                debug!("failed to parse request target: {}", e);
                let response = Response::builder().status(StatusCode::BAD_REQUEST).plaintext("request target is invalid");
                return with_date(response);
            }
        };

        let response = match self.trie.lookup(head.method(), &path) {
            Ok(matched) => {
                let path_info = PathInfo::new(matched.pattern, path, matched.params);
                let state = matched.value.state.clone();
                let mut ctx = RequestContext::new(head, connect_info, path_info, query, state);
                matched.value.handler.invoke(&mut ctx, body).await
            }

            Err(MatchError::MethodNotAllowed { allowed }) => {
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header(header::ALLOW, allow)
                    .plaintext("request method is not supported")
            }

            Err(MatchError::NotFound) => {
                let mut ctx =
                    RequestContext::new(head, connect_info, PathInfo::none(path), query, StateMap::default());
                self.default_handler.invoke(&mut ctx, body).await
            }
        };

        with_date(response)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Router")
    }
}

fn with_date(mut response: Response<ResponseBody>) -> Response<ResponseBody> {
    if !response.headers().contains_key(header::DATE) {
        if let Ok(value) = httpdate::fmt_http_date(SystemTime::now()).parse() {
            response.headers_mut().insert(header::DATE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::test_request::TestRequest;
    use http_body_util::BodyExt;

    async fn index() -> &'static str {
        "index"
    }

    async fn named(path_info: &PathInfo) -> String {
        format!("user={}", path_info.params().get("user").unwrap_or("?"))
    }

    fn loopback() -> ConnectInfo {
        let addr = "127.0.0.1:0".parse().unwrap();
        ConnectInfo { local: addr, remote: addr }
    }

    async fn run(router: &Router, path: &str, request: TestRequest) -> (StatusCode, String) {
        let (head, body) = request.into_parts(path);
        let response = router.dispatch(head, body, loopback()).await;
        let status = response.status();
        let collected = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&collected).into_owned())
    }

    #[tokio::test]
    async fn routes_by_method_and_pattern() {
        let router = Router::builder()
            .route(get("/", handler_fn(index)))
            .route(get("/users/{user}", handler_fn(named)))
            .build()
            .unwrap();

        let (status, body) = run(&router, "/", TestRequest::get()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "index");

        let (status, body) = run(&router, "/users/alice", TestRequest::get()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user=alice");
    }

    #[tokio::test]
    async fn unmatched_path_hits_default_handler() {
        let router = Router::builder().route(get("/", handler_fn(index))).build().unwrap();

        let (status, body) = run(&router, "/missing", TestRequest::get()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "request path is not found");
    }

    #[tokio::test]
    async fn method_miss_is_405_with_allow() {
        let router = Router::builder().route(get("/only-get", handler_fn(index))).build().unwrap();

        let (head, body) = TestRequest::post().into_parts("/only-get");
        let response = router.dispatch(head, body, loopback()).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET");
    }

    #[tokio::test]
    async fn duplicate_route_fails_at_build() {
        let result = Router::builder()
            .scope(
                scope("/api/v1")
                    .serve(get("/xxx", handler_fn(index)))
                    .serve(get("/xxx", handler_fn(index))),
            )
            .build();

        assert!(matches!(result, Err(RouterError::DuplicateRoute { .. })));
    }

    #[tokio::test]
    async fn scope_prefixes_concatenate() {
        let router = Router::builder()
            .scope(scope("/api").serve_scope(scope("/v1").serve(get("/ping", handler_fn(index)))))
            .build()
            .unwrap();

        let (status, _) = run(&router, "/api/v1/ping", TestRequest::get()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = run(&router, "/ping", TestRequest::get()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scope_state_merges_with_inner_override() {
        use crate::extract::State;

        async fn show(State(value): State<String>) -> String {
            (*value).clone()
        }

        let router = Router::builder()
            .scope(
                scope("/outer")
                    .with_state("outer".to_owned())
                    .serve(get("/plain", handler_fn(show)))
                    .serve_scope(
                        scope("/inner").with_state("inner".to_owned()).serve(get("/override", handler_fn(show))),
                    ),
            )
            .build()
            .unwrap();

        let (_, body) = run(&router, "/outer/plain", TestRequest::get()).await;
        assert_eq!(body, "outer");

        let (_, body) = run(&router, "/outer/inner/override", TestRequest::get()).await;
        assert_eq!(body, "inner");
    }

    #[tokio::test]
    async fn responses_carry_a_date_header() {
        let router = Router::builder().route(get("/", handler_fn(index))).build().unwrap();

        let (head, body) = TestRequest::get().into_parts("/");
        let response = router.dispatch(head, body, loopback()).await;
        assert!(response.headers().contains_key(header::DATE));
    }

    #[tokio::test]
    async fn bad_query_string_is_rejected() {
        let router = Router::builder().route(get("/", handler_fn(index))).build().unwrap();

        let (head, body) = TestRequest::get().into_parts("/?a=%zz");
        let response = router.dispatch(head, body, loopback()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
