use async_trait::async_trait;
use http::Response;
use std::time::Instant;
use tracing::info;

use crate::body::{OptionReqBody, ResponseBody};
use crate::middleware::{Middleware, Next};
use crate::request::RequestContext;

/// Logs one line per request: method, path, status and elapsed time.
#[derive(Debug, Default, Clone, Copy)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Logger {
    async fn handle(&self, ctx: &mut RequestContext, body: OptionReqBody, next: Next<'_>) -> Response<ResponseBody> {
        let method = ctx.method().clone();
        let path = ctx.uri().path().to_owned();
        let start = Instant::now();

        let response = next.run(ctx, body).await;

        info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed = ?start.elapsed(),
            "request handled"
        );
        response
    }
}
