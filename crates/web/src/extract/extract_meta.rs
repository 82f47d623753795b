//! Extractors for request metadata: method, version, headers, endpoints,
//! route match and query map. These never touch the body.

use async_trait::async_trait;
use http::{HeaderMap, Method, Version};
use plover_http::protocol::{ConnectInfo, ParseError, RequestHead};

use crate::body::OptionReqBody;
use crate::extract::FromRequest;
use crate::request::{QueryMap, RequestContext};
use crate::router::PathInfo;

#[async_trait]
impl FromRequest for Method {
    type Output<'r> = Method;
    type Error = ParseError;

    async fn from_request(ctx: &RequestContext, _body: OptionReqBody) -> Result<Self::Output<'static>, Self::Error> {
        Ok(ctx.method().clone())
    }
}

#[async_trait]
impl FromRequest for &Method {
    type Output<'r> = &'r Method;
    type Error = ParseError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(ctx.method())
    }
}

#[async_trait]
impl FromRequest for Version {
    type Output<'r> = Version;
    type Error = ParseError;

    async fn from_request(ctx: &RequestContext, _body: OptionReqBody) -> Result<Self::Output<'static>, Self::Error> {
        Ok(ctx.version())
    }
}

#[async_trait]
impl FromRequest for HeaderMap {
    type Output<'r> = HeaderMap;
    type Error = ParseError;

    async fn from_request(ctx: &RequestContext, _body: OptionReqBody) -> Result<Self::Output<'static>, Self::Error> {
        Ok(ctx.headers().clone())
    }
}

#[async_trait]
impl FromRequest for &HeaderMap {
    type Output<'r> = &'r HeaderMap;
    type Error = ParseError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(ctx.headers())
    }
}

#[async_trait]
impl FromRequest for &RequestHead {
    type Output<'r> = &'r RequestHead;
    type Error = ParseError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(ctx.head())
    }
}

#[async_trait]
impl FromRequest for &RequestContext {
    type Output<'r> = &'r RequestContext;
    type Error = ParseError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(ctx)
    }
}

#[async_trait]
impl FromRequest for ConnectInfo {
    type Output<'r> = ConnectInfo;
    type Error = ParseError;

    async fn from_request(ctx: &RequestContext, _body: OptionReqBody) -> Result<Self::Output<'static>, Self::Error> {
        Ok(*ctx.connect_info())
    }
}

#[async_trait]
impl FromRequest for &ConnectInfo {
    type Output<'r> = &'r ConnectInfo;
    type Error = ParseError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(ctx.connect_info())
    }
}

#[async_trait]
impl FromRequest for &PathInfo {
    type Output<'r> = &'r PathInfo;
    type Error = ParseError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(ctx.path_info())
    }
}

#[async_trait]
impl FromRequest for &QueryMap {
    type Output<'r> = &'r QueryMap;
    type Error = ParseError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        Ok(ctx.query())
    }
}
