//! Extractors that consume the request body.

use async_trait::async_trait;
use bytes::Bytes;
use plover_http::protocol::ParseError;
use plover_http::protocol::body::read_until_eof;
use serde::de::DeserializeOwned;

use crate::body::OptionReqBody;
use crate::extract::{ExtractError, Form, FromRequest, Json, MAX_BODY_BYTES, content_type_matches};
use crate::request::RequestContext;

/// Drains the body into a byte buffer (bounded).
#[async_trait]
impl FromRequest for Bytes {
    type Output<'r> = Bytes;
    type Error = ParseError;

    async fn from_request(_ctx: &RequestContext, body: OptionReqBody) -> Result<Self::Output<'static>, Self::Error> {
        body.apply(|mut body| async move { read_until_eof(&mut body, MAX_BODY_BYTES).await }).await
    }
}

/// Drains the body into a UTF-8 string (bounded).
#[async_trait]
impl FromRequest for String {
    type Output<'r> = String;
    type Error = ParseError;

    async fn from_request(ctx: &RequestContext, body: OptionReqBody) -> Result<Self::Output<'static>, Self::Error> {
        let bytes = <Bytes as FromRequest>::from_request(ctx, body).await?;
        String::from_utf8(bytes.into()).map_err(|_| ParseError::invalid_body("request body is not valid utf-8"))
    }
}

/// Drains the body into an owned byte vector (bounded).
#[async_trait]
impl FromRequest for Vec<u8> {
    type Output<'r> = Vec<u8>;
    type Error = ParseError;

    async fn from_request(ctx: &RequestContext, body: OptionReqBody) -> Result<Self::Output<'static>, Self::Error> {
        let bytes = <Bytes as FromRequest>::from_request(ctx, body).await?;
        Ok(bytes.into())
    }
}

/// Urlencoded form body; the content type must match.
#[async_trait]
impl<T> FromRequest for Form<T>
where
    T: DeserializeOwned + Send,
{
    type Output<'r> = Form<T>;
    type Error = ExtractError;

    async fn from_request<'r>(ctx: &'r RequestContext, body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        if !content_type_matches(ctx, &mime::APPLICATION_WWW_FORM_URLENCODED) {
            return Err(ExtractError::ContentType { expected: "application/x-www-form-urlencoded" });
        }

        let bytes = <Bytes as FromRequest>::from_request(ctx, body).await?;
        serde_urlencoded::from_bytes(&bytes).map(Form).map_err(ExtractError::bad_request)
    }
}

/// JSON body; the content type must match, the read is bounded.
#[async_trait]
impl<T> FromRequest for Json<T>
where
    T: DeserializeOwned + Send,
{
    type Output<'r> = Json<T>;
    type Error = ExtractError;

    async fn from_request<'r>(ctx: &'r RequestContext, body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        if !content_type_matches(ctx, &mime::APPLICATION_JSON) {
            return Err(ExtractError::ContentType { expected: "application/json" });
        }

        let bytes = <Bytes as FromRequest>::from_request(ctx, body).await?;
        serde_json::from_slice(&bytes).map(Json).map_err(ExtractError::bad_request)
    }
}
