//! Serving a file path as a static file.
//!
//! [`StaticFile::open`] captures a file handle and its metadata; as a
//! [`Responder`] it honors the conditional and range headers of the
//! request it answers:
//!
//! - `If-None-Match` against a size/mtime validator, and
//!   `If-Modified-Since` against the file mtime, both producing `304`;
//! - a single `Range: bytes=a-b` producing `206` with `Content-Range`, or
//!   `416` with `Content-Range: bytes */len` when out of bounds.
//!
//! Bodies stream from the file in fixed-size reads while keeping an exact
//! size, so responses stay `Content-Length`-framed.

use bytes::Bytes;
use http::{Response, StatusCode, header};
use http_body_util::StreamBody;
use httpdate::{fmt_http_date, parse_http_date};
use plover_http::protocol::{HttpError, SendError};
use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::body::ResponseBody;
use crate::request::RequestContext;
use crate::responder::Responder;

const READ_CHUNK: usize = 64 * 1024;

/// An opened file plus the metadata needed for conditional requests.
#[derive(Debug)]
pub struct StaticFile {
    file: File,
    len: u64,
    modified: Option<SystemTime>,
    content_type: &'static str,
}

impl StaticFile {
    /// Opens `path` and captures its metadata. Directories are rejected.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<StaticFile> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;

        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
        }

        Ok(StaticFile {
            file,
            len: metadata.len(),
            modified: metadata.modified().ok(),
            content_type: content_type_for(path),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn validator(&self) -> String {
        let mtime = self
            .modified
            .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map_or(0, |duration| duration.as_secs());
        format!("\"{:x}-{:x}\"", self.len, mtime)
    }
}

impl Responder for StaticFile {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
        let etag = self.validator();

        if not_modified(ctx, &etag, self.modified) {
            let mut builder = Response::builder().status(StatusCode::NOT_MODIFIED).header(header::ETAG, &etag);
            if let Some(modified) = self.modified {
                builder = builder.header(header::LAST_MODIFIED, fmt_http_date(modified));
            }
            return builder.body(ResponseBody::empty()).expect("static response parts are valid");
        }

        let range = match requested_range(ctx, self.len) {
            RangeOutcome::Whole => None,
            RangeOutcome::Partial(start, end) => Some((start, end)),
            RangeOutcome::Unsatisfiable => {
                return Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{}", self.len))
                    .body(ResponseBody::empty())
                    .expect("static response parts are valid");
            }
        };

        let mut builder = Response::builder()
            .header(header::CONTENT_TYPE, self.content_type)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::ETAG, &etag);
        if let Some(modified) = self.modified {
            builder = builder.header(header::LAST_MODIFIED, fmt_http_date(modified));
        }

        let (status, offset, length) = match range {
            None => (StatusCode::OK, 0, self.len),
            Some((start, end)) => {
                builder = builder.header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{}", self.len));
                (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
            }
        };

        builder
            .status(status)
            .body(ResponseBody::sized_stream(file_body(self.file, offset, length), length))
            .expect("static response parts are valid")
    }
}

/// Reads `length` bytes starting at `offset` as a stream of data frames.
fn file_body(file: File, offset: u64, length: u64) -> impl http_body::Body<Data = Bytes, Error = HttpError> + Send {
    struct ReadState {
        file: File,
        seek_to: Option<u64>,
        remaining: u64,
    }

    let state = ReadState { file, seek_to: (offset > 0).then_some(offset), remaining: length };

    let stream = futures::stream::try_unfold(state, |mut state| async move {
        if let Some(position) = state.seek_to.take() {
            state.file.seek(SeekFrom::Start(position)).await.map_err(SendError::io)?;
        }

        if state.remaining == 0 {
            return Ok(None);
        }

        let capacity = usize::try_from(state.remaining).unwrap_or(READ_CHUNK).min(READ_CHUNK);
        let mut buffer = vec![0u8; capacity];
        let n = state.file.read(&mut buffer).await.map_err(SendError::io)?;
        if n == 0 {
            // file shrank under us
            return Err(SendError::io(io::Error::new(io::ErrorKind::UnexpectedEof, "file truncated while streaming")));
        }

        buffer.truncate(n);
        state.remaining -= n as u64;
        Ok(Some((http_body::Frame::data(Bytes::from(buffer)), state)))
    });

    StreamBody::new(futures::TryStreamExt::map_err(stream, HttpError::from))
}

fn not_modified(ctx: &RequestContext, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(candidates) = ctx.headers().get(header::IF_NONE_MATCH).and_then(|value| value.to_str().ok()) {
        return candidates.split(',').any(|candidate| {
            let candidate = candidate.trim();
            candidate == "*" || candidate.trim_start_matches("W/") == etag
        });
    }

    if let (Some(since), Some(modified)) =
        (ctx.headers().get(header::IF_MODIFIED_SINCE).and_then(|value| value.to_str().ok()), modified)
    {
        if let Ok(since) = parse_http_date(since) {
            // http dates have second granularity
            let modified_secs = modified.duration_since(SystemTime::UNIX_EPOCH).map_or(0, |d| d.as_secs());
            let since_secs = since.duration_since(SystemTime::UNIX_EPOCH).map_or(0, |d| d.as_secs());
            return modified_secs <= since_secs;
        }
    }

    false
}

enum RangeOutcome {
    Whole,
    Partial(u64, u64),
    Unsatisfiable,
}

/// Interprets a single-range `Range` header against a resource of `len`
/// bytes. Multi-range requests and unknown units fall back to the whole
/// resource.
fn requested_range(ctx: &RequestContext, len: u64) -> RangeOutcome {
    let Some(value) = ctx.headers().get(header::RANGE).and_then(|value| value.to_str().ok()) else {
        return RangeOutcome::Whole;
    };

    let Some(byte_range) = value.strip_prefix("bytes=") else {
        return RangeOutcome::Whole;
    };

    if byte_range.contains(',') {
        return RangeOutcome::Whole;
    }

    let Some((start_text, end_text)) = byte_range.split_once('-') else {
        return RangeOutcome::Whole;
    };

    match (start_text.trim(), end_text.trim()) {
        // bytes=a-b
        (start, end) if !start.is_empty() && !end.is_empty() => {
            let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
                return RangeOutcome::Whole;
            };
            if start > end || start >= len {
                return RangeOutcome::Unsatisfiable;
            }
            RangeOutcome::Partial(start, end.min(len - 1))
        }

        // bytes=a-
        (start, "") if !start.is_empty() => {
            let Ok(start) = start.parse::<u64>() else {
                return RangeOutcome::Whole;
            };
            if start >= len {
                return RangeOutcome::Unsatisfiable;
            }
            RangeOutcome::Partial(start, len - 1)
        }

        // bytes=-n (final n bytes)
        ("", end) if !end.is_empty() => {
            let Ok(suffix) = end.parse::<u64>() else {
                return RangeOutcome::Whole;
            };
            if suffix == 0 || len == 0 {
                return RangeOutcome::Unsatisfiable;
            }
            RangeOutcome::Partial(len.saturating_sub(suffix), len - 1)
        }

        _ => RangeOutcome::Whole,
    }
}

/// Responder for the common `io::Result<StaticFile>` handler return.
impl Responder for io::Error {
    fn response_to(self, ctx: &RequestContext) -> Response<ResponseBody> {
        match self.kind() {
            io::ErrorKind::NotFound => (StatusCode::NOT_FOUND, "file not found").response_to(ctx),
            io::ErrorKind::PermissionDenied => (StatusCode::FORBIDDEN, "access denied").response_to(ctx),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "failed to read file").response_to(ctx),
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|extension| extension.to_str()).unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "txt" => "text/plain; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}
