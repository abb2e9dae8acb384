//! Inbound request unit: method, raw URL, headers and a body stream.
//!
//! A transport builds a [`Request`] per inbound message and hands it to the
//! [`Dispatcher`](crate::dispatcher::Dispatcher). The body is only consumed when the
//! matched route needs it, so it may stay an unread [`AsyncRead`] stream until then.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Headers, Method};

/// Errors produced while building a request or draining its body.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("request body exceeds maximum allowed size of {max_bytes} bytes")]
    BodyTooLarge { max_bytes: usize },

    #[error("failed to read request body: {0}")]
    Io(#[from] std::io::Error),
}

enum BodyKind {
    Empty,
    Full(Bytes),
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

/// A request body: nothing, a complete buffer, or a stream still to be read.
pub struct Body {
    kind: BodyKind,
}

impl Body {
    pub fn empty() -> Self {
        Self {
            kind: BodyKind::Empty,
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            kind: BodyKind::Full(bytes.into()),
        }
    }

    /// Wraps a reader that yields the body bytes as they arrive.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            kind: BodyKind::Stream(Box::pin(reader)),
        }
    }

    /// Reads the whole body into memory, refusing anything longer than `limit` bytes.
    ///
    /// # Errors
    ///
    /// - [`RequestError::BodyTooLarge`] — the body is longer than `limit`.
    /// - [`RequestError::Io`] — the underlying stream failed.
    pub async fn collect(self, limit: usize) -> Result<Bytes, RequestError> {
        match self.kind {
            BodyKind::Empty => Ok(Bytes::new()),
            BodyKind::Full(bytes) => {
                if bytes.len() > limit {
                    return Err(RequestError::BodyTooLarge { max_bytes: limit });
                }
                Ok(bytes)
            }
            BodyKind::Stream(reader) => {
                let mut buf = Vec::new();
                // One extra byte tells "exactly at the limit" apart from "over it".
                let cap = (limit as u64).saturating_add(1);
                reader.take(cap).read_to_end(&mut buf).await?;
                if buf.len() > limit {
                    return Err(RequestError::BodyTooLarge { max_bytes: limit });
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BodyKind::Empty => f.write_str("Body::Empty"),
            BodyKind::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            BodyKind::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

/// Request metadata without the body, as produced by [`Request::into_parts`].
#[derive(Debug, Clone)]
pub struct Parts {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
}

/// One inbound request.
///
/// The URL is kept raw (path plus optional query string) because query parsing is
/// decided per route at registration time.
///
/// # Examples
///
/// ```
/// use muzu::http::{Method, Request};
///
/// let request = Request::new(Method::Get, "/users/42?expand=true")
///     .header("Accept", "application/json");
///
/// assert_eq!(request.path(), "/users/42");
/// assert_eq!(request.query_string(), Some("expand=true"));
/// assert_eq!(request.headers().get("accept"), Some("application/json"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: String,
    headers: Headers,
    body: Body,
}

impl Request {
    /// Maximum number of headers accepted by [`Request::parse`].
    const MAX_HEADERS: usize = 64;

    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: Body::empty(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a complete in-memory body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::from_bytes(body);
        self
    }

    /// Sets a streaming body that is read lazily by the dispatcher.
    #[must_use]
    pub fn body_stream<R>(mut self, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        self.body = Body::from_reader(reader);
        self
    }

    /// Parses a raw HTTP/1.1 message.
    ///
    /// Returns the request and the byte offset at which its body begins in `buf`.
    /// The body is everything after the header block, truncated to `Content-Length`
    /// when that header is present.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the header block is not complete yet.
    /// - [`RequestError::Parse`] — the data is not valid HTTP/1.x.
    /// - [`RequestError::MissingField`] — the method or path is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
        {
            Ok(method) => method,
            Err(never) => match never {},
        };

        let url = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .to_owned();

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let rest = &buf[body_offset..];
        let body_len = header_map
            .get("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map_or(rest.len(), |len| len.min(rest.len()));
        let body = if body_len == 0 {
            Body::empty()
        } else {
            Body::from_bytes(Bytes::copy_from_slice(&rest[..body_len]))
        };

        Ok((
            Self {
                method,
                url,
                headers: header_map,
                body,
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw request target, query string included.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request path with any query string stripped.
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(p, _)| p)
    }

    /// The raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, q)| q)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Splits the request into its metadata and its unread body.
    pub fn into_parts(self) -> (Parts, Body) {
        (
            Parts {
                method: self.method,
                url: self.url,
                headers: self.headers,
            },
            self.body,
        )
    }
}
