//! JSON response produced by the dispatcher.
//!
//! Every response the pipeline emits carries `Content-Type: application/json`.
//! [`Response::into_bytes`] renders the HTTP/1.1 wire form for transports that write
//! raw bytes.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;

use super::{Headers, StatusCode};

/// Content type attached to every dispatcher response.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An HTTP response with a serialized JSON body.
///
/// # Examples
///
/// ```
/// use muzu::http::{Response, StatusCode};
/// use serde_json::json;
///
/// let response = Response::json(StatusCode::Created, &json!({ "id": 7 }));
/// assert_eq!(response.status(), StatusCode::Created);
/// assert_eq!(response.headers().get("content-type"), Some("application/json"));
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
/// assert!(text.ends_with("{\"id\":7}"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Serializes `body` as JSON and sets the JSON content type.
    ///
    /// A value that fails to serialize degrades to a 500 with a fixed error body,
    /// so this never panics.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Self {
        let (status, body) = match serde_json::to_vec(body) {
            Ok(bytes) => (status, bytes),
            Err(e) => {
                tracing::error!(error = %e, "response body failed to serialize");
                (
                    StatusCode::InternalServerError,
                    br#"{"kind":"MuzuException","status":500,"message":"Internal server error"}"#
                        .to_vec(),
                )
            }
        };

        let mut headers = Headers::with_capacity(1);
        headers.set("Content-Type", JSON_CONTENT_TYPE);
        Self {
            status,
            headers,
            body,
        }
    }

    /// Appends a header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The serialized JSON body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parses the body back into a JSON value.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// `Content-Length` is always written last, right before the blank line.
    pub fn into_bytes(self) -> BytesMut {
        let content_length = self.body.len();
        let estimated_size = 64 + self.headers.len() * 48 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        buf.put(self.headers.to_string().as_bytes());
        buf.put(format!("Content-Length: {content_length}\r\n\r\n").as_bytes());
        buf.put(self.body.as_slice());

        buf
    }
}
