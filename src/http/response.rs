use bytes::Bytes;
use std::fmt;
use std::time::SystemTime;

/// HTTP status codes the server and the demo application produce.
///
/// - `Ok` (200): Request successful
/// - `BadRequest` (400): Malformed request
/// - `NotFound` (404): Resource not found
/// - `InternalServerError` (500): Application failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use reactor_httpd::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// The status part of the status line, written verbatim after `HTTP/1.1 `.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// A bare code: `200` renders as `HTTP/1.1 200`.
    Code(u16),
    /// A pre-formatted status such as `"404 Not Found"`.
    Text(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Code(code) => write!(f, "{code}"),
            Status::Text(text) => f.write_str(text),
        }
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        Status::Code(code)
    }
}

impl From<&str> for Status {
    fn from(text: &str) -> Self {
        Status::Text(text.to_string())
    }
}

impl From<String> for Status {
    fn from(text: String) -> Self {
        Status::Text(text)
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Status::Text(format!("{} {}", code.as_u16(), code.reason_phrase()))
    }
}

/// A response header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// One line per `\n`-separated part.
    Text(String),
    /// One line per element, in order.
    List(Vec<String>),
    /// Rendered as an HTTP date.
    Date(SystemTime),
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(values: Vec<String>) -> Self {
        HeaderValue::List(values)
    }
}

impl From<Vec<&str>> for HeaderValue {
    fn from(values: Vec<&str>) -> Self {
        HeaderValue::List(values.into_iter().map(str::to_string).collect())
    }
}

impl From<SystemTime> for HeaderValue {
    fn from(time: SystemTime) -> Self {
        HeaderValue::Date(time)
    }
}

/// What the application returns: status, ordered headers, and body chunks.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    /// Headers in the order they are written
    pub headers: Vec<(String, HeaderValue)>,
    pub body: Vec<Bytes>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use reactor_httpd::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body("{}")
///     .build();
/// assert_eq!(response.headers.len(), 1);
/// ```
pub struct ResponseBuilder {
    status: Status,
    headers: Vec<(String, HeaderValue)>,
    body: Vec<Bytes>,
}

impl ResponseBuilder {
    pub fn new(status: impl Into<Status>) -> Self {
        Self {
            status: status.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header. Repeating a name adds another entry.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Appends a body chunk.
    pub fn body(mut self, chunk: impl Into<Bytes>) -> Self {
        self.body.push(chunk.into());
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .body(body)
            .build()
    }

    /// Creates a 400 Bad Request response.
    pub fn bad_request() -> Self {
        Self::plain(StatusCode::BadRequest, "400 Bad Request")
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::plain(StatusCode::NotFound, "404 Not Found")
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        Self::plain(StatusCode::InternalServerError, "500 Internal Server Error")
    }

    fn plain(status: StatusCode, body: &'static str) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .body(body)
            .build()
    }

    pub fn body_len(&self) -> usize {
        self.body.iter().map(Bytes::len).sum()
    }
}
