use bytes::{Bytes, BytesMut};
use std::collections::HashMap;

use crate::http::parser::{parse_request_head, ParseError};

/// HTTP request methods.
///
/// Methods outside the known set are carried as [`Method::Extension`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// TRACE - Message loop-back test
    TRACE,
    /// Any other token
    Extension(String),
}

/// How a method decides that its request has fully arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPolicy {
    /// Complete as soon as the head is parsed.
    NoBody,
    /// Complete once `Content-Length` bytes of body have arrived.
    ContentLength,
    /// Never completes.
    Unsupported,
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// # Example
    ///
    /// ```
    /// # use reactor_httpd::http::request::Method;
    /// assert_eq!(Method::parse("GET"), Method::GET);
    /// assert_eq!(Method::parse("get"), Method::Extension("get".to_string()));
    /// ```
    pub fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            "CONNECT" => Method::CONNECT,
            "TRACE" => Method::TRACE,
            other => Method::Extension(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
            Method::Extension(s) => s,
        }
    }

    pub fn body_policy(&self) -> BodyPolicy {
        match self {
            Method::GET | Method::HEAD | Method::OPTIONS | Method::CONNECT => BodyPolicy::NoBody,
            Method::POST | Method::PUT => BodyPolicy::ContentLength,
            _ => BodyPolicy::Unsupported,
        }
    }
}

/// What the header parser extracts from a request head.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Request path without the query string (e.g., "/index.html")
    pub path: String,
    /// Everything after the first `?`, or empty
    pub query_string: String,
    /// Normalized header names (`HTTP_HOST`, `CONTENT_TYPE`, ...)
    pub headers: HashMap<String, String>,
    pub content_length: Option<usize>,
    /// 0 for HTTP/1.0, 1 for HTTP/1.1
    pub minor_version: u8,
}

impl RequestHead {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    pub fn protocol(&self) -> String {
        format!("HTTP/1.{}", self.minor_version)
    }
}

/// How many bytes the next read may take for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLimit {
    /// Up to and including the next `\n`.
    Line,
    /// At most this many body bytes.
    Bytes(usize),
    /// Nothing more is wanted.
    Done,
}

/// A request being assembled chunk by chunk.
#[derive(Debug, Default)]
pub struct Request {
    header: BytesMut,
    body: BytesMut,
    head: Option<RequestHead>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk: a header line while the head is pending, body bytes after.
    ///
    /// A blank line parses the buffered head. `Ok(true)` means the head was
    /// parsed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Result<bool, ParseError> {
        if self.head.is_some() {
            self.body.extend_from_slice(chunk);
            return Ok(false);
        }

        self.header.extend_from_slice(chunk);
        if chunk != b"\r\n" && chunk != b"\n" {
            return Ok(false);
        }

        match parse_request_head(&self.header) {
            Ok(head) => {
                self.head = Some(head);
                self.header.clear();
                Ok(true)
            }
            // Blank lines ahead of the request line.
            Err(ParseError::Incomplete) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn head(&self) -> Option<&RequestHead> {
        self.head.as_ref()
    }

    pub fn headers_complete(&self) -> bool {
        self.head.is_some()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Hands over the body accumulated so far.
    pub fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }

    /// Declared body length, with a missing `Content-Length` counting as zero.
    pub fn content_length(&self) -> Option<usize> {
        self.head.as_ref().map(|h| h.content_length.unwrap_or(0))
    }

    pub fn is_complete(&self) -> bool {
        let Some(head) = &self.head else {
            return false;
        };

        match head.method.body_policy() {
            BodyPolicy::NoBody => true,
            BodyPolicy::ContentLength => self.body.len() == head.content_length.unwrap_or(0),
            BodyPolicy::Unsupported => false,
        }
    }

    pub fn next_read(&self) -> ReadLimit {
        let Some(head) = &self.head else {
            return ReadLimit::Line;
        };

        match head.method.body_policy() {
            BodyPolicy::ContentLength => {
                match head.content_length.unwrap_or(0).saturating_sub(self.body.len()) {
                    0 => ReadLimit::Done,
                    n => ReadLimit::Bytes(n),
                }
            }
            _ => ReadLimit::Done,
        }
    }
}
