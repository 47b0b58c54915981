use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Write};

use crate::http::response::{HeaderValue, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response to wire bytes.
///
/// Headers keep their order and spelling. `Content-Length` is computed and
/// appended only when the body is non-empty; in that case any
/// `Content-Length` supplied by the application is left out.
pub fn serialize_response(resp: &Response) -> Bytes {
    let body_len = resp.body_len();
    let mut buf = BytesMut::with_capacity(256 + body_len);

    // Status line
    buf.put_slice(format!("{} {}\r\n", HTTP_VERSION, resp.status).as_bytes());

    // Headers
    for (name, value) in &resp.headers {
        if body_len > 0 && name.eq_ignore_ascii_case("content-length") {
            continue;
        }

        match value {
            HeaderValue::Text(text) => {
                for line in text.lines() {
                    put_header(&mut buf, name, line);
                }
            }
            HeaderValue::List(values) => {
                for value in values {
                    put_header(&mut buf, name, value);
                }
            }
            HeaderValue::Date(time) => {
                put_header(&mut buf, name, &httpdate::fmt_http_date(*time));
            }
        }
    }

    if body_len > 0 {
        put_header(&mut buf, "Content-Length", &body_len.to_string());
    }

    // Header/body separator
    buf.put_slice(b"\r\n");

    // Body
    for chunk in &resp.body {
        buf.put_slice(chunk);
    }

    buf.freeze()
}

fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}

/// A serialized response and how much of it has reached the socket.
#[derive(Debug)]
pub struct ResponseWriter {
    buffer: Bytes,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    /// Writes as much of the remaining response as `stream` accepts.
    ///
    /// Returns `Ok(true)` once everything is written and flushed, `Ok(false)`
    /// if the stream would block first.
    pub fn write_to<W: Write>(&mut self, stream: &mut W) -> io::Result<bool> {
        while self.written < self.buffer.len() {
            match stream.write(&self.buffer[self.written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        stream.flush()?;
        Ok(true)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn is_done(&self) -> bool {
        self.written == self.buffer.len()
    }
}
