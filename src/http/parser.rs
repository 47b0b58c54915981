use crate::http::request::{Method, RequestHead};
use std::collections::HashMap;

/// Upper bound on header lines in one request head.
pub const MAX_HEADERS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("request head is incomplete")]
    Incomplete,
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),
}

/// Parses a buffered request head (request line, headers, blank line).
///
/// Header names are upper-cased with `-` turned into `_`, and prefixed with
/// `HTTP_` except for `CONTENT_TYPE` and `CONTENT_LENGTH`. Repeated headers
/// are joined with `\n`.
pub fn parse_request_head(buf: &[u8]) -> Result<RequestHead, ParseError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);

    if req.parse(buf)?.is_partial() {
        return Err(ParseError::Incomplete);
    }

    let method = Method::parse(req.method.unwrap_or_default());
    let target = req.path.unwrap_or_default();
    let (path, query_string) = target.split_once('?').unwrap_or((target, ""));

    let mut headers: HashMap<String, String> = HashMap::new();
    for header in req.headers.iter() {
        let value = String::from_utf8_lossy(header.value);
        headers
            .entry(normalize_header_name(header.name))
            .and_modify(|existing| {
                existing.push('\n');
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }

    let content_length = headers
        .get("CONTENT_LENGTH")
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength(v.clone()))
        })
        .transpose()?;

    Ok(RequestHead {
        method,
        path: path.to_string(),
        query_string: query_string.to_string(),
        headers,
        content_length,
        minor_version: req.version.unwrap_or(1),
    })
}

/// `Accept-Encoding` becomes `HTTP_ACCEPT_ENCODING`, `content-type` becomes `CONTENT_TYPE`.
pub fn normalize_header_name(name: &str) -> String {
    let key = name.to_ascii_uppercase().replace('-', "_");

    if key == "CONTENT_TYPE" || key == "CONTENT_LENGTH" {
        key
    } else {
        format!("HTTP_{key}")
    }
}
