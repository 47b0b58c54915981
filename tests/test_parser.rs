use reactor_httpd::http::parser::{ParseError, normalize_header_name, parse_request_head};
use reactor_httpd::http::request::Method;

#[test]
fn test_parse_simple_get_request() {
    let head = parse_request_head(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();

    assert_eq!(head.method, Method::GET);
    assert_eq!(head.path, "/");
    assert_eq!(head.query_string, "");
    assert_eq!(head.minor_version, 1);
    assert_eq!(head.header("HTTP_HOST"), Some("example.com"));
}

#[test]
fn test_parse_splits_query_string() {
    let head = parse_request_head(b"GET /search?q=rust&page=2 HTTP/1.1\r\n\r\n").unwrap();

    assert_eq!(head.path, "/search");
    assert_eq!(head.query_string, "q=rust&page=2");
}

#[test]
fn test_parse_query_string_split_once() {
    let head = parse_request_head(b"GET /a?b=c?d HTTP/1.1\r\n\r\n").unwrap();

    assert_eq!(head.path, "/a");
    assert_eq!(head.query_string, "b=c?d");
}

#[test]
fn test_parse_normalizes_header_names() {
    let req = b"POST /api HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 5\r\nUser-Agent: test-client\r\nX-Request-Id: 7\r\n\r\n";
    let head = parse_request_head(req).unwrap();

    assert_eq!(head.header("CONTENT_TYPE"), Some("application/json"));
    assert_eq!(head.header("CONTENT_LENGTH"), Some("5"));
    assert_eq!(head.header("HTTP_USER_AGENT"), Some("test-client"));
    assert_eq!(head.header("HTTP_X_REQUEST_ID"), Some("7"));
    assert_eq!(head.header("Content-Type"), None);
    assert_eq!(head.content_length, Some(5));
}

#[test]
fn test_parse_joins_repeated_headers() {
    let req = b"GET / HTTP/1.1\r\nAccept: text/html\r\naccept: application/json\r\n\r\n";
    let head = parse_request_head(req).unwrap();

    assert_eq!(head.header("HTTP_ACCEPT"), Some("text/html\napplication/json"));
}

#[test]
fn test_parse_http10_minor_version() {
    let head = parse_request_head(b"GET / HTTP/1.0\r\n\r\n").unwrap();

    assert_eq!(head.minor_version, 0);
    assert_eq!(head.protocol(), "HTTP/1.0");
}

#[test]
fn test_parse_accepts_bare_newlines() {
    let head = parse_request_head(b"GET /x HTTP/1.1\nHost: h\n\n").unwrap();

    assert_eq!(head.path, "/x");
    assert_eq!(head.header("HTTP_HOST"), Some("h"));
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let result = parse_request_head(b"GET / HTTP/1.1\r\nHost: example.com\r\n");

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_malformed_header() {
    let result = parse_request_head(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n");

    assert!(matches!(result, Err(ParseError::Malformed(_))));
}

#[test]
fn test_parse_invalid_content_length() {
    let result = parse_request_head(b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n");

    assert!(matches!(result, Err(ParseError::InvalidContentLength(v)) if v == "ten"));
}

#[test]
fn test_parse_various_http_methods() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
        ("CONNECT", Method::CONNECT),
        ("PURGE", Method::Extension("PURGE".to_string())),
    ];

    for (method_str, expected_method) in methods {
        let req = format!("{} / HTTP/1.1\r\n\r\n", method_str);
        let head = parse_request_head(req.as_bytes()).unwrap();
        assert_eq!(head.method, expected_method);
        assert_eq!(head.method.as_str(), method_str);
    }
}

#[test]
fn test_normalize_header_name() {
    assert_eq!(normalize_header_name("Host"), "HTTP_HOST");
    assert_eq!(normalize_header_name("x-forwarded-for"), "HTTP_X_FORWARDED_FOR");
    assert_eq!(normalize_header_name("CONTENT-TYPE"), "CONTENT_TYPE");
    assert_eq!(normalize_header_name("Content-Length"), "CONTENT_LENGTH");
}
