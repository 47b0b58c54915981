//! The application callback contract.
//!
//! An application receives an [`Environment`] describing one request and
//! returns the [`Response`] to send. It is called synchronously on the
//! dispatch thread, once per request.

use bytes::Bytes;
use std::collections::HashMap;

use crate::http::response::Response;

/// A value in the request environment.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    Text(String),
    List(Vec<String>),
    Int(i64),
    Float(f64),
}

impl EnvValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EnvValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EnvValue::Int(n) => Some(*n as f64),
            EnvValue::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for EnvValue {
    fn from(s: &str) -> Self {
        EnvValue::Text(s.to_string())
    }
}

impl From<String> for EnvValue {
    fn from(s: String) -> Self {
        EnvValue::Text(s)
    }
}

impl From<Vec<String>> for EnvValue {
    fn from(values: Vec<String>) -> Self {
        EnvValue::List(values)
    }
}

impl From<i64> for EnvValue {
    fn from(n: i64) -> Self {
        EnvValue::Int(n)
    }
}

impl From<f64> for EnvValue {
    fn from(n: f64) -> Self {
        EnvValue::Float(n)
    }
}

/// Request environment handed to the application.
///
/// Keys follow the CGI convention: `REQUEST_METHOD`, `PATH_INFO`,
/// `QUERY_STRING`, `SERVER_PROTOCOL`, `SERVER_NAME`, `SERVER_PORT`,
/// `REMOTE_ADDR`, `REMOTE_PORT`, `SERVER_SOFTWARE`, `SCRIPT_NAME`,
/// `REQUEST_START`, `CONTENT_TYPE`, `CONTENT_LENGTH` and one `HTTP_*` key per
/// request header.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub vars: HashMap<String, EnvValue>,
    /// Request body
    pub input: Bytes,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<EnvValue>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.vars.get(key)
    }

    /// Text value of `key`, if present and textual.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.vars.get(key).and_then(EnvValue::as_str)
    }

    pub fn method(&self) -> &str {
        self.get_str("REQUEST_METHOD").unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.get_str("PATH_INFO").unwrap_or_default()
    }

    pub fn query_string(&self) -> &str {
        self.get_str("QUERY_STRING").unwrap_or_default()
    }
}

/// The request-handling callback.
pub trait Application {
    fn call(&self, env: &Environment) -> anyhow::Result<Response>;
}

impl<F> Application for F
where
    F: Fn(&Environment) -> anyhow::Result<Response>,
{
    fn call(&self, env: &Environment) -> anyhow::Result<Response> {
        self(env)
    }
}
