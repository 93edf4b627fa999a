//! HTTP request and response types.
//!
//! # Design
//! Requests are plain data: a method, a path relative to the configured base
//! endpoint, per-call header overrides and an optional body. The executor
//! merges them with the base header set at send time, so a test only states
//! how its call differs from the default (for example by dropping the
//! `authorization` header to simulate an anonymous caller).
//!
//! `HttpResponse` is immutable once built. The JSON view of the body is
//! parsed once, up front.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CaseError;
use crate::payload::FieldMap;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub omit_headers: Vec<String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            omit_headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn json(mut self, payload: &FieldMap) -> Self {
        self.body = Some(payload.serialize());
        self
    }

    /// Override (or add) a header for this call only.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Drop one of the executor's base headers for this call.
    pub fn without_header(mut self, name: impl Into<String>) -> Self {
        self.omit_headers.push(name.into());
        self
    }

    /// Drop the bearer credential.
    pub fn anonymous(self) -> Self {
        self.without_header("authorization")
    }
}

/// An HTTP response as received.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    parsed: Option<Value>,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let parsed = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            serde_json::from_slice(&body).ok()
        };
        Self {
            status,
            headers,
            body,
            parsed,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Structured view of the body; `None` for empty or non-JSON bodies.
    pub fn parsed(&self) -> Option<&Value> {
        self.parsed.as_ref()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CaseError> {
        serde_json::from_slice(&self.body).map_err(|e| CaseError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_overrides() {
        let mut payload = FieldMap::new();
        payload.title("t");
        let req = HttpRequest::post("/public/v2/users/1/posts")
            .json(&payload)
            .header("x-trace", "1")
            .anonymous();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.body.as_deref(), Some(&br#"{"title":"t"}"#[..]));
        assert_eq!(req.headers, vec![("x-trace".to_string(), "1".to_string())]);
        assert_eq!(req.omit_headers, vec!["authorization".to_string()]);
    }

    #[test]
    fn response_parses_json_body() {
        let resp = HttpResponse::new(201, Vec::new(), r#"{"id":42}"#);
        assert_eq!(resp.status(), 201);
        assert_eq!(resp.parsed().unwrap()["id"], 42);
    }

    #[test]
    fn empty_and_non_json_bodies_have_no_structured_view() {
        assert!(HttpResponse::new(204, Vec::new(), "").parsed().is_none());
        assert!(HttpResponse::new(500, Vec::new(), "oops").parsed().is_none());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let resp = HttpResponse::new(
            200,
            vec![("Content-Type".to_string(), "application/json".to_string())],
            "{}",
        );
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("x-missing"), None);
    }

    #[test]
    fn typed_decode_failure_is_a_case_error() {
        #[derive(serde::Deserialize)]
        struct Created {
            #[allow(dead_code)]
            id: i64,
        }
        let resp = HttpResponse::new(201, Vec::new(), r#"{"name":"x"}"#);
        assert!(matches!(resp.json::<Created>(), Err(CaseError::Decode(_))));
    }

    #[test]
    fn method_names() {
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }
}
