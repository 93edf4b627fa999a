//! HTTP request executor for the API under test.
//!
//! # Design
//! `Executor` owns the base endpoint and base header set, both fixed at
//! construction from [`ClientConfig`]. The network round-trip sits behind the
//! [`Transport`] trait: `UreqTransport` performs real calls, tests can plug in
//! a canned transport. Status codes are never interpreted here; a `422` is a
//! response like any other and only transport-level failures are errors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Performs one HTTP round-trip against an absolute URL.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(String, String)],
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a `ureq` agent.
///
/// ureq's status-as-error behaviour is disabled so 4xx/5xx come back as
/// responses.
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent, timeout }
    }

    fn timed_out(&self, url: &str) -> TransportError {
        TransportError::Timeout {
            url: url.to_string(),
            timeout: self.timeout,
        }
    }

    fn map_error(&self, url: &str, err: ureq::Error) -> TransportError {
        match err {
            ureq::Error::Timeout(_) => self.timed_out(url),
            ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => self.timed_out(url),
            ureq::Error::Io(e) => TransportError::Io {
                url: url.to_string(),
                reason: e.to_string(),
            },
            other => TransportError::Connect {
                url: url.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn send(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(String, String)],
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, TransportError> {
        let result = match method {
            HttpMethod::Get => with_headers(self.agent.get(url), headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), headers).call(),
            HttpMethod::Post => send_with_body(with_headers(self.agent.post(url), headers), body),
            HttpMethod::Put => send_with_body(with_headers(self.agent.put(url), headers), body),
            HttpMethod::Patch => {
                send_with_body(with_headers(self.agent.patch(url), headers), body)
            }
        };
        let mut response = result.map_err(|e| self.map_error(url, e))?;

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| self.map_error(url, e))?;

        Ok(HttpResponse::new(status, response_headers, bytes))
    }
}

fn send_with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}

/// Issues requests against one base endpoint with one base header set.
#[derive(Clone)]
pub struct Executor {
    base_url: String,
    base_headers: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("base_url", &self.base_url)
            .field(
                "base_headers",
                &self.base_headers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Executor {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(UreqTransport::new(config.timeout)))
    }

    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let mut base_headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("accept".to_string(), "application/json".to_string()),
        ];
        if let Some(token) = &config.token {
            base_headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            base_headers,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Base headers minus the ones the request omits, then its overrides.
    pub fn headers_for(&self, request: &HttpRequest) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .base_headers
            .iter()
            .filter(|(name, _)| {
                !request
                    .omit_headers
                    .iter()
                    .any(|omitted| omitted.eq_ignore_ascii_case(name))
            })
            .cloned()
            .collect();
        for (name, value) in &request.headers {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
        headers
    }

    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url(&request.path);
        let headers = self.headers_for(request);
        log::debug!("{} {url}", request.method);
        let response =
            self.transport
                .send(request.method, &url, &headers, request.body.as_deref())?;
        log::debug!(
            "{} {url} -> {} ({} bytes)",
            request.method,
            response.status(),
            response.body().len()
        );
        Ok(response)
    }
}
