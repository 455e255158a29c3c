//! HTTP transport backed by reqwest.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use yapi_core::duration::parse_duration;
use yapi_core::{Error, Request, Response, Result, Transport};

pub struct HttpTransport {
    client: reqwest::Client,
    /// Accepts any certificate; used for `insecure: true` requests.
    insecure: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let build = |accept_invalid: bool| {
            reqwest::Client::builder()
                .user_agent(concat!("yapi/", env!("CARGO_PKG_VERSION")))
                .danger_accept_invalid_certs(accept_invalid)
                .build()
                .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))
        };
        Ok(Self {
            client: build(false)?,
            insecure: build(true)?,
        })
    }

    /// Create with custom clients.
    pub fn with_clients(client: reqwest::Client, insecure: reqwest::Client) -> Self {
        Self { client, insecure }
    }

    async fn send(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("invalid HTTP method '{}'", request.method)))?;
        let client = if request.insecure {
            &self.insecure
        } else {
            &self.client
        };

        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout.as_deref() {
            let timeout = parse_duration(timeout)
                .map_err(|e| Error::InvalidRequest(format!("invalid timeout: {e}")))?;
            if !timeout.is_zero() {
                builder = builder.timeout(timeout);
            }
        }

        let response = builder.send().await.map_err(map_error)?;
        let status_code = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(map_error)?;
        debug!(status = status_code, bytes = body.len(), "HTTP response");

        Ok(Response {
            status_code,
            headers,
            body,
            ..Default::default()
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn execute(&self, cancel: &CancellationToken, request: &Request) -> Result<Response> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.send(request) => result,
        }
    }
}

/// Repeated headers are joined with `, `.
fn collect_headers(map: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(canonical_header_name(name.as_str()))
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    headers
}

/// `content-type` -> `Content-Type`.
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn map_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_builder() {
        Error::InvalidRequest(e.to_string())
    } else {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("x-request-id"), "X-Request-Id");
        assert_eq!(canonical_header_name("etag"), "Etag");
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let mut map = HeaderMap::new();
        map.append("set-cookie", HeaderValue::from_static("a=1"));
        map.append("set-cookie", HeaderValue::from_static("b=2"));
        map.insert("content-type", HeaderValue::from_static("text/plain"));
        let headers = collect_headers(&map);
        assert_eq!(headers["Set-Cookie"], "a=1, b=2");
        assert_eq!(headers["Content-Type"], "text/plain");
    }
}
