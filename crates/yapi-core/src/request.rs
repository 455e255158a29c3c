//! The canonical, transport-ready request.
//!
//! A `Request` is produced once per compile and never mutated afterwards.
//! Transport-specific settings live in [`TransportExtras`] so transports never
//! look at the original document.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// HTTP verbs accepted without a warning.
pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Canonical method name: trimmed, uppercased, `GET` when empty.
pub fn canonical_method(method: &str) -> String {
    let method = method.trim();
    if method.is_empty() {
        "GET".to_string()
    } else {
        method.to_ascii_uppercase()
    }
}

pub fn is_known_method(method: &str) -> bool {
    HTTP_METHODS.contains(&canonical_method(method).as_str())
}

/// How a request is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Grpc,
    Tcp,
    Graphql,
}

impl TransportKind {
    /// Pick the transport from the URL scheme, then from the presence of a
    /// GraphQL query.
    pub fn detect(url: &str, has_graphql: bool) -> Self {
        let lower = url.trim_start().to_ascii_lowercase();
        if lower.starts_with("grpc://") || lower.starts_with("grpcs://") {
            TransportKind::Grpc
        } else if lower.starts_with("tcp://") {
            TransportKind::Tcp
        } else if has_graphql {
            TransportKind::Graphql
        } else {
            TransportKind::Http
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::Grpc => "grpc",
            TransportKind::Tcp => "tcp",
            TransportKind::Graphql => "graphql",
        }
    }

    /// Transports whose `method` is an HTTP verb.
    pub fn uses_http_method(&self) -> bool {
        matches!(self, TransportKind::Http | TransportKind::Graphql)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcExtras {
    pub service: String,
    pub rpc: String,
    pub proto: String,
    pub proto_path: String,
    pub plaintext: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpExtras {
    pub data: String,
    pub encoding: String,
    /// Seconds, 0 for none.
    pub read_timeout: u64,
    /// Milliseconds, 0 for the transport default.
    pub idle_timeout: u64,
    pub close_after_send: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlExtras {
    pub query: String,
    /// Variables serialized as JSON.
    pub variables: Option<String>,
}

/// Settings only one transport understands, selected by the transport tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportExtras {
    Http,
    Grpc(GrpcExtras),
    Tcp(TcpExtras),
    Graphql(GraphqlExtras),
}

impl TransportExtras {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportExtras::Http => TransportKind::Http,
            TransportExtras::Grpc(_) => TransportKind::Grpc,
            TransportExtras::Tcp(_) => TransportKind::Tcp,
            TransportExtras::Graphql(_) => TransportKind::Graphql,
        }
    }
}

/// Which document field produced the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodySource {
    Body,
    Json,
    Form,
}

impl BodySource {
    pub fn field(&self) -> &'static str {
        match self {
            BodySource::Body => "body",
            BodySource::Json => "json",
            BodySource::Form => "form",
        }
    }
}

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
    pub body_source: Option<BodySource>,
    pub extras: TransportExtras,
    /// Skip TLS verification (HTTP/GraphQL) or use an insecure channel (gRPC).
    pub insecure: bool,
    /// Applied to the response body after execution.
    pub jq_filter: Option<String>,
    pub timeout: Option<String>,
    pub output_file: Option<String>,
}

impl Request {
    pub fn transport(&self) -> TransportKind {
        self.extras.kind()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Flat string view of the transport settings, keyed like the CLI's
    /// `--verbose` output. `transport` is always present.
    pub fn metadata(&self) -> BTreeMap<&'static str, String> {
        let mut meta = BTreeMap::new();
        meta.insert("transport", self.transport().to_string());
        meta.insert("insecure", self.insecure.to_string());
        if let Some(source) = self.body_source {
            meta.insert("body_source", source.field().to_string());
        }
        match &self.extras {
            TransportExtras::Http => {}
            TransportExtras::Grpc(grpc) => {
                meta.insert("service", grpc.service.clone());
                meta.insert("rpc", grpc.rpc.clone());
                meta.insert("proto", grpc.proto.clone());
                meta.insert("proto_path", grpc.proto_path.clone());
                meta.insert("plaintext", grpc.plaintext.to_string());
            }
            TransportExtras::Tcp(tcp) => {
                meta.insert("data", tcp.data.clone());
                meta.insert("encoding", tcp.encoding.clone());
                meta.insert("read_timeout", tcp.read_timeout.to_string());
                meta.insert("idle_timeout", tcp.idle_timeout.to_string());
                meta.insert("close_after_send", tcp.close_after_send.to_string());
            }
            TransportExtras::Graphql(gql) => {
                meta.insert("graphql_query", gql.query.clone());
                if let Some(vars) = &gql.variables {
                    meta.insert("graphql_variables", vars.clone());
                }
            }
        }
        if let Some(filter) = &self.jq_filter {
            meta.insert("jq_filter", filter.clone());
        }
        if let Some(timeout) = &self.timeout {
            meta.insert("timeout", timeout.clone());
        }
        if let Some(output) = &self.output_file {
            meta.insert("output_file", output.clone());
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_transport() {
        assert_eq!(
            TransportKind::detect("grpc://localhost:50051", false),
            TransportKind::Grpc
        );
        assert_eq!(
            TransportKind::detect("GRPCS://api:443", true),
            TransportKind::Grpc
        );
        assert_eq!(
            TransportKind::detect("tcp://localhost:9000", true),
            TransportKind::Tcp
        );
        assert_eq!(
            TransportKind::detect("https://api/graphql", true),
            TransportKind::Graphql
        );
        assert_eq!(
            TransportKind::detect("https://api", false),
            TransportKind::Http
        );
    }

    #[test]
    fn test_canonical_method() {
        assert_eq!(canonical_method(""), "GET");
        assert_eq!(canonical_method(" post "), "POST");
        assert!(is_known_method("patch"));
        assert!(!is_known_method("FETCH"));
    }

    #[test]
    fn test_metadata_always_has_transport() {
        let req = Request {
            url: "tcp://localhost:9000".to_string(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
            body_source: None,
            extras: TransportExtras::Tcp(TcpExtras {
                encoding: "hex".to_string(),
                ..Default::default()
            }),
            insecure: false,
            jq_filter: None,
            timeout: None,
            output_file: None,
        };
        let meta = req.metadata();
        assert_eq!(meta["transport"], "tcp");
        assert_eq!(meta["encoding"], "hex");
        assert!(!meta.contains_key("graphql_query"));
    }
}
