//! Structural rules for a compiled request.

use yapi_core::request::is_known_method;
use yapi_core::{ConfigV1, Request, TransportExtras};

use crate::diagnostic::Diagnostic;

pub const TCP_ENCODINGS: &[&str] = &["text", "hex", "base64"];

/// Check `request` against the rules every transport shares.
///
/// `config` is the interpolated document the request was compiled from; the
/// rules report what the user wrote, not the canonical form.
pub fn validate_request(request: &Request, config: &ConfigV1) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    if config.url.trim().is_empty() {
        diags.push(Diagnostic::error("url", "missing required field `url`"));
    }

    let method = config.method.trim();
    let transport = request.transport();
    if let Some(scheme) = deprecated_method_scheme(method) {
        diags.push(Diagnostic::warning(
            "method",
            format!("`method: {method}` is deprecated, use a {scheme}:// URL instead"),
        ));
    } else if transport.uses_http_method() && !is_known_method(method) {
        diags.push(Diagnostic::warning(
            "method",
            format!("unknown HTTP method `{method}`"),
        ));
    }

    match &request.extras {
        TransportExtras::Grpc(grpc) => {
            if grpc.service.is_empty() {
                diags.push(Diagnostic::error("service", "gRPC config requires `service`"));
            }
            if grpc.rpc.is_empty() {
                diags.push(Diagnostic::error("rpc", "gRPC config requires `rpc`"));
            }
        }
        TransportExtras::Tcp(tcp) => {
            if !tcp.encoding.is_empty() && !TCP_ENCODINGS.contains(&tcp.encoding.as_str()) {
                diags.push(Diagnostic::error(
                    "encoding",
                    format!(
                        "unsupported TCP encoding `{}` (allowed: text, hex, base64)",
                        tcp.encoding
                    ),
                ));
            }
        }
        TransportExtras::Http | TransportExtras::Graphql(_) => {}
    }

    if !config.graphql.trim().is_empty() {
        let conflicting = if !config.json.is_empty() {
            Some("json")
        } else if config.body.as_ref().is_some_and(|b| !b.is_empty()) {
            Some("body")
        } else {
            None
        };
        if let Some(other) = conflicting {
            diags.push(Diagnostic::error(
                "graphql",
                format!("`graphql` cannot be used with `{other}`"),
            ));
        }
    }

    diags
}

/// `method: grpc` and `method: tcp` predate URL-scheme transport detection.
fn deprecated_method_scheme(method: &str) -> Option<&'static str> {
    match method.to_ascii_lowercase().as_str() {
        "grpc" => Some("grpc"),
        "tcp" => Some("tcp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yapi_config::{PlaceholderResolver, compile};

    fn check(config: ConfigV1) -> Vec<Diagnostic> {
        let compiled = compile(&config, &PlaceholderResolver);
        let request = compiled.request.expect("request compiles");
        validate_request(&request, &config)
    }

    fn fields(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.field.as_str()).collect()
    }

    #[test]
    fn test_missing_url() {
        let diags = check(ConfigV1 {
            method: "GET".into(),
            ..Default::default()
        });
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_error());
        assert_eq!(diags[0].field, "url");
        assert!(diags[0].message.contains("missing required field"));
    }

    #[test]
    fn test_grpc_requires_service_and_rpc() {
        let diags = check(ConfigV1 {
            url: "grpc://localhost:50051".into(),
            ..Default::default()
        });
        assert_eq!(fields(&diags), vec!["service", "rpc"]);
        assert!(diags.iter().all(Diagnostic::is_error));
    }

    #[test]
    fn test_unknown_method_is_a_warning() {
        let diags = check(ConfigV1 {
            url: "http://x".into(),
            method: "FETCH".into(),
            ..Default::default()
        });
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, crate::Severity::Warning);
        assert_eq!(diags[0].message, "unknown HTTP method `FETCH`");
    }

    #[test]
    fn test_method_ignored_for_tcp() {
        let diags = check(ConfigV1 {
            url: "tcp://localhost:9000".into(),
            method: "SEND".into(),
            ..Default::default()
        });
        assert!(diags.is_empty());
    }

    #[test]
    fn test_deprecated_transport_method() {
        let diags = check(ConfigV1 {
            url: "http://x".into(),
            method: "grpc".into(),
            ..Default::default()
        });
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("grpc://"));
    }

    #[test]
    fn test_tcp_encoding() {
        let diags = check(ConfigV1 {
            url: "tcp://localhost:9000".into(),
            encoding: "utf16".into(),
            ..Default::default()
        });
        assert_eq!(fields(&diags), vec!["encoding"]);

        let diags = check(ConfigV1 {
            url: "tcp://localhost:9000".into(),
            encoding: "hex".into(),
            ..Default::default()
        });
        assert!(diags.is_empty());
    }

    #[test]
    fn test_graphql_with_body() {
        let body = json!({"q": 1}).as_object().cloned();
        let diags = check(ConfigV1 {
            url: "http://x/graphql".into(),
            graphql: "{ a }".into(),
            body,
            ..Default::default()
        });
        assert_eq!(fields(&diags), vec!["graphql"]);
        assert!(diags[0].message.contains("`body`"));

        let diags = check(ConfigV1 {
            url: "http://x/graphql".into(),
            graphql: "{ a }".into(),
            json: "{}".into(),
            ..Default::default()
        });
        assert!(diags[0].message.contains("`json`"));
    }
}
