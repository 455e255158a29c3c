//! Compiles a request document into a canonical [`Request`].
//!
//! The compiler is shared by batch execution and the editor integration, so it
//! collects independent errors instead of stopping at the first one.

use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;
use url::form_urlencoded;
use yapi_core::request::{GraphqlExtras, GrpcExtras, TcpExtras, canonical_method};
use yapi_core::{BodySource, ConfigV1, Request, TransportExtras, TransportKind};

use crate::error::{ConfigError, ConfigResult};
use crate::variables::{Resolver, expand_map, expand_object, expand_string};

const MULTIPART_BOUNDARY: &str = "yapi-form-boundary-7MA4YWxkTrZu0gW";

/// One problem found while compiling, attributed to a document field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub field: String,
    pub message: String,
}

impl CompileError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CompileError {}

/// Output of [`compile`]. `request` is absent only when interpolation failed.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub request: Option<Request>,
    pub errors: Vec<CompileError>,
}

impl Compiled {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The request, or every error that was collected.
    pub fn into_request(self) -> Result<Request, Vec<CompileError>> {
        match self.request {
            Some(request) if self.errors.is_empty() => Ok(request),
            _ => Err(self.errors),
        }
    }
}

/// Compile `config` with `resolver` supplying variable values.
pub fn compile(config: &ConfigV1, resolver: &dyn Resolver) -> Compiled {
    let cfg = match interpolate(config, resolver) {
        Ok(cfg) => cfg,
        Err(ConfigError::Interpolation { field, source }) => {
            return Compiled {
                request: None,
                errors: vec![CompileError::new(&field, format!("{field}: {source}"))],
            };
        }
        Err(other) => {
            return Compiled {
                request: None,
                errors: vec![CompileError::new("", other.to_string())],
            };
        }
    };

    let mut errors = Vec::new();
    let url = build_url(&cfg.url, &cfg.path, &cfg.query);
    let mut headers = cfg.headers.clone();

    let body_fields = [
        !cfg.json.is_empty(),
        cfg.body.as_ref().is_some_and(|b| !b.is_empty()),
        !cfg.form.is_empty(),
    ];
    if body_fields.iter().filter(|set| **set).count() > 1 {
        let message = if body_fields[2] {
            "`body`, `json`, and `form` are mutually exclusive"
        } else {
            "`body` and `json` are mutually exclusive"
        };
        errors.push(CompileError::new("body", message));
    }

    let (body, body_source) = if !cfg.json.is_empty() {
        set_default_header(&mut headers, "Content-Type", "application/json");
        (
            Some(Bytes::from(cfg.json.clone())),
            Some(BodySource::Json),
        )
    } else if let Some(map) = &cfg.body {
        match serde_json::to_vec(&Value::Object(map.clone())) {
            Ok(bytes) => {
                set_default_header(&mut headers, "Content-Type", "application/json");
                (Some(Bytes::from(bytes)), Some(BodySource::Body))
            }
            Err(e) => {
                errors.push(CompileError::new(
                    "body",
                    format!("invalid json in 'body' field: {e}"),
                ));
                (None, None)
            }
        }
    } else if !cfg.form.is_empty() {
        let content_type = if cfg.content_type.is_empty() {
            header_value(&headers, "Content-Type")
                .unwrap_or("application/x-www-form-urlencoded")
                .to_string()
        } else {
            cfg.content_type.clone()
        };
        let encoded = if content_type.contains("multipart/form-data") {
            set_header(
                &mut headers,
                "Content-Type",
                &format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            );
            encode_multipart(&cfg.form)
        } else {
            set_header(&mut headers, "Content-Type", &content_type);
            form_urlencoded::Serializer::new(String::new())
                .extend_pairs(cfg.form.iter())
                .finish()
        };
        (Some(Bytes::from(encoded)), Some(BodySource::Form))
    } else {
        (None, None)
    };

    // An explicit content type wins, except over a generated multipart boundary.
    if !cfg.content_type.is_empty() && body_source != Some(BodySource::Form) {
        set_header(&mut headers, "Content-Type", &cfg.content_type);
    }

    let transport = TransportKind::detect(&url, !cfg.graphql.is_empty());
    let extras = match transport {
        TransportKind::Http => TransportExtras::Http,
        TransportKind::Grpc => TransportExtras::Grpc(GrpcExtras {
            service: cfg.service.clone(),
            rpc: cfg.rpc.clone(),
            proto: cfg.proto.clone(),
            proto_path: cfg.proto_path.clone(),
            plaintext: cfg.plaintext,
        }),
        TransportKind::Tcp => TransportExtras::Tcp(TcpExtras {
            data: cfg.data.clone(),
            encoding: cfg.encoding.clone(),
            read_timeout: cfg.read_timeout,
            idle_timeout: cfg.idle_timeout,
            close_after_send: cfg.close_after_send,
        }),
        TransportKind::Graphql => {
            let variables = match &cfg.variables {
                Some(vars) => match serde_json::to_string(vars) {
                    Ok(json) => Some(json),
                    Err(e) => {
                        errors.push(CompileError::new(
                            "variables",
                            format!("could not marshal graphql variables: {e}"),
                        ));
                        None
                    }
                },
                None => None,
            };
            TransportExtras::Graphql(GraphqlExtras {
                query: cfg.graphql.clone(),
                variables,
            })
        }
    };

    let request = Request {
        url,
        method: canonical_method(&cfg.method),
        headers,
        body,
        body_source,
        extras,
        insecure: cfg.insecure,
        jq_filter: non_empty(&cfg.jq_filter),
        timeout: non_empty(&cfg.timeout),
        output_file: non_empty(&cfg.output_file),
    };
    trace!(transport = %transport, url = %request.url, errors = errors.len(), "Compiled request");

    Compiled {
        request: Some(request),
        errors,
    }
}

/// Copy of `config` with every string-bearing field expanded.
///
/// `graphql` and `jq_filter` are left untouched: both languages use `$name`
/// for their own variables.
pub fn interpolate(config: &ConfigV1, resolver: &dyn Resolver) -> ConfigResult<ConfigV1> {
    let string = |field: &str, value: &str| {
        expand_string(value, resolver).map_err(|source| ConfigError::Interpolation {
            field: field.to_string(),
            source,
        })
    };
    let map = |field: &str, value: &BTreeMap<String, String>| {
        expand_map(value, resolver).map_err(|source| ConfigError::Interpolation {
            field: field.to_string(),
            source,
        })
    };
    let object = |field: &str, value: &Option<serde_json::Map<String, Value>>| {
        value
            .as_ref()
            .map(|v| expand_object(v, resolver))
            .transpose()
            .map_err(|source| ConfigError::Interpolation {
                field: field.to_string(),
                source,
            })
    };

    let mut out = config.clone();
    out.url = string("url", &config.url)?;
    out.path = string("path", &config.path)?;
    out.method = string("method", &config.method)?;
    out.content_type = string("content_type", &config.content_type)?;
    out.json = string("json", &config.json)?;
    out.data = string("data", &config.data)?;
    out.encoding = string("encoding", &config.encoding)?;
    out.service = string("service", &config.service)?;
    out.rpc = string("rpc", &config.rpc)?;
    out.proto = string("proto", &config.proto)?;
    out.proto_path = string("proto_path", &config.proto_path)?;
    out.delay = string("delay", &config.delay)?;
    out.timeout = string("timeout", &config.timeout)?;
    out.output_file = string("output_file", &config.output_file)?;
    out.headers = map("headers", &config.headers)?;
    out.query = map("query", &config.query)?;
    out.form = map("form", &config.form)?;
    out.body = object("body", &config.body)?;
    out.variables = object("variables", &config.variables)?;
    Ok(out)
}

/// `url` + `path`, then the query appended with `?` or `&`.
pub fn build_url(url: &str, path: &str, query: &BTreeMap<String, String>) -> String {
    let mut full = format!("{url}{path}");
    if !query.is_empty() {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query.iter())
            .finish();
        full.push(if full.contains('?') { '&' } else { '?' });
        full.push_str(&encoded);
    }
    full
}

fn encode_multipart(form: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (name, value) in form {
        out.push_str(&format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    out.push_str(&format!("--{MULTIPART_BOUNDARY}--\r\n"));
    out
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn set_default_header(headers: &mut BTreeMap<String, String>, name: &str, value: &str) {
    if header_value(headers, name).is_none_or(str::is_empty) {
        set_header(headers, name, value);
    }
}

fn set_header(headers: &mut BTreeMap<String, String>, name: &str, value: &str) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.to_string());
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::{EnvSource, MapResolver, ResolveError};
    use serde_json::json;
    use std::collections::HashMap;

    fn resolver(pairs: &[(&str, &str)]) -> MapResolver {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MapResolver::new(EnvSource::empty(), vars)
    }

    fn config(yaml: &str) -> ConfigV1 {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_body_is_interpolated_and_marshaled() {
        let cfg = ConfigV1 {
            url: "http://x".to_string(),
            body: json!({"k": "${ENV}"}).as_object().cloned(),
            ..Default::default()
        };
        let compiled = compile(&cfg, &resolver(&[("ENV", "v")]));
        assert!(!compiled.has_errors());
        let request = compiled.request.unwrap();
        let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"k": "v"}));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.body_source, Some(BodySource::Body));
    }

    #[test]
    fn test_compile_is_idempotent() {
        let cfg = config(
            "url: http://${HOST}\npath: /users\nquery:\n  b: '2'\n  a: x y\nheaders:\n  X-Id: $ID\nbody:\n  n: 1\n",
        );
        let r = resolver(&[("HOST", "api"), ("ID", "7")]);
        let first = compile(&cfg, &r).request.unwrap();
        let second = compile(&cfg, &r).request.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.url, "http://api/users?a=x+y&b=2");
    }

    #[test]
    fn test_method_defaults_and_uppercases() {
        let r = resolver(&[]);
        let get = compile(&config("url: http://x\n"), &r).request.unwrap();
        assert_eq!(get.method, "GET");
        let post = compile(&config("url: http://x\nmethod: post\n"), &r)
            .request
            .unwrap();
        assert_eq!(post.method, "POST");
    }

    #[test]
    fn test_query_appends_to_existing_query_string() {
        let mut query = BTreeMap::new();
        query.insert("page".to_string(), "2".to_string());
        assert_eq!(
            build_url("http://x/items?sort=asc", "", &query),
            "http://x/items?sort=asc&page=2"
        );
        assert_eq!(build_url("http://x", "/items", &query), "http://x/items?page=2");
    }

    #[test]
    fn test_body_and_json_conflict() {
        let cfg = config("url: http://x\njson: '{\"a\":1}'\nbody:\n  b: 2\n");
        let compiled = compile(&cfg, &resolver(&[]));
        assert_eq!(compiled.errors.len(), 1);
        assert_eq!(compiled.errors[0].field, "body");
        assert_eq!(compiled.errors[0].message, "`body` and `json` are mutually exclusive");
        let request = compiled.request.unwrap();
        assert_eq!(request.body_text().unwrap(), "{\"a\":1}");
        assert_eq!(request.body_source, Some(BodySource::Json));
    }

    #[test]
    fn test_form_conflict_message() {
        let cfg = config("url: http://x\nbody:\n  b: 2\nform:\n  a: '1'\n");
        let compiled = compile(&cfg, &resolver(&[]));
        assert_eq!(
            compiled.errors[0].message,
            "`body`, `json`, and `form` are mutually exclusive"
        );
    }

    #[test]
    fn test_form_urlencoded_and_multipart() {
        let r = resolver(&[]);
        let plain = compile(&config("url: http://x\nform:\n  name: a b\n  id: '1'\n"), &r)
            .request
            .unwrap();
        assert_eq!(plain.body_text().unwrap(), "id=1&name=a+b");
        assert_eq!(
            plain.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );

        let multipart = compile(
            &config("url: http://x\ncontent_type: multipart/form-data\nform:\n  id: '1'\n"),
            &r,
        )
        .request
        .unwrap();
        assert!(
            multipart
                .header("Content-Type")
                .unwrap()
                .starts_with("multipart/form-data; boundary=")
        );
        assert!(multipart.body_text().unwrap().contains("name=\"id\"\r\n\r\n1\r\n"));
    }

    #[test]
    fn test_content_type_overrides_header() {
        let cfg = config(
            "url: http://x\ncontent_type: application/vnd.api+json\nheaders:\n  content-type: text/plain\njson: '{}'\n",
        );
        let request = compile(&cfg, &resolver(&[])).request.unwrap();
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers["Content-Type"], "application/vnd.api+json");
    }

    #[test]
    fn test_explicit_header_beats_default_content_type() {
        let cfg = config("url: http://x\nheaders:\n  Content-Type: text/plain\njson: hi\n");
        let request = compile(&cfg, &resolver(&[])).request.unwrap();
        assert_eq!(request.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_grpc_and_tcp_extras() {
        let r = resolver(&[]);
        let grpc = compile(
            &config("url: grpc://localhost:50051\nservice: Greeter\nrpc: SayHello\nplaintext: true\n"),
            &r,
        )
        .request
        .unwrap();
        assert_eq!(grpc.transport(), TransportKind::Grpc);
        assert!(matches!(&grpc.extras, TransportExtras::Grpc(g) if g.service == "Greeter" && g.plaintext));

        let tcp = compile(
            &config("url: tcp://localhost:9000\ndata: ping\nencoding: text\nidle_timeout: 200\n"),
            &r,
        )
        .request
        .unwrap();
        assert!(matches!(&tcp.extras, TransportExtras::Tcp(t) if t.data == "ping" && t.idle_timeout == 200));
    }

    #[test]
    fn test_graphql_is_not_interpolated() {
        let cfg = config(
            "url: http://${HOST}/graphql\ngraphql: 'query($id: ID!) { user(id: $id) { name } }'\nvariables:\n  id: $USER_ID\njq_filter: .data\n",
        );
        let request = compile(&cfg, &resolver(&[("HOST", "api"), ("USER_ID", "42")]))
            .request
            .unwrap();
        assert_eq!(request.url, "http://api/graphql");
        match &request.extras {
            TransportExtras::Graphql(gql) => {
                assert!(gql.query.contains("$id"));
                assert_eq!(gql.variables.as_deref(), Some("{\"id\":\"42\"}"));
            }
            other => panic!("expected graphql extras, got {other:?}"),
        }
        assert_eq!(request.jq_filter.as_deref(), Some(".data"));
        assert_eq!(request.metadata()["transport"], "graphql");
    }

    #[test]
    fn test_interpolation_failure_names_field() {
        let failing = |name: &str| -> Result<Option<String>, ResolveError> {
            Err(ResolveError::Undefined(name.to_string()))
        };
        let cfg = config("url: http://x\nheaders:\n  Authorization: Bearer $TOKEN\n");
        let compiled = compile(&cfg, &failing);
        assert!(compiled.request.is_none());
        assert_eq!(compiled.errors[0].field, "headers");
        assert_eq!(
            compiled.errors[0].message,
            "headers: key 'Authorization': variable 'TOKEN' is not defined"
        );
    }

    #[test]
    fn test_input_is_not_mutated() {
        let cfg = config("url: http://$HOST\nbody:\n  nested:\n    v: $HOST\n");
        let before = cfg.clone();
        let _ = compile(&cfg, &resolver(&[("HOST", "h")]));
        assert_eq!(cfg, before);
    }
}
