//! The v1 request document.
//!
//! A document is either a single request or a `chain` of named steps. Every
//! step carries the full set of request fields and inherits whatever it leaves
//! unset from the top-level (base) request.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Every top-level key understood by a v1 document.
pub const KNOWN_V1_KEYS: &[&str] = &[
    "yapi",
    "url",
    "path",
    "method",
    "content_type",
    "headers",
    "body",
    "json",
    "form",
    "query",
    "graphql",
    "variables",
    "service",
    "rpc",
    "proto",
    "proto_path",
    "data",
    "encoding",
    "jq_filter",
    "insecure",
    "plaintext",
    "read_timeout",
    "idle_timeout",
    "close_after_send",
    "chain",
    "expect",
    "delay",
    "output_file",
    "timeout",
];

/// Returns true if `key` is a recognised top-level v1 key.
pub fn is_known_key(key: &str) -> bool {
    KNOWN_V1_KEYS.contains(&key)
}

/// One request as decoded from a v1 document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigV1 {
    /// Version tag (`v1`).
    pub yapi: String,
    pub url: String,
    pub path: String,
    pub method: String,
    pub content_type: String,
    #[serde(deserialize_with = "lenient_string_map")]
    pub headers: BTreeMap<String, String>,
    /// Structured JSON body.
    pub body: Option<Map<String, Value>>,
    /// Raw JSON body, sent verbatim.
    pub json: String,
    #[serde(deserialize_with = "lenient_string_map")]
    pub form: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub query: BTreeMap<String, String>,
    /// GraphQL query or mutation.
    pub graphql: String,
    /// GraphQL variables.
    pub variables: Option<Map<String, Value>>,

    // gRPC
    pub service: String,
    pub rpc: String,
    pub proto: String,
    pub proto_path: String,
    pub plaintext: bool,

    // TCP
    pub data: String,
    /// text, hex or base64.
    pub encoding: String,
    /// Seconds.
    pub read_timeout: u64,
    /// Milliseconds.
    pub idle_timeout: u64,
    pub close_after_send: bool,

    pub jq_filter: String,
    pub insecure: bool,

    /// Wait before executing (e.g. `500ms`, `5s`).
    pub delay: String,
    /// Request timeout (e.g. `4s`).
    pub timeout: String,
    pub output_file: String,

    pub expect: Expectation,
    pub chain: Vec<ChainStep>,
}

/// A named step in a chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainStep {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub config: ConfigV1,
}

impl ChainStep {
    pub fn new(name: impl Into<String>, config: ConfigV1) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Assertions checked after a request completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expectation {
    pub status: Option<StatusExpectation>,
    pub assert: AssertionSet,
}

impl Expectation {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.assert.is_empty()
    }
}

/// Expected status: a single code or any of a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusExpectation {
    Code(u16),
    AnyOf(Vec<u16>),
}

impl StatusExpectation {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusExpectation::Code(code) => *code == status,
            StatusExpectation::AnyOf(codes) => codes.contains(&status),
        }
    }
}

impl fmt::Display for StatusExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusExpectation::Code(code) => write!(f, "{code}"),
            StatusExpectation::AnyOf(codes) => {
                let codes: Vec<String> = codes.iter().map(u16::to_string).collect();
                write!(f, "[{}]", codes.join(", "))
            }
        }
    }
}

/// Assertions grouped by what they inspect.
///
/// Accepts either a flat list (body assertions) or a map with `body` and
/// `headers` lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAssertions")]
pub struct AssertionSet {
    pub body: Vec<String>,
    pub headers: Vec<String>,
}

impl AssertionSet {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.headers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.body.len() + self.headers.len()
    }

    /// All assertion expressions, body first.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.body.iter().chain(self.headers.iter())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAssertions {
    Flat(Vec<String>),
    Grouped {
        #[serde(default)]
        body: Vec<String>,
        #[serde(default)]
        headers: Vec<String>,
    },
}

impl From<RawAssertions> for AssertionSet {
    fn from(raw: RawAssertions) -> Self {
        match raw {
            RawAssertions::Flat(body) => AssertionSet {
                body,
                headers: Vec::new(),
            },
            RawAssertions::Grouped { body, headers } => AssertionSet { body, headers },
        }
    }
}

impl ConfigV1 {
    pub fn is_chain(&self) -> bool {
        !self.chain.is_empty()
    }

    /// Build the full config for a chain step: the step's own fields win,
    /// anything it leaves unset is inherited from `self`.
    ///
    /// The result shares no containers with `self` or `step`.
    pub fn merge(&self, step: &ChainStep) -> ConfigV1 {
        let mut merged = overlay(self, &step.config);
        merged.expect = step.config.expect.clone();
        merged.chain = Vec::new();
        merged
    }

    /// Apply environment defaults. File values take precedence over `defaults`.
    pub fn merge_with_defaults(&self, defaults: &ConfigV1) -> ConfigV1 {
        let mut merged = overlay(defaults, self);
        merged.expect = self.expect.clone();
        merged.chain = self.chain.clone();
        merged
    }
}

/// Fields set in `over` replace those in `base`. String maps are merged key by
/// key; structured maps are replaced whole.
fn overlay(base: &ConfigV1, over: &ConfigV1) -> ConfigV1 {
    ConfigV1 {
        yapi: coalesce(&over.yapi, &base.yapi),
        url: coalesce(&over.url, &base.url),
        path: coalesce(&over.path, &base.path),
        method: coalesce(&over.method, &base.method),
        content_type: coalesce(&over.content_type, &base.content_type),
        headers: merge_maps(&base.headers, &over.headers),
        body: over.body.clone().or_else(|| base.body.clone()),
        json: coalesce(&over.json, &base.json),
        form: merge_maps(&base.form, &over.form),
        query: merge_maps(&base.query, &over.query),
        graphql: coalesce(&over.graphql, &base.graphql),
        variables: over.variables.clone().or_else(|| base.variables.clone()),
        service: coalesce(&over.service, &base.service),
        rpc: coalesce(&over.rpc, &base.rpc),
        proto: coalesce(&over.proto, &base.proto),
        proto_path: coalesce(&over.proto_path, &base.proto_path),
        plaintext: over.plaintext || base.plaintext,
        data: coalesce(&over.data, &base.data),
        encoding: coalesce(&over.encoding, &base.encoding),
        read_timeout: if over.read_timeout != 0 {
            over.read_timeout
        } else {
            base.read_timeout
        },
        idle_timeout: if over.idle_timeout != 0 {
            over.idle_timeout
        } else {
            base.idle_timeout
        },
        close_after_send: over.close_after_send || base.close_after_send,
        jq_filter: coalesce(&over.jq_filter, &base.jq_filter),
        insecure: over.insecure || base.insecure,
        delay: coalesce(&over.delay, &base.delay),
        timeout: coalesce(&over.timeout, &base.timeout),
        output_file: coalesce(&over.output_file, &base.output_file),
        expect: Expectation::default(),
        chain: Vec::new(),
    }
}

fn coalesce(primary: &str, fallback: &str) -> String {
    if primary.is_empty() {
        fallback.to_string()
    } else {
        primary.to_string()
    }
}

fn merge_maps(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// YAML happily produces numbers and booleans for header or query values
/// (`X-Retries: 3`); accept any scalar and keep its textual form.
pub fn lenient_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    let raw: Option<BTreeMap<String, Option<Scalar>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Some(Scalar::Str(s)) => s,
                Some(Scalar::Int(i)) => i.to_string(),
                Some(Scalar::Float(f)) => f.to_string(),
                Some(Scalar::Bool(b)) => b.to_string(),
                None => String::new(),
            };
            (k, v)
        })
        .collect())
}
