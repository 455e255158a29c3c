//! Variable tokenization and interpolation.
//!
//! Supports two token forms:
//! - `${name}` - anything up to the closing brace
//! - `$name` - letters, digits, `_`, `-` and `.`
//!
//! Names containing a dot (`${login.token}`, `$login.headers.Location`) are
//! chain references; dot-free names are environment variables. What a name
//! resolves to is decided by a [`Resolver`], never by the engine itself.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

// Group 1: contents of ${...}, group 2: bare $token
static EXPANSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}|\$([a-zA-Z0-9_\-\.]+)").unwrap());

// Same groups, identifiers only
static ENV_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

/// One `$name` / `${name}` occurrence in a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRef<'a> {
    /// The name without `$`, `{` or `}`.
    pub name: &'a str,
    /// The full matched token.
    pub token: &'a str,
    /// Byte offset of the token start.
    pub start: usize,
    pub end: usize,
}

impl<'a> VarRef<'a> {
    pub fn is_chain_ref(&self) -> bool {
        self.name.contains('.')
    }

    /// The referenced step of a chain reference.
    pub fn step(&self) -> Option<&'a str> {
        self.name.split_once('.').map(|(step, _)| step)
    }
}

/// All variable tokens in `input`, in order.
pub fn find_refs(input: &str) -> Vec<VarRef<'_>> {
    EXPANSION.captures_iter(input).filter_map(to_ref).collect()
}

/// The reference `input` consists of, if its trimmed text is exactly one token.
pub fn single_ref(input: &str) -> Option<VarRef<'_>> {
    let trimmed = input.trim();
    let caps = EXPANSION.captures(trimmed)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != trimmed.len() {
        return None;
    }
    to_ref(caps)
}

fn to_ref(caps: regex::Captures<'_>) -> Option<VarRef<'_>> {
    let whole = caps.get(0)?;
    let name = caps.get(1).or_else(|| caps.get(2))?;
    Some(VarRef {
        name: name.as_str(),
        token: whole.as_str(),
        start: whole.start(),
        end: whole.end(),
    })
}

/// Dot-free environment variable tokens in `line`. A bare `$name` directly
/// followed by `.` is a chain reference and is skipped.
pub fn find_env_refs(line: &str) -> Vec<VarRef<'_>> {
    ENV_ONLY
        .captures_iter(line)
        .filter_map(to_ref)
        .filter(|r| !line[r.end..].starts_with('.'))
        .collect()
}

/// Whether `input` contains a chain reference.
pub fn has_chain_refs(input: &str) -> bool {
    find_refs(input).iter().any(VarRef::is_chain_ref)
}

/// Why a variable could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("step '{0}' not found (or hasn't run yet)")]
    StepNotFound(String),

    #[error("step '{step}' did not return JSON, cannot access property '{reference}'")]
    NotJson { step: String, reference: String },

    #[error("header '{header}' not found in step '{step}'")]
    HeaderNotFound { header: String, step: String },

    #[error("header reference requires key (e.g. headers.Content-Type)")]
    HeaderKeyMissing,

    #[error("key '{key}' not found at path '{path}'")]
    KeyNotFound { key: String, path: String },

    #[error("path segment '{0}' is not an object")]
    NotAnObject(String),

    #[error("invalid reference format '{0}'")]
    InvalidReference(String),

    #[error("variable '{0}' is not defined")]
    Undefined(String),

    #[error("key '{key}': {source}")]
    InKey {
        key: String,
        #[source]
        source: Box<ResolveError>,
    },
}

impl ResolveError {
    pub fn in_key(key: impl Into<String>, source: ResolveError) -> Self {
        ResolveError::InKey {
            key: key.into(),
            source: Box::new(source),
        }
    }
}

/// Maps a variable name to its replacement.
///
/// `Ok(None)` leaves the token in place; an error aborts the whole expansion.
pub trait Resolver {
    fn resolve(&self, name: &str) -> Result<Option<String>, ResolveError>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Result<Option<String>, ResolveError>,
{
    fn resolve(&self, name: &str) -> Result<Option<String>, ResolveError> {
        self(name)
    }
}

/// Replace every token in `input`. The first resolver failure is returned.
pub fn expand_string(input: &str, resolver: &dyn Resolver) -> Result<String, ResolveError> {
    let refs = find_refs(input);
    if refs.is_empty() {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for r in refs {
        out.push_str(&input[last..r.start]);
        match resolver.resolve(r.name)? {
            Some(value) => out.push_str(&value),
            None => out.push_str(r.token),
        }
        last = r.end;
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Expand every string leaf of `value` into a new tree.
pub fn expand_value(value: &Value, resolver: &dyn Resolver) -> Result<Value, ResolveError> {
    match value {
        Value::String(s) => expand_string(s, resolver).map(Value::String),
        Value::Array(items) => items
            .iter()
            .map(|item| expand_value(item, resolver))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => expand_object(map, resolver).map(Value::Object),
        other => Ok(other.clone()),
    }
}

pub fn expand_object(
    map: &serde_json::Map<String, Value>,
    resolver: &dyn Resolver,
) -> Result<serde_json::Map<String, Value>, ResolveError> {
    map.iter()
        .map(|(k, v)| {
            expand_value(v, resolver)
                .map(|v| (k.clone(), v))
                .map_err(|e| ResolveError::in_key(k, e))
        })
        .collect()
}

pub fn expand_map(
    map: &BTreeMap<String, String>,
    resolver: &dyn Resolver,
) -> Result<BTreeMap<String, String>, ResolveError> {
    map.iter()
        .map(|(k, v)| {
            expand_string(v, resolver)
                .map(|v| (k.clone(), v))
                .map_err(|e| ResolveError::in_key(k, e))
        })
        .collect()
}

/// Read-only view of environment variables.
///
/// Defaults to the process environment; tests and editors substitute a map.
#[derive(Clone)]
pub struct EnvSource(Arc<dyn Fn(&str) -> Option<String> + Send + Sync>);

impl EnvSource {
    pub fn process() -> Self {
        Self(Arc::new(|name: &str| std::env::var(name).ok()))
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self(Arc::new(move |name: &str| vars.get(name).cloned()))
    }

    pub fn empty() -> Self {
        Self(Arc::new(|_: &str| -> Option<String> { None }))
    }

    pub fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvSource")
    }
}

/// Environment lookup; undefined names become empty strings.
#[derive(Debug, Clone, Default)]
pub struct EnvResolver {
    env: EnvSource,
}

impl EnvResolver {
    pub fn new(env: EnvSource) -> Self {
        Self { env }
    }
}

impl Resolver for EnvResolver {
    fn resolve(&self, name: &str) -> Result<Option<String>, ResolveError> {
        Ok(Some(self.env.get(name).unwrap_or_default()))
    }
}

/// Plausible stand-ins so a document can be compiled without real values.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderResolver;

impl Resolver for PlaceholderResolver {
    fn resolve(&self, name: &str) -> Result<Option<String>, ResolveError> {
        let lower = name.to_ascii_lowercase();
        let value = if lower.contains("port") {
            "8080"
        } else if lower.contains("host") {
            "localhost"
        } else if lower.contains("url") {
            "http://localhost:8080"
        } else {
            "PLACEHOLDER"
        };
        Ok(Some(value.to_string()))
    }
}

/// Environment first, then a fixed variable map, else empty.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    env: EnvSource,
    vars: HashMap<String, String>,
}

impl MapResolver {
    pub fn new(env: EnvSource, vars: HashMap<String, String>) -> Self {
        Self { env, vars }
    }
}

impl Resolver for MapResolver {
    fn resolve(&self, name: &str) -> Result<Option<String>, ResolveError> {
        if let Some(value) = self.env.get(name) {
            return Ok(Some(value));
        }
        Ok(Some(self.vars.get(name).cloned().unwrap_or_default()))
    }
}
