//! Results of the steps run so far, and resolution of references into them.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use yapi_config::variables::{expand_string, single_ref};
use yapi_config::{EnvSource, ResolveError, Resolver};
use yapi_core::Response;

/// What later steps can see of a completed step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    pub body_raw: String,
    /// The body as JSON, when it parses.
    pub body_json: Option<Value>,
    pub headers: BTreeMap<String, String>,
    pub status_code: u16,
}

impl StepResult {
    pub fn from_response(response: &Response) -> Self {
        let body_raw = response.body_text();
        let body_json = serde_json::from_str(&body_raw).ok();
        Self {
            body_raw,
            body_json,
            headers: response.headers.clone(),
            status_code: response.status_code,
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

/// Step results in execution order.
///
/// A dotted name resolves against the results: `step.body` and `step.status`
/// are the raw body and status code, `step.headers.Name` a response header,
/// anything else a path into the JSON body. The environment is consulted first.
#[derive(Debug, Clone, Default)]
pub struct ChainContext {
    results: IndexMap<String, StepResult>,
    env: EnvSource,
}

impl ChainContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(env: EnvSource) -> Self {
        Self {
            results: IndexMap::new(),
            env,
        }
    }

    /// Store the outcome of `name`, replacing an earlier run of the same step.
    pub fn add_result(&mut self, name: &str, response: &Response) {
        self.insert(name, StepResult::from_response(response));
    }

    pub fn insert(&mut self, name: &str, result: StepResult) {
        self.results.insert(name.to_string(), result);
    }

    pub fn result(&self, name: &str) -> Option<&StepResult> {
        self.results.get(name)
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Replace every `$name` / `${name}` in `input`. Unknown dot-free names
    /// are left as written; an unresolvable chain reference is an error.
    pub fn expand_variables(&self, input: &str) -> Result<String, ResolveError> {
        expand_string(input, self)
    }

    /// The value `input` refers to with its JSON type intact, when the whole
    /// trimmed input is a single chain reference that resolves.
    pub fn resolve_variable_raw(&self, input: &str) -> Option<Value> {
        let r = single_ref(input)?;
        if !r.is_chain_ref() || self.env.contains(r.name) {
            return None;
        }
        let (step, rest) = r.name.split_once('.')?;
        let result = self.results.get(step)?;
        let path: Vec<&str> = rest.split('.').collect();

        match path.as_slice() {
            ["status"] => return Some(Value::from(result.status_code)),
            ["body"] => return Some(Value::String(result.body_raw.clone())),
            ["headers", ..] => return None,
            _ => {}
        }
        lookup(result.body_json.as_ref()?, &path).ok().cloned()
    }

    fn resolve_chain_var(&self, key: &str) -> Result<String, ResolveError> {
        let (step, rest) = key
            .split_once('.')
            .ok_or_else(|| ResolveError::InvalidReference(key.to_string()))?;
        let result = self
            .results
            .get(step)
            .ok_or_else(|| ResolveError::StepNotFound(step.to_string()))?;
        let path: Vec<&str> = rest.split('.').collect();

        match path.as_slice() {
            ["body"] => return Ok(result.body_raw.clone()),
            ["status"] => return Ok(result.status_code.to_string()),
            ["headers"] => return Err(ResolveError::HeaderKeyMissing),
            ["headers", header, ..] => {
                if let Some(value) = result.header(header) {
                    return Ok(value.to_string());
                }
                // Some APIs echo request headers back in the body.
                if let Some(json) = &result.body_json {
                    if let Ok(value) = lookup(json, &path) {
                        return Ok(stringify(value));
                    }
                }
                return Err(ResolveError::HeaderNotFound {
                    header: header.to_string(),
                    step: step.to_string(),
                });
            }
            _ => {}
        }

        let json = result
            .body_json
            .as_ref()
            .ok_or_else(|| ResolveError::NotJson {
                step: step.to_string(),
                reference: key.to_string(),
            })?;
        lookup(json, &path).map(stringify)
    }
}

impl Resolver for ChainContext {
    fn resolve(&self, name: &str) -> Result<Option<String>, ResolveError> {
        if let Some(value) = self.env.get(name) {
            return Ok(Some(value));
        }
        if name.contains('.') {
            return self.resolve_chain_var(name).map(Some);
        }
        Ok(None)
    }
}

/// Walk `path` into `value`. Array elements are addressed by index.
fn lookup<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, ResolveError> {
    let mut current = value;
    for (i, key) in path.iter().enumerate() {
        current = match current {
            Value::Object(map) => map.get(*key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => return Err(ResolveError::NotAnObject(path[..i].join("."))),
        }
        .ok_or_else(|| ResolveError::KeyNotFound {
            key: key.to_string(),
            path: path[..=i].join("."),
        })?;
    }
    Ok(current)
}

/// Text form of a JSON value: integral numbers without a decimal point,
/// composites as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            // `{:.0}` never switches to exponent form.
            Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 => {
                format!("{:.0}", f + 0.0)
            }
            _ => n.to_string(),
        },
        composite => composite.to_string(),
    }
}
