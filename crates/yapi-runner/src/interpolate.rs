//! Substitution of chain references and project variables into a step.

use serde_json::{Map, Value};
use std::collections::HashMap;
use yapi_config::compiler::interpolate;
use yapi_config::variables::expand_string;
use yapi_config::{ConfigError, ConfigResult, ResolveError, Resolver};
use yapi_core::ConfigV1;

use crate::context::ChainContext;

/// Chain context first, then project variables, else empty.
struct StepResolver<'a> {
    ctx: &'a ChainContext,
    vars: &'a HashMap<String, String>,
}

impl Resolver for StepResolver<'_> {
    fn resolve(&self, name: &str) -> Result<Option<String>, ResolveError> {
        if let Some(value) = self.ctx.resolve(name)? {
            return Ok(Some(value));
        }
        Ok(Some(self.vars.get(name).cloned().unwrap_or_default()))
    }
}

/// Expand every string field of a merged step.
///
/// In `body` and `variables` a string that is exactly one chain reference
/// takes the referenced JSON value with its type, so `$login.user.id` yields
/// the number `42` rather than the string `"42"`.
pub fn interpolate_step(
    config: &ConfigV1,
    ctx: &ChainContext,
    vars: &HashMap<String, String>,
) -> ConfigResult<ConfigV1> {
    let resolver = StepResolver { ctx, vars };
    let body = typed_object("body", &config.body, ctx, &resolver)?;
    let variables = typed_object("variables", &config.variables, ctx, &resolver)?;

    let mut out = interpolate(
        &ConfigV1 {
            body: None,
            variables: None,
            ..config.clone()
        },
        &resolver,
    )?;
    out.body = body;
    out.variables = variables;
    Ok(out)
}

fn typed_object(
    field: &str,
    map: &Option<Map<String, Value>>,
    ctx: &ChainContext,
    resolver: &dyn Resolver,
) -> ConfigResult<Option<Map<String, Value>>> {
    let Some(map) = map else {
        return Ok(None);
    };
    map.iter()
        .map(|(k, v)| {
            typed_value(v, ctx, resolver)
                .map(|v| (k.clone(), v))
                .map_err(|e| ResolveError::in_key(k, e))
        })
        .collect::<Result<Map<_, _>, _>>()
        .map(Some)
        .map_err(|source| ConfigError::Interpolation {
            field: field.to_string(),
            source,
        })
}

fn typed_value(
    value: &Value,
    ctx: &ChainContext,
    resolver: &dyn Resolver,
) -> Result<Value, ResolveError> {
    match value {
        Value::String(s) => match ctx.resolve_variable_raw(s) {
            Some(raw) => Ok(raw),
            None => expand_string(s, resolver).map(Value::String),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| typed_value(item, ctx, resolver))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                typed_value(v, ctx, resolver)
                    .map(|v| (k.clone(), v))
                    .map_err(|e| ResolveError::in_key(k, e))
            })
            .collect::<Result<Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}
