//! Response filtering and boolean assertions.
//!
//! [`JqFilter`] runs full jq programs through [`yapi_config::jq`], the same
//! parser the analyzer validates `jq_filter` and `expect.assert` with.

use serde_json::Value;
use thiserror::Error;
use yapi_config::jq::{self, JqError};

use crate::context::stringify;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("failed to parse input as JSON: {0}")]
    InvalidInput(String),

    #[error("invalid filter '{expr}': {message}")]
    Parse { expr: String, message: String },

    #[error("jq filter error: {0}")]
    Eval(String),

    #[error("empty assertion expression")]
    EmptyAssertion,

    #[error("assertion '{0}' produced no result")]
    NoResult(String),

    #[error("assertion '{0}' did not return boolean")]
    NotBoolean(String),
}

/// Applies filter expressions to response bodies.
pub trait ResponseFilter: Send + Sync {
    /// The filtered body as text. An empty expression returns `body` unchanged.
    fn apply(&self, body: &str, expr: &str) -> Result<String, FilterError>;

    /// Evaluate `expr` against `body`; its first output must be a boolean.
    fn eval_bool(&self, body: &str, expr: &str) -> Result<bool, FilterError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JqFilter;

impl ResponseFilter for JqFilter {
    fn apply(&self, body: &str, expr: &str) -> Result<String, FilterError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(body.to_string());
        }
        let outputs = evaluate(body, expr)?;
        Ok(outputs
            .iter()
            .map(format_output)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn eval_bool(&self, body: &str, expr: &str) -> Result<bool, FilterError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(FilterError::EmptyAssertion);
        }
        match evaluate(body, expr)?.into_iter().next() {
            Some(Value::Bool(b)) => Ok(b),
            Some(_) => Err(FilterError::NotBoolean(expr.to_string())),
            None => Err(FilterError::NoResult(expr.to_string())),
        }
    }
}

fn evaluate(body: &str, expr: &str) -> Result<Vec<Value>, FilterError> {
    // Reject a bad program before looking at the body.
    jq::check(expr).map_err(|e| parse_error(expr, e))?;
    let input: Value =
        serde_json::from_str(body).map_err(|e| FilterError::InvalidInput(e.to_string()))?;
    jq::run(expr, input).map_err(|e| match e {
        JqError::Runtime(message) => FilterError::Eval(message),
        syntax => parse_error(expr, syntax),
    })
}

fn parse_error(expr: &str, err: JqError) -> FilterError {
    FilterError::Parse {
        expr: expr.to_string(),
        message: err.to_string(),
    }
}

/// Strings unquoted, scalars plainly, composites as indented JSON.
pub fn format_output(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        scalar => stringify(scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "data": {"items": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}], "total": 2},
        "status": "ok",
        "ratio": 2.0,
        "active": true,
        "odd key": "x",
        "missing": null
    }"#;

    fn apply(expr: &str) -> Result<String, FilterError> {
        JqFilter.apply(BODY, expr)
    }

    fn check(expr: &str) -> Result<bool, FilterError> {
        JqFilter.eval_bool(BODY, expr)
    }

    #[test]
    fn test_empty_filter_is_identity() {
        assert_eq!(JqFilter.apply("not json", "  ").unwrap(), "not json");
    }

    #[test]
    fn test_paths() {
        assert_eq!(apply(".status").unwrap(), "ok");
        assert_eq!(apply(".data.total").unwrap(), "2");
        assert_eq!(apply(".ratio").unwrap(), "2");
        assert_eq!(apply(".data.items[1].name").unwrap(), "b");
        assert_eq!(apply(".data.items[-1].id").unwrap(), "2");
        assert_eq!(apply(".data.items[5]").unwrap(), "null");
        assert_eq!(apply(r#".["odd key"]"#).unwrap(), "x");
        assert_eq!(apply(".nope.deeper").unwrap(), "null");
        assert_eq!(
            apply(".data.items[0]").unwrap(),
            "{\n  \"id\": 1,\n  \"name\": \"a\"\n}"
        );
    }

    #[test]
    fn test_full_jq_programs() {
        assert_eq!(apply(".data.items | map(.id)").unwrap(), "[\n  1,\n  2\n]");
        assert_eq!(apply(".data.items[] | select(.id > 1) | .name").unwrap(), "b");
        assert_eq!(apply(".data.items[] | .name").unwrap(), "a\nb");
        assert_eq!(
            apply("{total: .data.total}").unwrap(),
            "{\n  \"total\": 2\n}"
        );
        assert_eq!(apply(".data.total + 1").unwrap(), "3");
        assert_eq!(apply(".data | keys").unwrap(), "[\n  \"items\",\n  \"total\"\n]");
        assert_eq!(apply(".missing | length").unwrap(), "0");
    }

    #[test]
    fn test_assertions() {
        assert!(check(".status == \"ok\"").unwrap());
        assert!(check(".data.items | length > 1").unwrap());
        assert!(!check(".data.total < 2").unwrap());
        assert!(check(".ratio == 2").unwrap());
        assert!(check(".active").unwrap());
        assert!(check(".missing == null").unwrap());
        assert!(check(".status == \"ok\" and .active").unwrap());
        assert!(check(".data.total == 5 or .active").unwrap());
        assert!(check("[.data.items[] | select(.id > 1)] | length == 1").unwrap());
        assert!(check(".data.items | map(.id) | add == 3").unwrap());
        assert!(!check(".status == \"ok\" | not").unwrap());
    }

    #[test]
    fn test_assertion_errors() {
        assert_eq!(check(""), Err(FilterError::EmptyAssertion));
        assert_eq!(check(".status"), Err(FilterError::NotBoolean(".status".into())));
        assert_eq!(check("empty"), Err(FilterError::NoResult("empty".into())));
        assert!(matches!(check(".status =="), Err(FilterError::Parse { .. })));
        assert!(matches!(check(".status.x == 1"), Err(FilterError::Eval(_))));
        assert!(matches!(
            JqFilter.eval_bool("<html>", ".a == 1"),
            Err(FilterError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_filters_the_analyzer_accepts_also_run() {
        use yapi_analyzer::Analyzer;

        let body = r#"{"ok": true, "status": 200, "items": [{"id": 1}, {"id": 2}]}"#;
        for expr in [
            ".items | map(.id)",
            ".items[] | select(.id > 1)",
            "{id: .items[0].id}",
            ".status + 1",
            ".status == 200 and .ok",
        ] {
            let doc = format!("yapi: v1\nurl: http://x\njq_filter: '{expr}'\n");
            let analysis = Analyzer::new().analyze(&doc);
            assert!(!analysis.has_errors(), "{expr}: {:?}", analysis.diagnostics);
            assert!(JqFilter.apply(body, expr).is_ok(), "{expr} should run");
        }
    }
}
