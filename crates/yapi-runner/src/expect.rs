//! Checking a response against a step's `expect` block.

use serde::Serialize;
use std::collections::BTreeMap;
use yapi_core::Expectation;

use crate::filter::ResponseFilter;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionResult {
    pub expression: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of [`check_expectations`]. `error` holds the first failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpectationResult {
    pub status_checked: bool,
    pub status_passed: bool,
    pub assertions_total: usize,
    pub assertions_passed: usize,
    pub assertions: Vec<AssertionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExpectationResult {
    pub fn all_passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Check the status first, then every assertion in order.
///
/// Body assertions run against the body, header assertions against a JSON
/// object of the response headers. Evaluation stops at the first failure.
pub fn check_expectations(
    expect: &Expectation,
    status: u16,
    body: &str,
    headers: &BTreeMap<String, String>,
    filter: &dyn ResponseFilter,
) -> ExpectationResult {
    let mut result = ExpectationResult {
        assertions_total: expect.assert.len(),
        ..Default::default()
    };

    if let Some(expected) = &expect.status {
        result.status_checked = true;
        result.status_passed = expected.matches(status);
        if !result.status_passed {
            result.error = Some(format!("expected status {expected}, got {status}"));
            return result;
        }
    }

    let headers_json = serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string());
    let checks = expect
        .assert
        .body
        .iter()
        .map(|expr| (expr, body))
        .chain(expect.assert.headers.iter().map(|expr| (expr, headers_json.as_str())));

    for (expr, input) in checks {
        match filter.eval_bool(input, expr) {
            Ok(true) => {
                result.assertions_passed += 1;
                result.assertions.push(AssertionResult {
                    expression: expr.clone(),
                    passed: true,
                    error: None,
                });
            }
            Ok(false) => {
                result.assertions.push(AssertionResult {
                    expression: expr.clone(),
                    passed: false,
                    error: None,
                });
                result.error = Some(format!("assertion failed: {expr}"));
                return result;
            }
            Err(e) => {
                result.assertions.push(AssertionResult {
                    expression: expr.clone(),
                    passed: false,
                    error: Some(e.to_string()),
                });
                result.error = Some(format!("assertion failed: {e}"));
                return result;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::JqFilter;
    use yapi_core::{AssertionSet, StatusExpectation};

    fn expect(status: Option<StatusExpectation>, body: &[&str], headers: &[&str]) -> Expectation {
        Expectation {
            status,
            assert: AssertionSet {
                body: body.iter().map(|s| s.to_string()).collect(),
                headers: headers.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    fn headers() -> BTreeMap<String, String> {
        BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())])
    }

    #[test]
    fn test_all_pass() {
        let e = expect(
            Some(StatusExpectation::AnyOf(vec![200, 201])),
            &[".id == 3"],
            &[r#".["Content-Type"] == "application/json""#],
        );
        let r = check_expectations(&e, 201, r#"{"id":3}"#, &headers(), &JqFilter);
        assert!(r.all_passed());
        assert!(r.status_checked && r.status_passed);
        assert_eq!((r.assertions_passed, r.assertions_total), (2, 2));
    }

    #[test]
    fn test_status_mismatch_skips_assertions() {
        let e = expect(Some(StatusExpectation::Code(200)), &[".id == 3"], &[]);
        let r = check_expectations(&e, 404, "{}", &headers(), &JqFilter);
        assert_eq!(r.error.as_deref(), Some("expected status 200, got 404"));
        assert!(r.assertions.is_empty());

        let e = expect(Some(StatusExpectation::AnyOf(vec![200, 204])), &[], &[]);
        let r = check_expectations(&e, 500, "", &headers(), &JqFilter);
        assert_eq!(r.error.as_deref(), Some("expected status [200, 204], got 500"));
    }

    #[test]
    fn test_first_failing_assertion_stops() {
        let e = expect(None, &[".ok", ".id == 4", ".never"], &[]);
        let r = check_expectations(&e, 200, r#"{"ok":true,"id":3}"#, &headers(), &JqFilter);
        assert_eq!(r.error.as_deref(), Some("assertion failed: .id == 4"));
        assert_eq!(r.assertions.len(), 2);
        assert_eq!(r.assertions_passed, 1);
        assert!(!r.status_checked);
    }

    #[test]
    fn test_evaluation_error() {
        let e = expect(None, &[".id"], &[]);
        let r = check_expectations(&e, 200, r#"{"id":3}"#, &headers(), &JqFilter);
        assert_eq!(
            r.error.as_deref(),
            Some("assertion failed: assertion '.id' did not return boolean")
        );
    }

    #[test]
    fn test_empty_expectation_passes() {
        let r = check_expectations(&Expectation::default(), 500, "", &headers(), &JqFilter);
        assert!(r.all_passed());
        assert_eq!(r.assertions_total, 0);
    }
}
