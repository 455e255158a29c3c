//! Diagnostic and analysis result types shared by the CLI and the editor.

use serde::Serialize;
use std::fmt;
use yapi_core::{ConfigV1, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding. Positions are 0-based; `None` means unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// The document field the finding is about (`url`, `login.headers`, ...).
    pub field: String,
    pub message: String,
    pub line: Option<usize>,
    pub col: Option<usize>,
}

impl Diagnostic {
    pub fn new(severity: Severity, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            field: field.into(),
            message: message.into(),
            line: None,
            col: None,
        }
    }

    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, field, message)
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, field, message)
    }

    pub fn info(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, field, message)
    }

    /// Position at the start of `line`.
    pub fn at_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self.col = line.map(|_| 0);
        self
    }

    pub fn at(mut self, line: usize, col: usize) -> Self {
        self.line = Some(line);
        self.col = Some(col);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A compiled chain step.
#[derive(Debug, Clone)]
pub struct StepAnalysis {
    pub name: String,
    /// The step merged with the base request.
    pub config: ConfigV1,
    /// Absent when the step could not be compiled.
    pub request: Option<Request>,
}

/// Everything known about one document.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// The compiled request of a single-request document.
    pub request: Option<Request>,
    /// The decoded document, after environment defaults were applied.
    pub config: Option<ConfigV1>,
    pub chain: Vec<StepAnalysis>,
    pub diagnostics: Vec<Diagnostic>,
    /// Document-level warnings such as a missing version tag.
    pub warnings: Vec<String>,
}

impl Analysis {
    pub(crate) fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
            ..Default::default()
        }
    }

    pub fn is_chain(&self) -> bool {
        !self.chain.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn to_json(&self) -> JsonOutput {
        JsonOutput {
            valid: !self.has_errors(),
            diagnostics: self.diagnostics.iter().map(JsonDiagnostic::from).collect(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Machine-readable validation output.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    pub valid: bool,
    pub diagnostics: Vec<JsonDiagnostic>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonDiagnostic {
    pub severity: Severity,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub field: String,
    pub message: String,
    /// -1 when unknown.
    pub line: i64,
    pub col: i64,
}

impl From<&Diagnostic> for JsonDiagnostic {
    fn from(d: &Diagnostic) -> Self {
        let pos = |p: Option<usize>| p.map_or(-1, |p| p as i64);
        Self {
            severity: d.severity,
            field: d.field.clone(),
            message: d.message.clone(),
            line: pos(d.line),
            col: pos(d.col),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_json_output() {
        let analysis = Analysis {
            diagnostics: vec![
                Diagnostic::error("url", "missing required field `url`"),
                Diagnostic::warning("", "unknown key 'x' will be ignored").at(3, 0),
            ],
            warnings: vec!["Missing 'yapi: v1' version tag. Defaulting to v1.".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_value(analysis.to_json()).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["diagnostics"][0]["severity"], "error");
        assert_eq!(json["diagnostics"][0]["line"], -1);
        assert_eq!(json["diagnostics"][1]["line"], 3);
        assert!(json["diagnostics"][1].get("field").is_none());
        assert_eq!(json["warnings"].as_array().unwrap().len(), 1);
    }
}
