//! Analysis results as LSP diagnostics.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};
use yapi_analyzer::position::find_top_level_key_line;
use yapi_analyzer::{Analysis, Severity};
use yapi_config::ProjectConfig;

pub const SOURCE: &str = "yapi";

/// Width of a diagnostic's range; end columns are not tracked.
const RANGE_WIDTH: usize = 100;

/// Convert an analysis to editor diagnostics.
///
/// Findings without a position land on the first line; document warnings
/// always do.
pub fn to_lsp_diagnostics(analysis: &Analysis) -> Vec<Diagnostic> {
    let mut out: Vec<Diagnostic> = analysis
        .warnings
        .iter()
        .map(|w| diagnostic(0, 0, DiagnosticSeverity::WARNING, w.clone()))
        .collect();

    for d in &analysis.diagnostics {
        out.push(diagnostic(
            d.line.unwrap_or(0),
            d.col.unwrap_or(0),
            severity(d.severity),
            d.message.clone(),
        ));
    }
    out
}

/// Checks for `yapi.config.yml`, which is not a request document.
pub fn validate_project_config(text: &str) -> Vec<Diagnostic> {
    let raw: serde_yaml::Value = match serde_yaml::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            let line = e
                .location()
                .map(|loc| loc.line().saturating_sub(1))
                .unwrap_or(0);
            return vec![diagnostic(
                line,
                0,
                DiagnosticSeverity::ERROR,
                format!("YAML syntax error: {e}"),
            )];
        }
    };

    let mut out = Vec::new();
    if raw.get("yapi").is_none() {
        out.push(diagnostic(
            0,
            0,
            DiagnosticSeverity::ERROR,
            "Missing required field 'yapi' (e.g., yapi: v1)".to_string(),
        ));
    }

    if let Some(default_env) = raw.get("default_environment").and_then(|v| v.as_str()) {
        let defined = raw
            .get("environments")
            .and_then(|envs| envs.get(default_env))
            .is_some();
        if !default_env.is_empty() && !defined {
            let line = find_top_level_key_line(text, "default_environment").unwrap_or(0);
            out.push(diagnostic(
                line,
                0,
                DiagnosticSeverity::ERROR,
                format!("default_environment '{default_env}' not found in environments"),
            ));
        }
    }

    if out.is_empty() {
        if let Err(e) = ProjectConfig::parse(text) {
            out.push(diagnostic(
                0,
                0,
                DiagnosticSeverity::ERROR,
                format!("Project config error: {e}"),
            ));
        }
    }
    out
}

fn severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
    }
}

fn diagnostic(line: usize, col: usize, severity: DiagnosticSeverity, message: String) -> Diagnostic {
    let end = col + RANGE_WIDTH;
    Diagnostic {
        range: Range {
            start: Position {
                line: line as u32,
                character: col as u32,
            },
            end: Position {
                line: line as u32,
                character: end as u32,
            },
        },
        severity: Some(severity),
        source: Some(SOURCE.to_string()),
        message,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapi_analyzer::Diagnostic as Finding;

    #[test]
    fn test_positions_and_severities() {
        let analysis = Analysis {
            diagnostics: vec![
                Finding::error("method", "bad method").at(2, 8),
                Finding::info("TOKEN", "only in OS environment"),
            ],
            warnings: vec!["Missing 'yapi: v1' version tag. Defaulting to v1.".into()],
            ..Default::default()
        };

        let diags = to_lsp_diagnostics(&analysis);
        assert_eq!(diags.len(), 3);
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(diags[0].range.start.line, 0);

        assert_eq!(diags[1].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diags[1].range.start, Position { line: 2, character: 8 });
        assert_eq!(diags[1].range.end, Position { line: 2, character: 108 });
        assert_eq!(diags[1].source.as_deref(), Some("yapi"));

        assert_eq!(diags[2].severity, Some(DiagnosticSeverity::INFORMATION));
        assert_eq!(diags[2].range.start.line, 0);
    }

    #[test]
    fn test_project_config_yaml_error() {
        let diags = validate_project_config("yapi: v1\nenvironments: [\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.starts_with("YAML syntax error:"));
    }

    #[test]
    fn test_project_config_missing_version() {
        let diags = validate_project_config("environments:\n  dev:\n    vars:\n      A: b\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "Missing required field 'yapi' (e.g., yapi: v1)");
    }

    #[test]
    fn test_project_config_unknown_default_environment() {
        let text = "yapi: v1\ndefault_environment: prod\nenvironments:\n  dev:\n    vars:\n      A: b\n";
        let diags = validate_project_config(text);
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].message,
            "default_environment 'prod' not found in environments"
        );
        assert_eq!(diags[0].range.start.line, 1);
    }

    #[test]
    fn test_project_config_other_errors() {
        let diags = validate_project_config("yapi: v2\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.starts_with("Project config error:"));

        let valid = "yapi: v1\ndefault_environment: dev\nenvironments:\n  dev:\n    vars:\n      A: b\n";
        assert!(validate_project_config(valid).is_empty());
    }
}
