//! Document validation command.

use anyhow::{Result, bail};
use colored::Colorize;
use std::path::Path;
use yapi_analyzer::{
    Analysis, Analyzer, JsonDiagnostic, JsonOutput, ProjectScope, Severity, format_diagnostic,
    format_warning,
};
use yapi_config::EnvCache;

use super::{discover_project, read_document};

/// Validate a document and print its diagnostics. Exits non-zero when any
/// diagnostic is an error.
pub fn validate(path: &str, env: Option<&str>, json: bool, color: bool) -> Result<()> {
    let text = match read_document(path) {
        Ok(text) => text,
        Err(e) if json => {
            print_json(&read_failure(&format!("{e:#}")))?;
            std::process::exit(1);
        }
        Err(e) => return Err(e),
    };

    let analysis = analyze(path, &text, env)?;

    if json {
        print_json(&analysis.to_json())?;
        if analysis.has_errors() {
            std::process::exit(1);
        }
        return Ok(());
    }

    for warning in &analysis.warnings {
        println!("{}", format_warning(warning, color));
    }
    for diagnostic in &analysis.diagnostics {
        println!("{}", format_diagnostic(diagnostic, color));
    }
    if analysis.warnings.is_empty() && analysis.diagnostics.is_empty() {
        if color {
            println!("{}", "Valid".green());
        } else {
            println!("Valid");
        }
    }

    if analysis.has_errors() {
        bail!("validation errors");
    }
    Ok(())
}

/// Project-aware when the document lives inside a project.
fn analyze(path: &str, text: &str, env: Option<&str>) -> Result<Analysis> {
    let analyzer = Analyzer::new();
    let project = if path == "-" {
        None
    } else {
        discover_project(Path::new(path))?
    };

    let Some(project) = project else {
        if env.is_some() {
            bail!("--env requires a yapi.config.yml in this directory or a parent");
        }
        return Ok(analyzer.analyze(text));
    };
    let mut cache = EnvCache::new();
    let scope = ProjectScope {
        project: &project,
        cache: &mut cache,
        environment: env,
    };
    Ok(analyzer.analyze_with(text, Some(scope)))
}

fn read_failure(message: &str) -> JsonOutput {
    JsonOutput {
        valid: false,
        diagnostics: vec![JsonDiagnostic {
            severity: Severity::Error,
            field: String::new(),
            message: message.to_string(),
            line: 0,
            col: 0,
        }],
        warnings: Vec::new(),
    }
}

fn print_json(output: &JsonOutput) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_failure_output() {
        let value = serde_json::to_value(read_failure("Failed to read file: x.yml")).unwrap();
        assert_eq!(value["valid"], false);
        assert_eq!(value["diagnostics"][0]["severity"], "error");
        assert_eq!(value["diagnostics"][0]["line"], 0);
    }

    #[test]
    fn test_analyze_uses_project_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("yapi.config.yml"),
            "yapi: v1\ndefault_environment: dev\nenvironments:\n  dev:\n    url: http://dev.local\n    vars:\n      TOKEN: abc\n",
        )
        .unwrap();
        let doc = dir.path().join("get.yml");
        let text = "yapi: v1\npath: /users\nheaders:\n  Authorization: Bearer ${TOKEN}\n";
        std::fs::write(&doc, text).unwrap();

        let analysis = analyze(doc.to_str().unwrap(), text, None).unwrap();
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);
        assert_eq!(
            analysis.request.as_ref().map(|r| r.url.as_str()),
            Some("http://dev.local/users")
        );

        assert!(analyze(doc.to_str().unwrap(), text, Some("prod")).unwrap().has_errors());
    }
}
