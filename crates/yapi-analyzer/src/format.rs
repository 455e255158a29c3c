//! Terminal rendering of diagnostics.

use colored::Colorize;
use std::io::{self, Write};
use thiserror::Error;

use crate::diagnostic::{Analysis, Diagnostic, Severity};

/// `[ERROR] (line N) message`, with a 1-based line when known.
pub fn format_diagnostic(d: &Diagnostic, color: bool) -> String {
    let line = d
        .line
        .map(|l| format!(" (line {})", l + 1))
        .unwrap_or_default();
    let tag = match d.severity {
        Severity::Error => "[ERROR]",
        Severity::Warning => "[WARN]",
        Severity::Info => "[INFO]",
    };
    let text = format!("{tag}{line} {}", d.message);
    if !color {
        return text;
    }
    match d.severity {
        Severity::Error => text.red().to_string(),
        Severity::Warning => text.yellow().to_string(),
        Severity::Info => text.cyan().to_string(),
    }
}

pub fn format_warning(warning: &str, color: bool) -> String {
    let text = format!("[WARN] {warning}");
    if color { text.yellow().to_string() } else { text }
}

/// Write the error diagnostics of `analysis`.
pub fn write_errors(out: &mut dyn Write, analysis: &Analysis, color: bool) -> io::Result<()> {
    for d in analysis.errors() {
        writeln!(out, "{}", format_diagnostic(d, color))?;
    }
    Ok(())
}

/// Write document warnings, then every non-error diagnostic.
pub fn write_warnings(out: &mut dyn Write, analysis: &Analysis, color: bool) -> io::Result<()> {
    for w in &analysis.warnings {
        writeln!(out, "{}", format_warning(w, color))?;
    }
    for d in analysis.diagnostics.iter().filter(|d| !d.is_error()) {
        writeln!(out, "{}", format_diagnostic(d, color))?;
    }
    Ok(())
}

/// The error diagnostics of a document that cannot be run.
#[derive(Debug, Clone, Error)]
#[error("{}", summarize(.diagnostics))]
pub struct ValidationError {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationError {
    /// `None` when `analysis` has no errors.
    pub fn from_analysis(analysis: &Analysis) -> Option<Self> {
        analysis.has_errors().then(|| Self {
            diagnostics: analysis.diagnostics.clone(),
        })
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    let errors: Vec<&str> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.message.as_str())
        .collect();
    match errors.as_slice() {
        [] => "validation failed".to_string(),
        [only] => only.to_string(),
        many => format!("{} validation errors: {}", many.len(), many.join("; ")),
    }
}
