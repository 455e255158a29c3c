//! Terminal rendering of responses and expectation results.
//!
//! Response bodies go to stdout; everything else goes to stderr.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use yapi_runner::{ExpectationResult, RequestOutcome};

/// The body as printed: JSON is pretty-printed, anything else is passed
/// through. Trailing newlines are trimmed.
pub fn render_body(body: &str, content_type: Option<&str>) -> String {
    let looks_json = content_type.is_some_and(|ct| ct.contains("json"))
        || body.trim_start().starts_with(['{', '[']);
    if looks_json {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }
    }
    body.trim_end_matches(['\n', '\r']).to_string()
}

pub fn print_body(outcome: &RequestOutcome) {
    println!(
        "{}",
        render_body(&outcome.body, outcome.content_type.as_deref())
    );
}

pub fn print_meta(outcome: &RequestOutcome, color: bool) {
    let body = &outcome.body;
    let lines = [
        format!("URL: {}", outcome.request.url),
        format!("Time: {:?}", outcome.response.duration),
        format!(
            "Size: {} ({} lines, {} chars)",
            format_bytes(body.len()),
            body.lines().count(),
            body.chars().count()
        ),
    ];
    eprintln!();
    for line in lines {
        if color {
            eprintln!("{}", line.dimmed());
        } else {
            eprintln!("{line}");
        }
    }
}

pub fn print_expectation(result: &ExpectationResult, color: bool) {
    if result.assertions_total == 0 && !result.status_checked {
        return;
    }
    let pass = |text: &str| if color { text.green().to_string() } else { text.to_string() };
    let fail = |text: &str| if color { text.red().to_string() } else { text.to_string() };

    eprintln!();
    if result.status_checked {
        let mark = if result.status_passed { pass("[PASS]") } else { fail("[FAIL]") };
        eprintln!("{mark} status check");
    }
    for assertion in &result.assertions {
        let mark = if assertion.passed { pass("[PASS]") } else { fail("[FAIL]") };
        eprintln!("{mark} {}", assertion.expression);
    }
    if result.assertions_total > 0 {
        let summary = format!(
            "assertions: {}/{} passed",
            result.assertions_passed, result.assertions_total
        );
        let summary = if result.all_passed() { pass(&summary) } else { fail(&summary) };
        eprintln!("\n{summary}");
    }
}

/// Write the raw response body to the request's `output_file`, relative to
/// `base_dir`.
pub fn save_output(outcome: &RequestOutcome, base_dir: &Path) -> Result<()> {
    let Some(file) = outcome.request.output_file.as_deref() else {
        return Ok(());
    };
    let path = base_dir.join(file);
    std::fs::write(&path, &outcome.response.body)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    eprintln!("Saved response to {}", path.display());
    Ok(())
}

/// `999B`, `1.5 kB`, `2.0 MB`.
pub fn format_bytes(bytes: usize) -> String {
    const UNIT: usize = 1000;
    if bytes < UNIT {
        return format!("{bytes}B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['k', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {prefix}B", bytes as f64 / div as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(999), "999B");
        assert_eq!(format_bytes(1500), "1.5 kB");
        assert_eq!(format_bytes(2_000_000), "2.0 MB");
    }

    #[test]
    fn test_render_body() {
        assert_eq!(
            render_body(r#"{"a":1}"#, Some("application/json")),
            "{\n  \"a\": 1\n}"
        );
        assert_eq!(render_body("[1]", None), "[\n  1\n]");
        assert_eq!(render_body("plain text\n\n", Some("text/plain")), "plain text");
        assert_eq!(render_body("{not json", Some("application/json")), "{not json");
    }
}
