//! Request document loading.
//!
//! The version envelope is read first; `v1` documents are decoded directly,
//! untagged documents are decoded as `v1` with a warning, anything else is
//! rejected.

use serde_yaml::Value;
use std::path::Path;
use tracing::debug;
use yapi_core::ConfigV1;
use yapi_core::config::is_known_key;

use crate::error::{ConfigError, ConfigResult};

pub const LEGACY_VERSION_WARNING: &str = "Missing 'yapi: v1' version tag. Defaulting to v1.";

/// A decoded request document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub config: ConfigV1,
    /// Document-level warnings such as a missing version tag.
    pub warnings: Vec<String>,
    /// The untyped document, used for unknown-key detection.
    pub raw: Value,
}

/// Parse a request document from text.
pub fn parse_document(text: &str) -> ConfigResult<ParsedDocument> {
    let raw: Value = serde_yaml::from_str(text)?;

    let version = match raw.get("yapi") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => scalar_text(other),
    };

    let mut warnings = Vec::new();
    match version.as_str() {
        "v1" => {}
        "" => warnings.push(LEGACY_VERSION_WARNING.to_string()),
        other => return Err(ConfigError::UnsupportedVersion(other.to_string())),
    }

    let config = match &raw {
        Value::Null => ConfigV1::default(),
        Value::Mapping(_) => serde_yaml::from_str(text)?,
        _ => {
            return Err(ConfigError::InvalidValue {
                field: "document".to_string(),
                message: "expected a mapping of request fields".to_string(),
            });
        }
    };

    debug!(
        chain_steps = config.chain.len(),
        warnings = warnings.len(),
        "Parsed request document"
    );

    Ok(ParsedDocument {
        config,
        warnings,
        raw,
    })
}

/// Read and parse a request document. Invalid UTF-8 is replaced rather than
/// rejected.
pub fn load_document(path: &Path) -> ConfigResult<ParsedDocument> {
    let bytes = std::fs::read(path)?;
    parse_document(&String::from_utf8_lossy(&bytes))
}

/// Top-level keys outside the v1 schema, sorted.
pub fn find_unknown_keys(raw: &Value) -> Vec<String> {
    let Value::Mapping(map) = raw else {
        return Vec::new();
    };
    let mut unknown: Vec<String> = map
        .keys()
        .map(scalar_text)
        .filter(|key| !is_known_key(key))
        .collect();
    unknown.sort();
    unknown
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1() {
        let doc = parse_document("yapi: v1\nurl: http://localhost\nmethod: post\n").unwrap();
        assert_eq!(doc.config.url, "http://localhost");
        assert_eq!(doc.config.method, "post");
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn test_missing_version_warns() {
        let doc = parse_document("url: http://localhost\n").unwrap();
        assert_eq!(doc.warnings, vec![LEGACY_VERSION_WARNING.to_string()]);
    }

    #[test]
    fn test_unsupported_version() {
        let err = parse_document("yapi: v2\nurl: http://localhost\n").unwrap_err();
        assert_eq!(err.to_string(), "unsupported yapi version: v2");
    }

    #[test]
    fn test_empty_document() {
        let doc = parse_document("").unwrap();
        assert_eq!(doc.config, ConfigV1::default());
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn test_invalid_yaml_reports_line() {
        let err = parse_document("yapi: v1\nurl: http://x\nheaders: [unclosed\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
        assert!(err.error_line().is_some());
    }

    #[test]
    fn test_non_mapping_document() {
        assert!(parse_document("- just\n- a list\n").is_err());
    }

    #[test]
    fn test_find_unknown_keys() {
        let doc = parse_document("yapi: v1\nurl: http://x\nmethdo: GET\nbogus: 1\n").unwrap();
        assert_eq!(find_unknown_keys(&doc.raw), vec!["bogus", "methdo"]);
    }

    #[test]
    fn test_load_document_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("get.yapi.yml");
        std::fs::write(&path, "yapi: v1\nurl: http://localhost:3000\n").unwrap();
        let doc = load_document(&path).unwrap();
        assert_eq!(doc.config.url, "http://localhost:3000");
    }
}
