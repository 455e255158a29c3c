//! CLI command implementations.

pub mod output;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use yapi_config::Project;

/// Read a document from `path`, or stdin when `path` is `-`.
pub fn read_document(path: &str) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
}

/// The directory a document's relative paths resolve against.
pub fn document_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// The project enclosing a document, if any.
pub fn discover_project(path: &Path) -> Result<Option<Project>> {
    let dir = document_dir(path);
    Project::discover(&dir)
        .with_context(|| format!("Failed to load project config for {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_dir() {
        assert_eq!(document_dir(Path::new("req.yapi.yml")), PathBuf::from("."));
        assert_eq!(
            document_dir(Path::new("api/users/get.yapi.yml")),
            PathBuf::from("api/users")
        );
    }

    #[test]
    fn test_discover_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("yapi.config.yml"),
            "yapi: v1\nenvironments:\n  dev:\n    vars:\n      HOST: localhost\n",
        )
        .unwrap();
        let nested = dir.path().join("requests");
        std::fs::create_dir(&nested).unwrap();

        let project = discover_project(&nested.join("get.yapi.yml")).unwrap().unwrap();
        assert_eq!(project.config.environment_names(), vec!["dev"]);

        let outside = tempfile::tempdir().unwrap();
        assert!(discover_project(&outside.path().join("x.yml")).unwrap().is_none());
    }
}
