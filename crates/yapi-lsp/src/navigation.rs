//! Hover and go-to-definition for variable references.

use std::collections::HashMap;
use std::path::PathBuf;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Range};
use yapi_analyzer::{EnvVarRef, find_env_var_refs, redact_value};
use yapi_config::project::PROJECT_FILE_NAMES;
use yapi_config::{EnvCache, EnvSource, Project};

/// The environment the editor assumes: the project default, else the first
/// by name.
pub fn effective_environment(project: &Project) -> Option<String> {
    project
        .default_environment()
        .map(str::to_string)
        .or_else(|| project.config.environment_names().into_iter().next())
}

/// Variable values as the editor sees them: project variables for the
/// effective environment, overridden by the process environment.
pub fn variable_source(project: Option<&Project>) -> EnvSource {
    let Some(project) = project else {
        return EnvSource::process();
    };
    let env_name = effective_environment(project).unwrap_or_default();
    let mut vars: HashMap<String, String> = EnvCache::new()
        .resolve(project, &env_name)
        .unwrap_or_default();
    vars.extend(std::env::vars());
    EnvSource::from_map(vars)
}

/// The reference under the cursor.
pub fn reference_at(text: &str, env: &EnvSource, line: usize, character: usize) -> Option<EnvVarRef> {
    find_env_var_refs(text, env)
        .into_iter()
        .find(|r| r.contains(line, character))
}

pub fn hover(reference: &EnvVarRef) -> Hover {
    let status = match &reference.value {
        Some(value) => format!("Value: `{}`", redact_value(value)),
        None => "_Not defined_".to_string(),
    };
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: format!("**Environment Variable: `{}`**\n\n{status}", reference.name),
        }),
        range: Some(line_range(reference.line, reference.col, reference.end)),
    }
}

/// Where `name` is defined: the effective environment's `vars`, then the
/// shared `vars`, then the `.env` files in the same order.
pub fn find_definition(project: &Project, name: &str) -> Option<(PathBuf, Range)> {
    let env_name = effective_environment(project);
    let config_path = PROJECT_FILE_NAMES
        .iter()
        .map(|f| project.root.join(f))
        .find(|p| p.is_file())?;

    if let Ok(text) = std::fs::read_to_string(&config_path) {
        if let Some((line, col)) = find_var_in_config(&text, env_name.as_deref(), name) {
            return Some((config_path, line_range(line, col, col + name.len())));
        }
    }

    let config = &project.config;
    let env_files = env_name
        .as_deref()
        .and_then(|n| config.environments.get(n))
        .map(|env| env.env_files.clone())
        .unwrap_or_default();
    env_files
        .iter()
        .chain(&config.defaults.env_files)
        .map(|file| project.root.join(file))
        .find_map(|path| {
            let text = std::fs::read_to_string(&path).ok()?;
            let (line, col) = find_var_in_env_file(&text, name)?;
            Some((path, line_range(line, col, col + name.len())))
        })
}

/// Line and column of `name:` under `environments.<env>.vars`, falling back
/// to `defaults.vars`.
fn find_var_in_config(text: &str, env_name: Option<&str>, name: &str) -> Option<(usize, usize)> {
    let key = format!("{name}:");
    let mut top = "";
    let mut current_env = "";
    let mut section = "";
    let mut in_env = None;
    let mut in_defaults = None;

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - trimmed.len();
        let Some((field, _)) = trimmed.split_once(':') else {
            continue;
        };

        match (top, indent) {
            (_, 0) => {
                top = field;
                current_env = "";
                section = "";
            }
            ("environments", 2) => {
                current_env = field;
                section = "";
            }
            ("environments", 4) | ("defaults", 2) => section = field,
            _ => {}
        }

        if indent == 0 || section != "vars" || !trimmed.starts_with(&key) {
            continue;
        }
        if top == "environments" && indent > 4 && Some(current_env) == env_name {
            in_env.get_or_insert((line_no, indent));
        } else if top == "defaults" && indent > 2 {
            in_defaults.get_or_insert((line_no, indent));
        }
    }
    in_env.or(in_defaults)
}

fn find_var_in_env_file(text: &str, name: &str) -> Option<(usize, usize)> {
    let key = format!("{name}=");
    text.lines().enumerate().find_map(|(line_no, line)| {
        let trimmed = line.trim_start();
        let bare = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        bare.starts_with(&key).then(|| (line_no, line.len() - bare.len()))
    })
}

fn line_range(line: usize, start: usize, end: usize) -> Range {
    Range {
        start: Position {
            line: line as u32,
            character: start as u32,
        },
        end: Position {
            line: line as u32,
            character: end as u32,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const PROJECT: &str = "yapi: v1
default_environment: dev
defaults:
  vars:
    SHARED: one
environments:
  dev:
    vars:
      TOKEN: dev-token
  prod:
    vars:
      TOKEN: prod-token
    env_files:
      - prod.env
";

    fn project_in(dir: &Path, config: &str) -> Project {
        std::fs::write(dir.join("yapi.config.yml"), config).unwrap();
        Project::load(dir).unwrap()
    }

    #[test]
    fn test_effective_environment() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path(), PROJECT);
        assert_eq!(effective_environment(&project).as_deref(), Some("dev"));

        let no_default = PROJECT.replace("default_environment: dev\n", "");
        let project = project_in(dir.path(), &no_default);
        assert_eq!(effective_environment(&project).as_deref(), Some("dev"));
    }

    #[test]
    fn test_hover_redacts_value() {
        let env = EnvSource::from_map([("API_TOKEN".to_string(), "secret-value".to_string())].into());
        let text = "yapi: v1\nheaders:\n  Authorization: Bearer ${API_TOKEN}\n";
        let reference = reference_at(text, &env, 2, 27).unwrap();
        let Hover { contents, range } = hover(&reference);
        let HoverContents::Markup(markup) = contents else {
            panic!("expected markup");
        };
        assert_eq!(
            markup.value,
            "**Environment Variable: `API_TOKEN`**\n\nValue: `se********ue`"
        );
        assert_eq!(range.unwrap().start.line, 2);
    }

    #[test]
    fn test_hover_undefined_and_outside() {
        let env = EnvSource::empty();
        let text = "url: http://$HOST/x\n";
        let reference = reference_at(text, &env, 0, 13).unwrap();
        let HoverContents::Markup(markup) = hover(&reference).contents else {
            panic!("expected markup");
        };
        assert!(markup.value.ends_with("_Not defined_"));
        assert!(reference_at(text, &env, 0, 2).is_none());
    }

    #[test]
    fn test_definition_prefers_effective_environment() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path(), PROJECT);

        let (path, range) = find_definition(&project, "TOKEN").unwrap();
        assert!(path.ends_with("yapi.config.yml"));
        assert_eq!(range.start, Position { line: 8, character: 6 });

        let (_, range) = find_definition(&project, "SHARED").unwrap();
        assert_eq!(range.start.line, 4);
        assert!(find_definition(&project, "MISSING").is_none());
    }

    #[test]
    fn test_definition_in_env_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("prod.env"), "# prod\nexport DB_URL=postgres://db\n").unwrap();
        let config = PROJECT.replace("default_environment: dev", "default_environment: prod");
        let project = project_in(dir.path(), &config);

        let (path, range) = find_definition(&project, "DB_URL").unwrap();
        assert!(path.ends_with("prod.env"));
        assert_eq!(range.start, Position { line: 1, character: 7 });
    }
}
