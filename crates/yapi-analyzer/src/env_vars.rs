//! Environment variable references: where they are, and whether the current
//! environment or project can satisfy them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use yapi_config::variables::find_env_refs;
use yapi_config::{EnvCache, EnvSource, Project};

use crate::diagnostic::Diagnostic;
use crate::position::find_var_line;

/// One `$NAME` / `${NAME}` occurrence in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarRef {
    pub name: String,
    /// Current value; `None` when unset or empty.
    pub value: Option<String>,
    pub line: usize,
    /// Byte offsets of the token within its line.
    pub col: usize,
    pub end: usize,
}

impl EnvVarRef {
    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }

    pub fn contains(&self, line: usize, col: usize) -> bool {
        self.line == line && (self.col..self.end).contains(&col)
    }
}

/// Names jq binds itself; never environment variables.
pub fn is_jq_builtin(name: &str) -> bool {
    name == "ENV" || name == "__loc__" || name.starts_with('_')
}

/// Every environment variable reference in `text`.
///
/// Contents of a `graphql` block are skipped: GraphQL uses `$name` for its own
/// variables.
pub fn find_env_var_refs(text: &str, env: &EnvSource) -> Vec<EnvVarRef> {
    let mut refs = Vec::new();
    let mut graphql_indent: Option<usize> = None;

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        let indent = line.len() - line.trim_start_matches([' ', '\t']).len();

        if trimmed.starts_with("graphql:") {
            graphql_indent = Some(indent);
            continue;
        }
        if let Some(block_indent) = graphql_indent {
            if trimmed.is_empty() {
                continue;
            }
            if indent > block_indent || trimmed.starts_with('|') || trimmed.starts_with('>') {
                continue;
            }
            graphql_indent = None;
        }

        for r in find_env_refs(line) {
            if is_jq_builtin(r.name) {
                continue;
            }
            refs.push(EnvVarRef {
                name: r.name.to_string(),
                value: env.get(r.name).filter(|v| !v.is_empty()),
                line: line_no,
                col: r.start,
                end: r.end,
            });
        }
    }
    refs
}

/// Distinct variable names referenced by `text`, sorted.
pub fn env_var_names(text: &str) -> BTreeSet<String> {
    find_env_var_refs(text, &EnvSource::empty())
        .into_iter()
        .map(|r| r.name)
        .collect()
}

/// A warning for every reference the environment leaves undefined.
pub fn validate_env_vars(text: &str, env: &EnvSource) -> Vec<Diagnostic> {
    find_env_var_refs(text, env)
        .into_iter()
        .filter(|r| !r.is_defined())
        .map(|r| {
            Diagnostic::warning(
                &r.name,
                format!("environment variable '{}' is not defined", r.name),
            )
            .at(r.line, r.col)
        })
        .collect()
}

/// Where one variable is available.
#[derive(Debug, Clone, Default)]
struct Availability {
    in_defaults: bool,
    in_os: bool,
    defined_in: Vec<String>,
    missing_in: Vec<String>,
}

/// Variables every environment sees, from `defaults`.
fn default_vars(project: &Project, cache: &mut EnvCache) -> HashMap<String, String> {
    let mut vars = cache.resolve(project, "").unwrap_or_default();
    for (key, value) in &project.config.defaults.vars {
        vars.entry(key.clone()).or_insert_with(|| value.clone());
    }
    vars
}

/// Check each referenced variable against the project's defaults and every
/// environment.
///
/// - in defaults: fine
/// - only in the process environment: info, it works here but nowhere else
/// - in every environment: fine
/// - in some environments: warning naming the others
/// - nowhere: error
pub fn validate_project_vars(
    text: &str,
    project: &Project,
    cache: &mut EnvCache,
    env: &EnvSource,
) -> Vec<Diagnostic> {
    let names = env_var_names(text);
    if names.is_empty() {
        return Vec::new();
    }

    let defaults = default_vars(project, cache);
    let mut matrix: BTreeMap<&str, Availability> = BTreeMap::new();
    for name in &names {
        let in_defaults = defaults.contains_key(name);
        matrix.insert(
            name,
            Availability {
                in_defaults,
                in_os: !in_defaults && env.contains(name),
                ..Default::default()
            },
        );
    }

    for env_name in project.config.environment_names() {
        let Ok(vars) = cache.resolve(project, &env_name) else {
            continue;
        };
        for (name, availability) in matrix.iter_mut() {
            if vars.contains_key(*name) || availability.in_defaults {
                availability.defined_in.push(env_name.clone());
            } else {
                availability.missing_in.push(env_name.clone());
            }
        }
    }

    let mut diags = Vec::new();
    for (name, availability) in matrix {
        let line = find_var_line(text, name);
        if availability.in_defaults {
            continue;
        }
        if availability.in_os && availability.defined_in.is_empty() {
            diags.push(
                Diagnostic::info(
                    name,
                    format!(
                        "variable '{name}' only defined in OS environment (not in project config). Consider adding to yapi.config.yml for reproducibility"
                    ),
                )
                .at_line(line),
            );
            continue;
        }
        if availability.missing_in.is_empty() {
            continue;
        }
        if !availability.defined_in.is_empty() {
            diags.push(
                Diagnostic::warning(
                    name,
                    format!(
                        "variable '{name}' is missing in environment(s): {}",
                        availability.missing_in.join(", ")
                    ),
                )
                .at_line(line),
            );
            continue;
        }
        diags.push(
            Diagnostic::error(
                name,
                format!("variable '{name}' is not defined in any environment or defaults"),
            )
            .at_line(line),
        );
    }
    diags
}

/// Whether running a document needs `--env`, and why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentRequirement {
    pub required: bool,
    /// Variables no environment defines.
    pub missing_variables: Vec<String>,
    /// Variable to the comma-separated environments defining it.
    pub partial_variables: BTreeMap<String, String>,
    pub message: String,
}

/// Work out whether the variables `text` uses can be satisfied without
/// selecting an environment.
pub fn check_environment_requirement(
    text: &str,
    project: &Project,
    cache: &mut EnvCache,
    env: &EnvSource,
) -> EnvironmentRequirement {
    let names = env_var_names(text);
    if names.is_empty() {
        return EnvironmentRequirement::default();
    }

    let defaults = default_vars(project, cache);
    let environments = project.config.environment_names();
    let mut missing = Vec::new();
    let mut partial = BTreeMap::new();

    for name in &names {
        if env.contains(name) || defaults.contains_key(name) {
            continue;
        }
        let defined_in: Vec<String> = environments
            .iter()
            .filter(|env_name| {
                cache
                    .resolve(project, env_name)
                    .is_ok_and(|vars| vars.contains_key(name))
            })
            .cloned()
            .collect();
        if defined_in.is_empty() {
            missing.push(name.clone());
        } else {
            partial.insert(name.clone(), defined_in.join(", "));
        }
    }

    if missing.is_empty() && partial.is_empty() {
        return EnvironmentRequirement::default();
    }

    let mut message =
        String::from("This config requires environment variables that are not currently defined.\n");
    if !missing.is_empty() {
        message.push_str("\nNot defined in any environment:\n");
        for name in &missing {
            message.push_str(&format!("  - {name}\n"));
        }
    }
    if !partial.is_empty() {
        message.push_str("\nDefined in some environments:\n");
        for (name, envs) in &partial {
            message.push_str(&format!("  - {name} (available in: {envs})\n"));
        }
    }
    message.push_str("\nUse --env <name> to select an environment.\n");
    message.push_str(&format!("Available environments: {}", environments.join(", ")));

    EnvironmentRequirement {
        required: true,
        missing_variables: missing,
        partial_variables: partial,
        message,
    }
}

/// Show only the first and last two characters of a secret.
pub fn redact_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => "(empty)".to_string(),
        n if n <= 4 => "*".repeat(n),
        n => {
            let head: String = chars[..2].iter().collect();
            let tail: String = chars[n - 2..].iter().collect();
            format!("{head}{}{tail}", "*".repeat(n - 4))
        }
    }
}
