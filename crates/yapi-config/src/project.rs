//! Project configuration (`yapi.config.yml`).
//!
//! A project defines named environments, each a set of variables plus request
//! defaults. Variables come from, in increasing priority: default `.env`
//! files, default `vars`, the environment's `.env` files, the environment's
//! `vars`. The process environment overrides all of them at resolve time.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;
use yapi_core::ConfigV1;
use yapi_core::config::lenient_string_map;

use crate::error::{ConfigError, ConfigResult};

pub const PROJECT_FILE_NAMES: [&str; 2] = ["yapi.config.yml", "yapi.config.yaml"];

/// Whether `path` names a project config file.
pub fn is_project_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| PROJECT_FILE_NAMES.contains(&n))
}

/// Variables shared by every environment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SharedVars {
    #[serde(deserialize_with = "lenient_string_map")]
    pub vars: BTreeMap<String, String>,
    pub env_files: Vec<String>,
}

/// One named environment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Environment {
    #[serde(skip)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Request defaults; file values take precedence.
    #[serde(flatten)]
    pub defaults: ConfigV1,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub yapi: String,
    pub kind: String,
    pub default_environment: String,
    pub defaults: SharedVars,
    pub environments: BTreeMap<String, Environment>,
}

impl ProjectConfig {
    /// Parse and validate a project config.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        let version = raw.get("yapi").and_then(|v| v.as_str()).unwrap_or_default();
        if version != "v1" {
            return Err(ConfigError::Project(format!(
                "unsupported project config version: {version}"
            )));
        }

        let mut config: ProjectConfig = serde_yaml::from_str(text)?;
        for (name, env) in config.environments.iter_mut() {
            env.name = name.clone();
        }

        if !config.default_environment.is_empty()
            && !config.environments.contains_key(&config.default_environment)
        {
            return Err(ConfigError::Project(format!(
                "default_environment '{}' not found in environments (available: {})",
                config.default_environment,
                config.environment_names().join(", ")
            )));
        }

        Ok(config)
    }

    pub fn environment(&self, name: &str) -> ConfigResult<&Environment> {
        self.environments.get(name).ok_or_else(|| {
            ConfigError::Project(format!("environment '{name}' not defined in project config"))
        })
    }

    /// Environment names, sorted.
    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }
}

/// A loaded project and the directory it lives in.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    /// Load the project config from `root`, trying `.yml` before `.yaml`.
    pub fn load(root: &Path) -> ConfigResult<Self> {
        let path = PROJECT_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                ConfigError::Project(format!("no yapi.config.yml in {}", root.display()))
            })?;
        let text = std::fs::read_to_string(&path)?;
        let config = ProjectConfig::parse(&text)?;
        debug!(root = %root.display(), environments = config.environments.len(), "Loaded project config");
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// Find and load the project enclosing `start`, if any.
    pub fn discover(start: &Path) -> ConfigResult<Option<Self>> {
        match find_project_root(start) {
            Some(root) => Self::load(&root).map(Some),
            None => Ok(None),
        }
    }

    /// The environment to use when none is requested.
    pub fn default_environment(&self) -> Option<&str> {
        let name = self.config.default_environment.as_str();
        (!name.is_empty()).then_some(name)
    }
}

/// Walk up from `start` looking for a project config file.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let start = std::path::absolute(start).ok()?;
    let mut current = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start
    };
    loop {
        if PROJECT_FILE_NAMES.iter().any(|n| current.join(n).is_file()) {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Resolved variable maps per environment, owned by the caller.
///
/// The empty name holds the defaults alone.
#[derive(Debug, Default)]
pub struct EnvCache {
    resolved: HashMap<String, HashMap<String, String>>,
}

impl EnvCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables for `env_name`, loading `.env` files on first use.
    pub fn resolve(
        &mut self,
        project: &Project,
        env_name: &str,
    ) -> ConfigResult<HashMap<String, String>> {
        if let Some(cached) = self.resolved.get(env_name) {
            return Ok(cached.clone());
        }

        let config = &project.config;
        let mut vars = HashMap::new();

        for file in &config.defaults.env_files {
            vars.extend(read_env_file(&project.root.join(file))?);
        }
        vars.extend(config.defaults.vars.clone());

        if let Some(env) = config.environments.get(env_name) {
            for file in &env.env_files {
                vars.extend(read_env_file(&project.root.join(file))?);
            }
            vars.extend(env.vars.clone());
        }

        self.resolved.insert(env_name.to_string(), vars.clone());
        Ok(vars)
    }

    pub fn clear(&mut self) {
        self.resolved.clear();
    }
}

/// Read a `.env` file.
pub fn read_env_file(path: &Path) -> ConfigResult<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::EnvFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(parse_env_file(&text))
}

/// Parse `KEY=VALUE` lines. Supports `export` prefixes, quoted values and
/// `#` comments.
pub fn parse_env_file(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()));
    }
    vars
}

fn unquote(value: &str) -> String {
    if let Some(inner) = value.strip_prefix('"') {
        let inner = inner.split('"').next().unwrap_or(inner);
        return inner.replace("\\n", "\n").replace("\\t", "\t");
    }
    if let Some(inner) = value.strip_prefix('\'') {
        return inner.split('\'').next().unwrap_or(inner).to_string();
    }
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}
