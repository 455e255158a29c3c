//! The single analysis entry point shared by the CLI and the language server.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use yapi_config::error::ConfigError;
use yapi_config::{
    EnvCache, EnvSource, PlaceholderResolver, Project, ResolveError, Resolver, compile,
    find_unknown_keys, parse_document,
};
use yapi_core::ConfigV1;

use crate::chain::{check_assertions, step_label, validate_chain};
use crate::diagnostic::{Analysis, Diagnostic, StepAnalysis};
use crate::env_vars::{validate_env_vars, validate_project_vars};
use crate::position::{
    chain_entry_lines, chain_entry_range, find_field_line, find_field_line_in,
    find_top_level_key_line, has_block_scalar_value,
};
use crate::rules::validate_request;
use crate::syntax::{GraphqlChecker, JqChecker, SyntaxChecker, SyntaxError};

/// The project a document belongs to, for variable checks and environment
/// defaults.
pub struct ProjectScope<'a> {
    pub project: &'a Project,
    pub cache: &'a mut EnvCache,
    /// Requested environment; the project default when `None`.
    pub environment: Option<&'a str>,
}

/// Produces an [`Analysis`] for any input without failing.
#[derive(Clone)]
pub struct Analyzer {
    env: EnvSource,
    graphql: Arc<dyn SyntaxChecker>,
    jq: Arc<dyn SyntaxChecker>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            env: EnvSource::process(),
            graphql: Arc::new(GraphqlChecker),
            jq: Arc::new(JqChecker),
        }
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `env` instead of the process environment.
    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    pub fn with_graphql_checker(mut self, checker: impl SyntaxChecker + 'static) -> Self {
        self.graphql = Arc::new(checker);
        self
    }

    pub fn with_jq_checker(mut self, checker: impl SyntaxChecker + 'static) -> Self {
        self.jq = Arc::new(checker);
        self
    }

    pub fn env(&self) -> &EnvSource {
        &self.env
    }

    pub fn analyze(&self, text: &str) -> Analysis {
        self.analyze_with(text, None)
    }

    /// Analyze raw bytes; invalid UTF-8 is replaced rather than rejected.
    pub fn analyze_bytes(&self, bytes: &[u8], scope: Option<ProjectScope<'_>>) -> Analysis {
        self.analyze_with(&String::from_utf8_lossy(bytes), scope)
    }

    pub fn analyze_file(&self, path: &Path, scope: Option<ProjectScope<'_>>) -> Analysis {
        match std::fs::read(path) {
            Ok(bytes) => self.analyze_bytes(&bytes, scope),
            Err(e) => Analysis::failed(
                Diagnostic::error("", format!("failed to load config: {e}")).at(0, 0),
            ),
        }
    }

    pub fn analyze_with(&self, text: &str, scope: Option<ProjectScope<'_>>) -> Analysis {
        match catch_unwind(AssertUnwindSafe(|| self.run(text, scope))) {
            Ok(analysis) => analysis,
            Err(_) => {
                warn!("Analysis panicked");
                Analysis::failed(
                    Diagnostic::error("", "internal error while analyzing document").at(0, 0),
                )
            }
        }
    }

    fn run(&self, text: &str, mut scope: Option<ProjectScope<'_>>) -> Analysis {
        let doc = match parse_document(text) {
            Ok(doc) => doc,
            Err(e) => return Analysis::failed(load_error(text, &e)),
        };

        let mut diags = Vec::new();
        let mut config = doc.config;
        let mut project_vars = HashMap::new();

        if let Some(scope) = scope.as_mut() {
            let project = scope.project;
            let env_name = scope
                .environment
                .or_else(|| project.default_environment());
            if let Some(env_name) = env_name {
                match project.config.environment(env_name) {
                    Ok(environment) => config = config.merge_with_defaults(&environment.defaults),
                    Err(e) => diags.push(Diagnostic::error("", e.to_string())),
                }
            }
            match scope.cache.resolve(project, env_name.unwrap_or_default()) {
                Ok(vars) => project_vars = vars,
                Err(e) => diags.push(Diagnostic::warning("", e.to_string())),
            }
        }

        let resolver = analysis_resolver(&self.env, &project_vars);
        let mut analysis = if config.is_chain() {
            self.analyze_chain(text, &config, &resolver, &mut diags)
        } else {
            self.analyze_single(text, &config, &resolver, &mut diags)
        };

        for key in find_unknown_keys(&doc.raw) {
            let line = find_top_level_key_line(text, &key);
            diags.push(
                Diagnostic::warning(&key, format!("unknown key '{key}' will be ignored"))
                    .at_line(line),
            );
        }

        match scope {
            Some(ProjectScope { project, cache, .. }) => {
                diags.extend(validate_project_vars(text, project, cache, &self.env))
            }
            None => diags.extend(validate_env_vars(text, &self.env)),
        }

        debug!(
            diagnostics = diags.len(),
            chain = config.is_chain(),
            "Analyzed document"
        );
        analysis.diagnostics = diags;
        analysis.warnings = doc.warnings;
        analysis.config = Some(config);
        analysis
    }

    fn analyze_single(
        &self,
        text: &str,
        config: &ConfigV1,
        resolver: &dyn Resolver,
        diags: &mut Vec<Diagnostic>,
    ) -> Analysis {
        let compiled = compile(config, resolver);
        for err in &compiled.errors {
            diags.push(
                Diagnostic::error(&err.field, &err.message)
                    .at_line(find_field_line(text, &err.field)),
            );
        }

        if let Some(request) = &compiled.request {
            for d in validate_request(request, config) {
                let line = find_field_line(text, &d.field);
                diags.push(d.at_line(line));
            }
        }

        diags.extend(self.embedded_syntax(text, config, "", &(0..usize::MAX)));
        diags.extend(check_assertions(
            text,
            config.expect.assert.iter(),
            "assert",
            &(0..usize::MAX),
            self.jq.as_ref(),
        ));

        Analysis {
            request: compiled.request,
            ..Default::default()
        }
    }

    fn analyze_chain(
        &self,
        text: &str,
        base: &ConfigV1,
        resolver: &dyn Resolver,
        diags: &mut Vec<Diagnostic>,
    ) -> Analysis {
        diags.extend(validate_chain(
            text,
            base,
            &base.chain,
            &self.env,
            self.jq.as_ref(),
        ));
        diags.extend(self.embedded_syntax(text, base, "", &(0..usize::MAX)));

        let entry_lines = chain_entry_lines(text);
        let mut chain = Vec::with_capacity(base.chain.len());
        for (i, step) in base.chain.iter().enumerate() {
            let label = step_label(step, i);
            let range = chain_entry_range(text, i).unwrap_or(0..usize::MAX);
            let step_line = entry_lines.get(i).copied();
            let line_of = |field: &str| find_field_line_in(text, field, range.clone()).or(step_line);

            let merged = base.merge(step);
            let compiled = compile(&merged, resolver);
            for err in &compiled.errors {
                diags.push(
                    Diagnostic::error(
                        format!("{label}.{}", err.field),
                        format!("step '{label}': {}", err.message),
                    )
                    .at_line(line_of(&err.field)),
                );
            }
            if let Some(request) = &compiled.request {
                // Missing URLs are reported by the chain rules.
                for d in validate_request(request, &merged)
                    .into_iter()
                    .filter(|d| d.field != "url")
                {
                    let line = line_of(&d.field);
                    diags.push(Diagnostic {
                        field: format!("{label}.{}", d.field),
                        message: format!("step '{label}': {}", d.message),
                        ..d
                    }
                    .at_line(line));
                }
            }
            diags.extend(self.embedded_syntax(text, &step.config, &label, &range));

            chain.push(StepAnalysis {
                name: step.name.clone(),
                config: merged,
                request: compiled.request,
            });
        }

        Analysis {
            chain,
            ..Default::default()
        }
    }

    /// GraphQL and jq syntax errors for the fields `config` itself sets.
    fn embedded_syntax(
        &self,
        text: &str,
        config: &ConfigV1,
        step: &str,
        lines: &std::ops::Range<usize>,
    ) -> Vec<Diagnostic> {
        let qualify = |field: &str| {
            if step.is_empty() {
                field.to_string()
            } else {
                format!("{step}.{field}")
            }
        };
        let mut diags = Vec::new();

        if !config.graphql.trim().is_empty() {
            if let Err(e) = self.graphql.check(&config.graphql) {
                let line = embedded_line(text, "graphql", lines, &e);
                diags.push(
                    Diagnostic::error(qualify("graphql"), format!("GraphQL syntax error: {e}"))
                        .at_line(line),
                );
            }
        }

        if !config.jq_filter.trim().is_empty() {
            if let Err(e) = self.jq.check(&config.jq_filter) {
                let line = embedded_line(text, "jq_filter", lines, &e);
                diags.push(
                    Diagnostic::error(qualify("jq_filter"), format!("JQ syntax error: {e}"))
                        .at_line(line),
                );
            }
        }

        diags
    }
}

/// Document line of an error in an embedded field. Block scalar content
/// starts on the line after the key.
fn embedded_line(
    text: &str,
    field: &str,
    lines: &std::ops::Range<usize>,
    err: &SyntaxError,
) -> Option<usize> {
    let key = find_field_line_in(text, field, lines.clone())?;
    if has_block_scalar_value(text, key) {
        Some(key + 1 + err.line.unwrap_or(0))
    } else {
        Some(key)
    }
}

/// The one diagnostic for a document that could not be loaded.
fn load_error(text: &str, err: &ConfigError) -> Diagnostic {
    let line = match err {
        ConfigError::UnsupportedVersion(_) => find_top_level_key_line(text, "yapi"),
        other => other.error_line(),
    };
    Diagnostic::error("", err.to_string()).at_line(line)
}

/// Editor-time resolution: environment, then project variables, then a
/// placeholder so compilation can proceed. Chain references stay as written.
fn analysis_resolver<'a>(
    env: &'a EnvSource,
    vars: &'a HashMap<String, String>,
) -> impl Fn(&str) -> Result<Option<String>, ResolveError> + 'a {
    move |name: &str| {
        if name.contains('.') {
            return Ok(None);
        }
        if let Some(value) = env.get(name).filter(|v| !v.is_empty()) {
            return Ok(Some(value));
        }
        if let Some(value) = vars.get(name) {
            return Ok(Some(value.clone()));
        }
        PlaceholderResolver.resolve(name)
    }
}
