//! Request and chain execution command.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use yapi_analyzer::{
    Analyzer, ProjectScope, check_environment_requirement, write_errors, write_warnings,
};
use yapi_config::{EnvCache, EnvSource};
use yapi_core::ConfigV1;
use yapi_runner::{ChainEvent, Runner, check_expectations};
use yapi_transport::TransportRegistry;

use super::output::{print_body, print_expectation, print_meta, save_output};
use super::{discover_project, document_dir};

pub struct RunArgs {
    pub file: PathBuf,
    pub env: Option<String>,
    pub url: Option<String>,
    pub color: bool,
}

/// Run a request document: analyze it, then execute its request or chain.
pub async fn run(args: RunArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read request file: {}", args.file.display()))?;
    let base_dir = document_dir(&args.file);
    let project = discover_project(&args.file)?;
    if args.env.is_some() && project.is_none() {
        bail!("--env requires a yapi.config.yml in this directory or a parent");
    }

    let env = EnvSource::process();
    let analyzer = Analyzer::new().with_env(env.clone());
    let mut cache = EnvCache::new();

    let (analysis, vars) = match &project {
        Some(project) => {
            match args.env.as_deref() {
                Some(name) => {
                    project.config.environment(name)?;
                }
                None if project.default_environment().is_none() => {
                    let requirement =
                        check_environment_requirement(&text, project, &mut cache, &env);
                    if requirement.required {
                        bail!("{}", requirement.message);
                    }
                }
                None => {}
            }

            let environment = args.env.as_deref().or_else(|| project.default_environment());
            debug!(environment = environment.unwrap_or("(defaults)"), "Using project environment");
            let scope = ProjectScope {
                project,
                cache: &mut cache,
                environment,
            };
            let analysis = analyzer.analyze_with(&text, Some(scope));
            let vars = cache
                .resolve(project, environment.unwrap_or_default())
                .context("Failed to resolve project variables")?;
            (analysis, vars)
        }
        None => (analyzer.analyze(&text), HashMap::new()),
    };

    let mut stderr = std::io::stderr();
    write_errors(&mut stderr, &analysis, args.color)?;
    if analysis.has_errors() {
        bail!("validation errors");
    }
    let Some(mut config) = analysis.config.clone() else {
        bail!("invalid config");
    };
    if let Some(url) = args.url {
        apply_url_override(&mut config, url);
    }

    let transports = TransportRegistry::with_defaults().context("Failed to initialize transports")?;
    let runner = Runner::new(Arc::new(transports))
        .with_env(env)
        .with_vars(vars);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    if config.is_chain() {
        run_chain(&runner, cancel, config, &base_dir, args.color).await?;
    } else {
        run_single(&runner, &cancel, &config, &base_dir, args.color).await?;
    }

    write_warnings(&mut stderr, &analysis, args.color)?;
    Ok(())
}

/// `--url` replaces the whole target of a single request. For a chain it
/// replaces the base URL inherited by steps that set none.
fn apply_url_override(config: &mut ConfigV1, url: String) {
    config.url = url;
    if !config.is_chain() {
        config.path.clear();
    }
}

async fn run_single(
    runner: &Runner,
    cancel: &CancellationToken,
    config: &ConfigV1,
    base_dir: &Path,
    color: bool,
) -> Result<()> {
    let outcome = runner.run_config(cancel, config).await?;
    print_body(&outcome);
    print_meta(&outcome, color);
    save_output(&outcome, base_dir)?;

    let expectation = check_expectations(
        &config.expect,
        outcome.response.status_code,
        &outcome.body,
        &outcome.response.headers,
        runner.filter(),
    );
    print_expectation(&expectation, color);
    if let Some(error) = expectation.error {
        bail!("assertion failed: {error}");
    }
    Ok(())
}

async fn run_chain(
    runner: &Runner,
    cancel: CancellationToken,
    config: ConfigV1,
    base_dir: &Path,
    color: bool,
) -> Result<()> {
    let (mut events, handle) = runner.execute_chain(cancel, config);
    while let Some(event) = events.recv().await {
        match event {
            ChainEvent::StepStarted { index, step } => {
                eprintln!("▶ Step {}: {}", index + 1, step);
            }
            ChainEvent::StepDelayed { step, delay } => {
                eprintln!("  waiting {:?} before '{}'", delay, step);
            }
            ChainEvent::StepCompleted {
                step,
                status,
                duration,
                passed,
            } => {
                let line = format!("'{step}' returned {status} in {duration:?}");
                match (passed, color) {
                    (true, true) => eprintln!("{} {}", "✓".green(), line),
                    (false, true) => eprintln!("{} {}", "✗".red(), line),
                    (true, false) => eprintln!("✓ {line}"),
                    (false, false) => eprintln!("✗ {line}"),
                }
            }
            ChainEvent::ChainCompleted { .. } => {}
        }
    }

    let result = handle.await.context("Chain execution task failed")??;

    for (i, step) in result.steps.iter().enumerate() {
        eprintln!("\n--- Step {}: {} ---", i + 1, step.name);
        print_body(&step.outcome);
        print_meta(&step.outcome, color);
        save_output(&step.outcome, base_dir)?;
        print_expectation(&step.expectation, color);
    }

    match result.error {
        Some(error) => bail!(error),
        None => {
            eprintln!("\nChain completed successfully.");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapi_config::parse_document;

    #[test]
    fn test_url_override_single_request() {
        let mut config = parse_document("yapi: v1\nurl: http://a\npath: /users\n")
            .unwrap()
            .config;
        apply_url_override(&mut config, "http://b/other".into());
        assert_eq!(config.url, "http://b/other");
        assert!(config.path.is_empty());
    }

    #[test]
    fn test_url_override_chain_keeps_step_paths() {
        let mut config = parse_document(
            "yapi: v1\nurl: http://a\nchain:\n  - name: one\n    path: /one\n",
        )
        .unwrap()
        .config;
        apply_url_override(&mut config, "http://b".into());
        assert_eq!(config.url, "http://b");
        assert_eq!(config.chain[0].config.path, "/one");
    }
}
