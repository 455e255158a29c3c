//! yapi command-line client.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "yapi")]
#[command(about = "Run and validate yapi request documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a request or chain
    Run {
        /// Path to the request document
        file: PathBuf,
        /// Project environment to use
        #[arg(short, long, env = "YAPI_ENV")]
        env: Option<String>,
        /// Replace the request URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Report diagnostics for a request document
    Validate {
        /// Path to the request document; `-` reads stdin
        #[arg(default_value = "-")]
        file: String,
        /// Project environment to check against
        #[arg(short, long, env = "YAPI_ENV")]
        env: Option<String>,
        /// Output diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the language server on stdin/stdout
    Lsp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Lsp = cli.command {
        yapi_lsp::init_tracing();
        yapi_lsp::run_stdio().await;
        return Ok(());
    }

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }
    let color = !cli.no_color;

    match cli.command {
        Commands::Run { file, env, url } => {
            commands::run::run(commands::run::RunArgs {
                file,
                env,
                url,
                color,
            })
            .await?;
        }
        Commands::Validate { file, env, json } => {
            commands::validate::validate(&file, env.as_deref(), json, color)?;
        }
        Commands::Lsp => {}
    }

    Ok(())
}
