//! Language server for yapi request documents.
//!
//! Diagnostics come from the same [`yapi_analyzer::Analyzer`] the CLI uses,
//! so an editor shows exactly what `yapi validate` reports.

pub mod backend;
pub mod completion;
pub mod diagnostics;
pub mod navigation;

pub use backend::Backend;

use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

/// Log to stderr; stdout carries the protocol.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

/// Serve the protocol over stdin/stdout until the client exits.
pub async fn run_stdio() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
