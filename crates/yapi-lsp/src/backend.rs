use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn};
use yapi_analyzer::{Analyzer, ProjectScope};
use yapi_config::project::is_project_file;
use yapi_config::{EnvCache, Project};

use crate::completion::completions;
use crate::diagnostics::{to_lsp_diagnostics, validate_project_config};
use crate::navigation::{find_definition, hover, reference_at, variable_source};

/// One editor session. Every open document is re-analyzed in full on each
/// open, change and save.
pub struct Backend {
    client: Client,
    documents: Arc<DashMap<Url, String>>,
    analyzer: Analyzer,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Backend {
            client,
            documents: Arc::new(DashMap::new()),
            analyzer: Analyzer::new(),
        }
    }

    async fn on_change(&self, uri: Url, text: String) {
        let diagnostics = self.diagnose(&uri, &text);
        debug!(uri = %uri, count = diagnostics.len(), "Publishing diagnostics");
        self.documents.insert(uri.clone(), text);
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }

    fn diagnose(&self, uri: &Url, text: &str) -> Vec<Diagnostic> {
        let path = uri.to_file_path().ok();
        if path.as_deref().is_some_and(is_project_file) {
            return validate_project_config(text);
        }

        let analysis = match path.as_deref().and_then(discover_project) {
            Some(project) => {
                let mut cache = EnvCache::new();
                let scope = ProjectScope {
                    project: &project,
                    cache: &mut cache,
                    environment: None,
                };
                self.analyzer.analyze_with(text, Some(scope))
            }
            None => self.analyzer.analyze(text),
        };
        to_lsp_diagnostics(&analysis)
    }

    fn text(&self, uri: &Url) -> Option<String> {
        self.documents.get(uri).map(|doc| doc.value().clone())
    }
}

fn discover_project(document: &Path) -> Option<Project> {
    let dir = document.parent()?;
    match Project::discover(dir) {
        Ok(project) => project,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to load project config");
            None
        }
    }
}

fn project_for(uri: &Url) -> Option<Project> {
    let path: PathBuf = uri.to_file_path().ok()?;
    discover_project(&path)
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _: InitializeParams) -> Result<InitializeResult> {
        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "yapi-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![":".to_string(), " ".to_string()]),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("yapi language server initialized");
        self.client
            .log_message(MessageType::INFO, "yapi language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.on_change(params.text_document.uri, params.text_document.text)
            .await;
    }

    async fn did_change(&self, mut params: DidChangeTextDocumentParams) {
        if let Some(change) = params.content_changes.pop() {
            self.on_change(params.text_document.uri, change.text).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = params.text.or_else(|| self.text(&uri));
        if let Some(text) = text {
            self.on_change(uri, text).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.remove(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params;
        let uri = position.text_document.uri;
        let Some(text) = self.text(&uri) else {
            return Ok(None);
        };
        let env = variable_source(project_for(&uri).as_ref());
        let at = position.position;
        Ok(reference_at(&text, &env, at.line as usize, at.character as usize)
            .map(|reference| hover(&reference)))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position;
        let Some(text) = self.text(&position.text_document.uri) else {
            return Ok(None);
        };
        let items = completions(
            &text,
            position.position.line as usize,
            position.position.character as usize,
        );
        Ok((!items.is_empty()).then_some(CompletionResponse::Array(items)))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params;
        let uri = position.text_document.uri;
        let (Some(text), Some(project)) = (self.text(&uri), project_for(&uri)) else {
            return Ok(None);
        };
        let env = variable_source(Some(&project));
        let at = position.position;
        let Some(reference) = reference_at(&text, &env, at.line as usize, at.character as usize)
        else {
            return Ok(None);
        };

        Ok(find_definition(&project, &reference.name).and_then(|(path, range)| {
            let uri = Url::from_file_path(path).ok()?;
            Some(GotoDefinitionResponse::Scalar(Location { uri, range }))
        }))
    }
}
