//! Core language server implementation

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn};

use crate::action::ActionCache;
use crate::cache::{self, KeywordCache};
use crate::clock::SystemClock;
use crate::completion::{self, CompletionSources};
use crate::config::Config;
use crate::diagnostics;
use crate::fetch::HttpFetcher;
use crate::hover;
use crate::parser::{is_workflow_file, Document};

/// Fetcher and caches built from one configuration
struct Services {
    fetcher: Arc<HttpFetcher>,
    sources: CompletionSources,
}

impl Services {
    fn new(config: &Config, keywords: Arc<KeywordCache>) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(config));
        let actions = ActionCache::new(fetcher.clone(), Arc::new(SystemClock), config);
        Self {
            fetcher,
            sources: CompletionSources {
                keywords,
                actions: Arc::new(actions),
            },
        }
    }
}

/// The main Backend struct for the GitHub workflow language server
pub struct Backend {
    /// LSP client to communicate with the editor
    client: Client,
    config: RwLock<Config>,
    services: RwLock<Arc<Services>>,
    /// Open workflow documents
    documents: Arc<RwLock<HashMap<Url, Document>>>,
}

impl Backend {
    pub fn new(client: Client, config: Config) -> Self {
        let services = Services::new(&config, cache::keywords());
        Self {
            client,
            config: RwLock::new(config),
            services: RwLock::new(Arc::new(services)),
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn services(&self) -> Arc<Services> {
        Arc::clone(&self.services.read())
    }

    fn document(&self, uri: &Url) -> Option<Document> {
        self.documents.read().get(uri).cloned()
    }

    /// Parse and store a document, then publish its diagnostics
    async fn update_document(&self, uri: Url, text: String) {
        let mut document = Document::new(text);
        if let Err(e) = document.parse() {
            debug!("Document {} is not valid YAML: {}", uri, e);
        }

        self.documents.write().insert(uri.clone(), document.clone());

        let services = self.services();
        let diagnostics = diagnostics::validate_document(&document, &services.sources.actions).await;
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }

    async fn revalidate(&self, uri: Url) {
        let Some(document) = self.document(&uri) else {
            debug!("Document not found for validation: {}", uri);
            return;
        };
        let services = self.services();
        let diagnostics = diagnostics::validate_document(&document, &services.sources.actions).await;
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }
}

fn tracks(uri: &Url) -> bool {
    uri.to_file_path()
        .map(|path| is_workflow_file(&path))
        .unwrap_or(false)
}

#[allow(deprecated)]
fn workspace_root(params: &InitializeParams) -> Option<std::path::PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .map(|folder| &folder.uri)
        .or(params.root_uri.as_ref())
        .and_then(|uri| uri.to_file_path().ok())
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        info!("Initializing GitHub workflow language server");

        if let Some(options) = &params.initialization_options {
            let config = {
                let mut config = self.config.write();
                config.apply_initialization_options(options);
                config.clone()
            };
            let keywords = self.services().sources.keywords.clone();
            *self.services.write() = Arc::new(Services::new(&config, keywords));
        }

        if let Some(root) = workspace_root(&params) {
            info!("Workspace root: {}", root.display());
            self.services().fetcher.set_workspace_root(root);
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![
                        ".".to_string(),
                        ":".to_string(),
                        " ".to_string(),
                    ]),
                    ..CompletionOptions::default()
                }),
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(SaveOptions::default().into()),
                        ..TextDocumentSyncOptions::default()
                    },
                )),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "github-workflow-ls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("GitHub workflow language server initialized");
        self.client
            .log_message(MessageType::INFO, "GitHub workflow language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down GitHub workflow language server");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        if !tracks(&uri) {
            debug!("Ignoring non-workflow document: {}", uri);
            return;
        }

        info!("Document opened: {}", uri);
        self.update_document(uri, params.text_document.text).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if !tracks(&uri) {
            return;
        }

        debug!("Document changed: {}", uri);
        // Full sync: the last change carries the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            self.update_document(uri, change.text).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if !tracks(&uri) {
            return;
        }

        info!("Document saved: {}", uri);
        match params.text {
            Some(text) => self.update_document(uri, text).await,
            None => self.revalidate(uri).await,
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if self.documents.write().remove(&uri).is_none() {
            return;
        }

        info!("Document closed: {}", uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position.position;
        let uri = params.text_document_position.text_document.uri;

        let Some(document) = self.document(&uri) else {
            warn!("Completion requested for unknown document: {}", uri);
            return Ok(None);
        };

        let services = self.services();
        let items = completion::provide_completion(&document, position, &services.sources).await;
        debug!("{} completion items for {}", items.len(), uri);

        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;

        let Some(document) = self.document(&uri) else {
            return Ok(None);
        };

        let services = self.services();
        Ok(hover::provide_hover(&document, position, &services.sources.actions).await)
    }
}
