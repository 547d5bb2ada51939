//! Main language server implementation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use jsonnet_analysis::ast::{field_name_to_string, Expr};
use jsonnet_analysis::position::{position_protocol_to_ast, range_ast_to_protocol};
use jsonnet_analysis::{Document, DocumentCache, Evaluator, EvaluatorFactory, Processor};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde_json::Value;
use tower_lsp::async_trait;
use tower_lsp::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp::lsp_types::{
    CompletionList, CompletionOptions, CompletionParams, CompletionResponse,
    DidChangeConfigurationParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DocumentFormattingParams, DocumentSymbolParams,
    DocumentSymbolResponse, ExecuteCommandOptions, ExecuteCommandParams, GotoDefinitionParams,
    GotoDefinitionResponse, Hover, HoverParams, HoverProviderCapability, InitializeParams,
    InitializeResult, InitializedParams, Location, OneOf, Position, ReferenceParams, SaveOptions,
    ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
    TextDocumentSyncOptions, TextDocumentSyncSaveOptions, TextEdit, Url,
};
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, error, info, warn};

use crate::config::Configuration;
use crate::diagnostics::{DiagnosticsEngine, DiagnosticsSink};
use crate::features::{completion, execute, formatting, hover, symbols};
use crate::jpath;
use crate::stdlib::{self, StdFunction};

const ERROR_RETRIEVING_DOCUMENT: &str = "unable to retrieve document from the cache";
const ERROR_PARSING_DOCUMENT: &str = "error parsing the document";

/// What the server needs from its transport client. [`tower_lsp::Client`] in
/// production; tests plug in capturing stand-ins.
pub trait LspClient: DiagnosticsSink + Clone {}
impl LspClient for Client {}

pub struct JsonnetLanguageServer<C = Client> {
    client: C,
    cache: Arc<DocumentCache>,
    factory: Arc<dyn EvaluatorFactory>,
    config: Arc<RwLock<Configuration>>,
    stdlib: OnceCell<Vec<StdFunction>>,
    diagnostics: Arc<DiagnosticsEngine>,
}

impl JsonnetLanguageServer<Client> {
    pub fn new(client: Client, factory: Arc<dyn EvaluatorFactory>) -> Self {
        Self::with_client(client, factory)
    }
}

impl<C: LspClient> JsonnetLanguageServer<C> {
    pub fn with_client(client: C, factory: Arc<dyn EvaluatorFactory>) -> Self {
        let cache = Arc::new(DocumentCache::new());
        let config = Arc::new(RwLock::new(Configuration::default()));
        let diagnostics =
            DiagnosticsEngine::new(Arc::clone(&cache), Arc::clone(&factory), Arc::clone(&config));
        Self {
            client,
            cache,
            factory,
            config,
            stdlib: OnceCell::new(),
            diagnostics,
        }
    }

    /// An evaluator whose import roots fit `filename`, with the configured
    /// external variables applied.
    fn evaluator_for(&self, filename: &str) -> Box<dyn Evaluator> {
        let config = self.config.read();
        let jpaths = jpath::resolve(filename, &config.jpaths, config.resolve_paths_with_tanka);
        let mut evaluator = self.factory.evaluator(&jpaths);
        evaluator.set_ext_vars(config.ext_vars.clone());
        evaluator
    }

    fn stdlib_functions(&self) -> &[StdFunction] {
        self.stdlib.get().map(Vec::as_slice).unwrap_or(&[])
    }

    fn filename(uri: &Url) -> String {
        uri.to_file_path()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|()| uri.path().to_string())
    }

    fn file_uri(filename: &str) -> Option<Url> {
        let path = PathBuf::from(filename);
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir().ok()?.join(path)
        };
        Url::from_file_path(absolute).ok()
    }

    fn update_document(&self, uri: Url, version: i32, text: String, old: Option<&Document>) {
        let filename = Self::filename(&uri);
        let mut doc = Document::new(uri, version, text);

        if !doc.text.is_empty() {
            let evaluator = self.evaluator_for(&filename);
            match evaluator.parse(&filename, &doc.text) {
                Ok(ast) => doc.ast = Some(ast),
                Err(err) => {
                    doc.err = Some(err.to_string());
                    if let Some(old) = old {
                        // The previous tree stays usable for positions on
                        // unchanged lines; track which lines moved under it.
                        doc.ast = old.ast.clone();
                        doc.lines_changed_since_ast =
                            changed_lines(&old.text, &doc.text, &old.lines_changed_since_ast);
                    }
                }
            }
        }

        let uri = doc.uri.clone();
        if let Err(err) = self.cache.put(doc) {
            warn!(%uri, "dropping document update: {err}");
            return;
        }
        self.diagnostics.enqueue(uri);
    }

    fn definition_locations(&self, params: &GotoDefinitionParams) -> Option<Vec<Location>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let doc = match self.cache.get(uri) {
            Ok(doc) => doc,
            Err(err) => {
                error!("definition: {ERROR_RETRIEVING_DOCUMENT}: {err}");
                return None;
            }
        };
        let Some(root) = &doc.ast else {
            error!("definition: document was never successfully parsed");
            return None;
        };

        let filename = Self::filename(uri);
        let evaluator = self.evaluator_for(&filename);
        let processor = Processor::new(self.cache.as_ref(), evaluator.as_ref());
        let position = position_protocol_to_ast(params.text_document_position_params.position);

        let ranges = match processor.resolve(root, position) {
            Ok(ranges) => ranges,
            Err(err) => {
                debug!("definition: {err}");
                return None;
            }
        };

        // Resolver order is meaningful: with `+:` composition the most
        // derived definition comes first. Keep it.
        let locations: Vec<Location> = ranges
            .into_iter()
            .filter_map(|range| {
                let target = if range.filename.is_empty() {
                    filename.clone()
                } else {
                    range.filename.clone()
                };
                Some(Location {
                    uri: Self::file_uri(&target)?,
                    range: range_ast_to_protocol(&range.selection_range),
                })
            })
            .collect();
        Some(locations)
    }

    /// The symbol under the cursor and the files that may use it: binds stay
    /// within their own file, fields may be used by any open document.
    fn reference_target(&self, doc: &Document, position: Position) -> Option<(String, Vec<String>)> {
        let filename = Self::filename(&doc.uri);
        let root = doc.ast.as_ref()?;

        let mut stack = jsonnet_analysis::find_node_by_position(
            Some(root),
            position_protocol_to_ast(position),
        )
        .ok()?;

        while let Some(node) = stack.pop() {
            match &*node {
                Expr::Local(local) => {
                    let symbol = local.binds.first()?.variable.clone();
                    return Some((symbol, vec![filename]));
                }
                Expr::DesugaredObject(object) => {
                    for field in &object.fields {
                        if range_ast_to_protocol(&field.loc).start.line != position.line {
                            continue;
                        }
                        if !matches!(&*field.name, Expr::LiteralString(_)) {
                            error!("references: field name is not a string");
                            return None;
                        }
                        let symbol = field_name_to_string(&field.name);
                        return Some((symbol, self.open_files()));
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn open_files(&self) -> Vec<String> {
        self.cache
            .uris()
            .iter()
            .map(Self::filename)
            .collect()
    }
}

#[async_trait]
impl<C: LspClient> LanguageServer for JsonnetLanguageServer<C> {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        info!(
            "initializing jsonnet-language-server version {}",
            env!("CARGO_PKG_VERSION")
        );

        let config = Configuration::from_initialization_options(params.initialization_options)
            .map_err(|err| Error {
                code: ErrorCode::InvalidParams,
                message: err.into(),
                data: None,
            })?;
        *self.config.write() = config;

        let functions = stdlib::functions().map_err(|err| Error {
            code: ErrorCode::InternalError,
            message: format!("reading stdlib: {err}").into(),
            data: None,
        })?;
        let _ = self.stdlib.set(functions);

        self.diagnostics.spawn_loop(Arc::new(self.client.clone()));

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                        ..TextDocumentSyncOptions::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string()]),
                    ..CompletionOptions::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                document_formatting_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: execute::COMMANDS.map(String::from).to_vec(),
                    ..ExecuteCommandOptions::default()
                }),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "jsonnet-language-server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        debug!("server initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.update_document(doc.uri, doc.version, doc.text, None);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let old = match self.cache.get(&uri) {
            Ok(doc) => doc,
            Err(err) => {
                error!("did_change: {ERROR_RETRIEVING_DOCUMENT}: {err}");
                return;
            }
        };

        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        if params.text_document.version <= old.version {
            return;
        }
        self.update_document(uri, params.text_document.version, change.text, Some(&old));
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.cache.remove(&params.text_document.uri);
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        // Notifications cannot answer with InvalidParams; rejected payloads
        // are logged and ignored instead.
        if let Err(err) = self.config.write().apply_settings(params.settings) {
            error!("did_change_configuration: {err}");
        }
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        Ok(self
            .definition_locations(&params)
            .filter(|locations| !locations.is_empty())
            .map(GotoDefinitionResponse::Array))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = &params.text_document_position.text_document.uri;
        let doc = match self.cache.get(uri) {
            Ok(doc) => doc,
            Err(err) => {
                error!("references: {ERROR_RETRIEVING_DOCUMENT}: {err}");
                return Ok(None);
            }
        };
        if doc.ast.is_none() {
            error!("references: document was never successfully parsed, can't find references");
            return Ok(None);
        }
        let line = params.text_document_position.position.line;
        if doc.lines_changed_since_ast.contains(&(line as usize)) {
            error!(
                "references: document line {line} was changed since last successful parse, can't find references"
            );
            return Ok(None);
        }

        let Some((symbol, files)) =
            self.reference_target(&doc, params.text_document_position.position)
        else {
            return Ok(None);
        };

        let filename = Self::filename(uri);
        let evaluator = self.evaluator_for(&filename);
        let processor = Processor::new(self.cache.as_ref(), evaluator.as_ref());
        let ranges = match processor.find_usages(&files, &symbol) {
            Ok(ranges) => ranges,
            Err(err) => {
                error!("references: {err}");
                return Ok(None);
            }
        };

        let locations: Vec<Location> = ranges
            .into_iter()
            .filter_map(|range| {
                Some(Location {
                    uri: Self::file_uri(&range.filename)?,
                    range: range_ast_to_protocol(&range.selection_range),
                })
            })
            .collect();
        Ok(Some(locations))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let doc = match self.cache.get(uri) {
            Ok(doc) => doc,
            Err(err) => {
                error!("hover: {ERROR_RETRIEVING_DOCUMENT}: {err}");
                return Ok(None);
            }
        };
        if doc.err.is_some() {
            // Hover triggers often; a parse error here is only noise.
            error!("hover: {ERROR_PARSING_DOCUMENT}");
            return Ok(None);
        }
        let Some(root) = &doc.ast else {
            return Ok(None);
        };

        Ok(hover::hover(
            &doc.text,
            root,
            self.stdlib_functions(),
            params.text_document_position_params.position,
        ))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let doc = match self.cache.get(uri) {
            Ok(doc) => doc,
            Err(err) => {
                error!("completion: {ERROR_RETRIEVING_DOCUMENT}: {err}");
                return Ok(None);
            }
        };

        let filename = Self::filename(uri);
        let evaluator = self.evaluator_for(&filename);
        let processor = Processor::new(self.cache.as_ref(), evaluator.as_ref());
        let items = completion::completion_items(
            &doc.text,
            doc.ast.as_ref(),
            &processor,
            self.stdlib_functions(),
            params.text_document_position.position,
        );

        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: false,
            items,
        })))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let doc = match self.cache.get(&params.text_document.uri) {
            Ok(doc) => doc,
            Err(err) => {
                error!("document_symbol: {ERROR_RETRIEVING_DOCUMENT}: {err}");
                return Ok(None);
            }
        };
        if doc.err.is_some() {
            // Failing outright on every keystroke can get the server killed
            // by the client; logging is enough.
            error!("document_symbol: {ERROR_PARSING_DOCUMENT}");
            return Ok(None);
        }
        let Some(root) = &doc.ast else {
            return Ok(None);
        };

        Ok(Some(DocumentSymbolResponse::Nested(
            symbols::document_symbols(root),
        )))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let uri = &params.text_document.uri;
        let doc = match self.cache.get(uri) {
            Ok(doc) => doc,
            Err(err) => {
                error!("formatting: {ERROR_RETRIEVING_DOCUMENT}: {err}");
                return Ok(None);
            }
        };

        let filename = Self::filename(uri);
        let evaluator = self.evaluator_for(&filename);
        let options = self.config.read().formatting.clone();
        let formatted = match evaluator.format_file(&filename, &doc.text, &options) {
            Ok(formatted) => formatted,
            Err(err) => {
                error!("error formatting document: {err}");
                return Ok(None);
            }
        };

        Ok(Some(formatting::text_edits(&doc.text, &formatted)))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        let filename = params
            .arguments
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let evaluator = self.evaluator_for(&filename);

        execute::run_command(
            &params.command,
            &params.arguments,
            self.cache.as_ref(),
            evaluator.as_ref(),
        )
        .map(Some)
        .map_err(|err| Error {
            code: ErrorCode::InternalError,
            message: err.into(),
            data: None,
        })
    }
}

/// Zero-indexed lines of `new_text` that differ from `old_text`, merged with
/// the lines already known dirty.
fn changed_lines(old_text: &str, new_text: &str, already_dirty: &HashSet<usize>) -> HashSet<usize> {
    let mut dirty = already_dirty.clone();
    let new_lines: Vec<&str> = new_text.split('\n').collect();
    for (index, old_line) in old_text.split('\n').enumerate() {
        if new_lines.get(index).copied() != Some(old_line) {
            dirty.insert(index);
        }
    }
    for index in old_text.split('\n').count()..new_lines.len() {
        dirty.insert(index);
    }
    dirty
}
