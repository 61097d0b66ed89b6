//! Mesh language server over stdio.
//!
//! Maintains a `DocumentState` (source, parse, typeck, line index) per
//! open file, refreshed on open/change, and answers completion,
//! signature help, hover, definition, and document symbols from it.
//! Diagnostics from all three front-end passes publish on every change.

use std::collections::HashMap;
use std::sync::RwLock;

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::info;

mod completion;
mod navigation;
mod offset;
mod signature;

use mesh_common::LineIndex;
use offset::{position_to_offset, span_to_range};

/// State for a single open document.
struct DocumentState {
    source: String,
    parse: mesh_parser::Parse,
    typeck: mesh_typeck::TypeckResult,
    line_index: LineIndex,
}

impl DocumentState {
    fn new(source: String) -> Self {
        let parse = mesh_parser::parse(&source);
        let typeck = mesh_typeck::check(&parse);
        let line_index = LineIndex::new(&source);
        DocumentState {
            source,
            parse,
            typeck,
            line_index,
        }
    }

    fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for lex_error in self.parse.lex_errors() {
            out.push(self.diagnostic("E0000", lex_error.message().to_string(), lex_error.span));
        }
        for parse_error in self.parse.errors() {
            out.push(self.diagnostic("E0001", parse_error.message(), parse_error.span));
        }
        for error in &self.typeck.errors {
            let mut message = error.message();
            if let Some(help) = error.help() {
                message.push_str("\nhelp: ");
                message.push_str(&help);
            }
            out.push(self.diagnostic(error.code(), message, error.span()));
        }
        out
    }

    fn diagnostic(
        &self,
        code: &'static str,
        message: String,
        span: mesh_common::Span,
    ) -> Diagnostic {
        Diagnostic {
            range: span_to_range(&self.source, &self.line_index, span),
            severity: Some(DiagnosticSeverity::ERROR),
            code: Some(NumberOrString::String(code.to_string())),
            source: Some("mesh".to_string()),
            message,
            ..Diagnostic::default()
        }
    }
}

struct MeshLanguageServer {
    client: Client,
    documents: RwLock<HashMap<Url, DocumentState>>,
}

impl MeshLanguageServer {
    fn new(client: Client) -> Self {
        MeshLanguageServer {
            client,
            documents: RwLock::new(HashMap::new()),
        }
    }

    async fn update_document(&self, uri: Url, source: String) {
        let state = DocumentState::new(source);
        let diagnostics = state.diagnostics();
        if let Ok(mut docs) = self.documents.write() {
            docs.insert(uri.clone(), state);
        }
        self.client
            .publish_diagnostics(uri, diagnostics, None)
            .await;
    }

    fn with_document<T>(
        &self,
        uri: &Url,
        f: impl FnOnce(&DocumentState) -> Option<T>,
    ) -> Option<T> {
        let docs = self.documents.read().ok()?;
        let state = docs.get(uri)?;
        f(state)
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for MeshLanguageServer {
    async fn initialize(&self, _params: InitializeParams) -> Result<InitializeResult> {
        info!("mesh-lsp initializing");
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: None,
                    ..CompletionOptions::default()
                }),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "mesh-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("mesh-lsp initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.update_document(params.text_document.uri, params.text_document.text)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // Full sync: the last change carries the whole document.
        if let Some(change) = params.content_changes.into_iter().last() {
            self.update_document(params.text_document.uri, change.text)
                .await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        if let Ok(mut docs) = self.documents.write() {
            docs.remove(&params.text_document.uri);
        }
        self.client
            .publish_diagnostics(params.text_document.uri, Vec::new(), None)
            .await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let items = self.with_document(&uri, |doc| {
            let offset = position_to_offset(&doc.source, &doc.line_index, position);
            Some(completion::completions(&doc.parse, offset))
        });
        Ok(items.map(CompletionResponse::Array))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let help = self.with_document(&uri, |doc| {
            let offset = position_to_offset(&doc.source, &doc.line_index, position);
            signature::signature_help(&doc.parse, &doc.typeck, offset)
        });
        Ok(help)
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let hover = self.with_document(&uri, |doc| {
            let offset = position_to_offset(&doc.source, &doc.line_index, position);
            navigation::hover(&doc.parse, &doc.typeck, &doc.source, &doc.line_index, offset)
        });
        Ok(hover)
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let location = self.with_document(&uri, |doc| {
            let offset = position_to_offset(&doc.source, &doc.line_index, position);
            navigation::definition(&doc.parse, &doc.source, &doc.line_index, offset)
                .map(|range| Location::new(uri.clone(), range))
        });
        Ok(location.map(GotoDefinitionResponse::Scalar))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let symbols = self.with_document(&params.text_document.uri, |doc| {
            Some(navigation::document_symbols(
                &doc.parse,
                &doc.source,
                &doc.line_index,
            ))
        });
        Ok(symbols.map(DocumentSymbolResponse::Nested))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(MeshLanguageServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
