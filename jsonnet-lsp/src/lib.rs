//! Language Server Protocol (LSP) implementation for Jsonnet
//!
//!     This crate provides language server capabilities for Jsonnet, enabling rich editor
//!     support in any LSP-compatible editor (VSCode, Neovim, Emacs, Sublime, etc.).
//!
//! Architecture
//!
//!     The server follows a layered architecture:
//!
//!     LSP Layer (tower-lsp):
//!         - Handles JSON-RPC communication
//!         - Protocol handshaking and capability negotiation
//!         - Request/response routing
//!
//!     Server Layer (server module):
//!         - Implements the LanguageServer trait
//!         - Manages document state through the jsonnet-analysis cache
//!         - Coordinates feature implementations and background diagnostics
//!         - Thin, mostly calls into the feature layer over jsonnet-analysis
//!
//!     Feature Layer (features module):
//!         - Each feature operates on the desugared Jsonnet AST
//!         - Stateless transformations where possible
//!         - All logic and dense unit tests
//!
//! Feature Set
//!
//!     1. Go to Definition / Find References (textDocument/definition, textDocument/references):
//!         - Jump from a variable or field access to where it is defined,
//!           across imports and through self/super/$ and object merges
//!         - Find usages of a local bind or object field in open documents
//!
//!     2. Hover (textDocument/hover):
//!         - Signature and documentation for std library functions
//!
//!     3. Completion (textDocument/completion):
//!         - std library members after `std.`
//!         - In-scope locals and reachable object fields after a dotted path
//!
//!     4. Document Symbols (textDocument/documentSymbol):
//!         - Hierarchical outline of locals and object fields
//!
//!     5. Formatting (textDocument/formatting):
//!         - Minimal line-based edits diffed against the canonical formatter output
//!
//!     6. Diagnostics (textDocument/publishDiagnostics):
//!         - Parse errors, evaluation errors, and optional lint findings,
//!           published from a background loop
//!
//!     7. Commands (workspace/executeCommand):
//!         - jsonnet.evalFile, jsonnet.evalExpression, jsonnet.evalItem
//!
//! Usage
//!
//!     The server is generic over an [`jsonnet_analysis::EvaluatorFactory`], which supplies
//!     the parsing, evaluation, linting, and formatting frontend. Embedders hand one to
//!     [`serve_stdio`] to run the server over stdin/stdout:
//!
//!     ```rust,ignore
//!     jsonnet_lsp::serve_stdio(factory).await;
//!     ```

use std::sync::Arc;

use jsonnet_analysis::EvaluatorFactory;
use tower_lsp::{LspService, Server};

pub mod config;
pub mod diagnostics;
pub mod features;
pub mod jpath;
pub mod server;
pub mod stdlib;

pub use server::JsonnetLanguageServer;

/// Runs the language server over stdin/stdout until the client disconnects.
pub async fn serve_stdio(factory: Arc<dyn EvaluatorFactory>) {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) =
        LspService::new(|client| JsonnetLanguageServer::new(client, factory));
    Server::new(stdin, stdout, socket).serve(service).await;
}
