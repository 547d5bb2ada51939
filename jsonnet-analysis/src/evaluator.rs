//! Contract for the external Jsonnet frontend.
//!
//! Parsing, desugaring, evaluation, linting, and formatting all live behind
//! this trait; the resolver and the server consume it and never look at
//! concrete syntax. Implementations are injected by the embedding binary.
//! The evaluator is assumed non-reentrant: callers obtain one instance per
//! request, configured with the import roots of the file being served.

use std::collections::HashMap;

use serde::Deserialize;

use crate::ast::Node;
use crate::error::Result;

/// String quoting style the formatter should normalize to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringStyle {
    #[default]
    Double,
    Single,
    Leave,
}

/// Comment style the formatter should normalize to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStyle {
    #[default]
    Slash,
    Hash,
    Leave,
}

/// Options passed through to the formatter, opaque to the server itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatOptions {
    pub indent: usize,
    pub max_blank_lines: usize,
    pub string_style: StringStyle,
    pub comment_style: CommentStyle,
    pub pretty_field_names: bool,
    pub pad_arrays: bool,
    pub pad_objects: bool,
    pub sort_imports: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent: 2,
            max_blank_lines: 2,
            string_style: StringStyle::default(),
            comment_style: CommentStyle::default(),
            pretty_field_names: true,
            pad_arrays: false,
            pad_objects: true,
            sort_imports: true,
        }
    }
}

/// The narrow interface the resolver and the diagnostics pipeline depend on.
pub trait Evaluator: Send + Sync {
    /// Parses `text` into a desugared AST rooted at `filename`.
    fn parse(&self, filename: &str, text: &str) -> Result<Node>;

    /// Reads and parses `filename`, honoring the configured import roots.
    /// Returns the root node and the resolved path.
    fn import_ast(&self, imported_from: &str, filename: &str) -> Result<(Node, String)>;

    /// Resolves `filename` against the import roots without parsing it.
    fn resolve_import(&self, imported_from: &str, filename: &str) -> Result<String>;

    /// Evaluates a snippet to its JSON value.
    fn evaluate_anonymous_snippet(&self, filename: &str, text: &str) -> Result<String>;

    /// Runs the linter and returns its textual report (empty when clean).
    fn lint_snippet(&self, filename: &str, text: &str) -> String;

    /// Formats `text` according to `options`.
    fn format_file(&self, filename: &str, text: &str, options: &FormatOptions) -> Result<String>;

    fn set_ext_vars(&mut self, vars: HashMap<String, String>);

    fn reset_ext_vars(&mut self);
}

/// Produces per-request evaluators. The server creates one evaluator per
/// request, keyed by the root file, so a non-reentrant frontend is never
/// shared across concurrent requests.
pub trait EvaluatorFactory: Send + Sync {
    /// An evaluator whose import search path is `jpaths`.
    fn evaluator(&self, jpaths: &[String]) -> Box<dyn Evaluator>;
}
