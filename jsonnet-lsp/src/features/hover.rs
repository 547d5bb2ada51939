//! Hover documentation for stdlib calls.

use jsonnet_analysis::ast::Expr;
use jsonnet_analysis::position::position_protocol_to_ast;
use jsonnet_analysis::{find_node_by_position, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Range};
use tracing::debug;

use crate::stdlib::StdFunction;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

fn first_word(text: &str) -> &str {
    WORD_RE.find(text).map(|m| m.as_str()).unwrap_or("")
}

/// Hover content for `position`. Only `std.<fn>` accesses produce anything;
/// everything else in Jsonnet is better served by go-to-definition.
pub fn hover(
    text: &str,
    ast: &Node,
    stdlib: &[StdFunction],
    position: Position,
) -> Option<Hover> {
    let stack = find_node_by_position(Some(ast), position_protocol_to_ast(position)).ok()?;
    let mut stack = stack;
    let Some(node) = stack.pop() else {
        debug!("hover: empty stack");
        return None;
    };

    if !matches!(&*node, Expr::Index(_) | Expr::Var(_)) {
        return None;
    }

    let line_index = node.loc().begin.line.checked_sub(1)?;
    let start_index = node.loc().begin.column.checked_sub(1)?;
    let line = text.lines().nth(line_index)?;
    if !line.get(start_index..)?.starts_with("std") {
        return None;
    }

    let function_name_index = start_index + 4;
    let function_name = first_word(line.get(function_name_index..)?);
    let function = stdlib.iter().find(|f| f.name == function_name)?;

    Some(Hover {
        range: Some(Range {
            start: Position::new(line_index as u32, start_index as u32),
            end: Position::new(
                line_index as u32,
                (function_name_index + function_name.len()) as u32,
            ),
        }),
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: match &function.available_since {
                Some(version) => format!(
                    "`{}`\n\n{}\n\n*Available since jsonnet {version}.*",
                    function.signature(),
                    function.markdown_description
                ),
                None => {
                    format!("`{}`\n\n{}", function.signature(), function.markdown_description)
                }
            },
        }),
    })
}
