//! Completion over stdlib functions, local bindings, and object fields.

use std::collections::HashSet;

use jsonnet_analysis::ast::Expr;
use jsonnet_analysis::position::position_protocol_to_ast;
use jsonnet_analysis::{find_node_by_position, Node, ObjectRange, Processor};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionItemLabelDetails, CompletionTextEdit,
    Documentation, MarkupContent, MarkupKind, Position, Range, TextEdit,
};
use tracing::error;

use crate::stdlib::StdFunction;

/// All completion items for `position`. The text before the cursor decides
/// the strategy: a `std.` prefix completes against the embedded stdlib,
/// a bare word completes local bindings, and a dotted path is resolved to
/// object fields.
pub fn completion_items(
    text: &str,
    ast: Option<&Node>,
    processor: &Processor<'_>,
    stdlib: &[StdFunction],
    position: Position,
) -> Vec<CompletionItem> {
    let line = completion_line(text, position);

    let std_items = complete_std_lib(&line, stdlib);
    if !std_items.is_empty() {
        return std_items;
    }

    let Some(root) = ast else {
        error!("completion: document was never successfully parsed, can't autocomplete");
        return Vec::new();
    };

    let stack = match find_node_by_position(Some(root), position_protocol_to_ast(position)) {
        Ok(stack) => stack,
        Err(err) => {
            error!("completion: error computing node: {err}");
            return Vec::new();
        }
    };

    complete_from_stack(&line, stack, processor, position)
}

/// The cursor's line, truncated at the cursor.
fn completion_line(text: &str, position: Position) -> String {
    let line = text.lines().nth(position.line as usize).unwrap_or("");
    line.chars().take(position.character as usize).collect()
}

fn complete_from_stack(
    line: &str,
    mut stack: jsonnet_analysis::NodeStack,
    processor: &Processor<'_>,
    position: Position,
) -> Vec<CompletionItem> {
    let last_word = line
        .rsplit(' ')
        .next()
        .unwrap_or("")
        .trim_end_matches([',', ';']);
    let indexes: Vec<String> = last_word.split('.').map(str::to_string).collect();

    if indexes.len() == 1 {
        // A bare word completes against local bindings in scope.
        let mut items = Vec::new();
        while let Some(node) = stack.pop() {
            if let Expr::Local(local) = &*node {
                for bind in &local.binds {
                    if !bind.variable.starts_with(&indexes[0]) {
                        continue;
                    }
                    items.push(completion_item(
                        &bind.variable,
                        "",
                        CompletionItemKind::VARIABLE,
                        &bind.body,
                        position,
                    ));
                }
            }
        }
        return items;
    }

    let ranges = match processor.find_ranges_from_index_list(&mut stack, &indexes, true) {
        Ok(ranges) => ranges,
        Err(err) => {
            error!("completion: error finding ranges: {err}");
            return Vec::new();
        }
    };

    let completion_prefix = indexes[..indexes.len() - 1].join(".");
    items_from_ranges(&ranges, &completion_prefix, line, position)
}

fn complete_std_lib(line: &str, stdlib: &[StdFunction]) -> Vec<CompletionItem> {
    let Some(std_index) = line.rfind("std.") else {
        return Vec::new();
    };
    let user_input = &line[std_index + 4..];
    let find_name = user_input.to_lowercase();

    let mut starts_with = Vec::new();
    let mut contains = Vec::new();
    for f in stdlib {
        if f.name == user_input {
            break;
        }
        let lower_name = f.name.to_lowercase();
        let item = CompletionItem {
            label: f.name.clone(),
            kind: Some(CompletionItemKind::FUNCTION),
            detail: Some(f.signature()),
            insert_text: Some(f.signature().replace("std.", "")),
            documentation: Some(Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: f.markdown_description.clone(),
            })),
            ..CompletionItem::default()
        };

        if !find_name.is_empty() && lower_name.starts_with(&find_name) {
            starts_with.push(item);
            continue;
        }
        if lower_name.contains(&find_name) {
            contains.push(item);
        }
    }

    starts_with.extend(contains);
    starts_with
}

fn items_from_ranges(
    ranges: &[ObjectRange],
    completion_prefix: &str,
    current_line: &str,
    position: Position,
) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    let mut labels: HashSet<&str> = HashSet::new();

    for field in ranges {
        let label = field.field_name.as_str();

        let Some(node) = &field.node else { continue };
        if labels.contains(label) {
            continue;
        }
        // The field being typed must not complete to itself.
        if completion_prefix == "self" && current_line.contains(&format!("{label}:")) {
            continue;
        }

        items.push(completion_item(
            label,
            completion_prefix,
            CompletionItemKind::FIELD,
            node,
            position,
        ));
        labels.insert(label);
    }

    items.sort_by(|a, b| a.label.cmp(&b.label));
    items
}

fn completion_item(
    label: &str,
    prefix: &str,
    kind: CompletionItemKind,
    body: &Node,
    position: Position,
) -> CompletionItem {
    let quote_label = !is_valid_identifier(label);

    let mut insert_text = label.to_string();
    let mut detail = if prefix.is_empty() {
        label.to_string()
    } else {
        format!("{prefix}.{label}")
    };
    if quote_label {
        insert_text = format!("['{label}']");
        detail = format!("{prefix}{insert_text}");
    }

    let mut kind = kind;
    if let Expr::Function(function) = &**body {
        kind = CompletionItemKind::FUNCTION;
        let params: Vec<&str> = function
            .parameters
            .iter()
            .map(|param| param.name.as_str())
            .collect();
        let params_string = format!("({})", params.join(", "));
        detail.push_str(&params_string);
        insert_text.push_str(&params_string);
    }

    // Quoted labels also replace the `.` just typed before the cursor.
    let text_edit = quote_label.then(|| {
        CompletionTextEdit::Edit(TextEdit {
            range: Range {
                start: Position {
                    line: position.line,
                    character: position.character.saturating_sub(1),
                },
                end: position,
            },
            new_text: insert_text.clone(),
        })
    });

    CompletionItem {
        label: label.to_string(),
        detail: Some(detail),
        kind: Some(kind),
        label_details: Some(CompletionItemLabelDetails {
            detail: None,
            description: Some(type_to_string(body).to_string()),
        }),
        insert_text: Some(insert_text),
        text_edit,
        ..CompletionItem::default()
    }
}

fn is_valid_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn type_to_string(node: &Expr) -> &'static str {
    match node {
        Expr::Array(_) => "array",
        Expr::LiteralBoolean(_) => "boolean",
        Expr::Function(_) => "function",
        Expr::LiteralNull(_) => "null",
        Expr::LiteralNumber(_) => "number",
        Expr::DesugaredObject(_) => "object",
        Expr::LiteralString(_) => "string",
        Expr::Import(_) | Expr::ImportStr(_) => "import",
        Expr::Index(_) => "object field",
        other => other.type_name(),
    }
}
