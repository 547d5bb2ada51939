//! Document outline built from binds and object fields.

use jsonnet_analysis::ast::{Expr, FieldHide};
use jsonnet_analysis::position::range_ast_to_protocol;
use jsonnet_analysis::resolver::{bind_to_range, field_to_range};
use jsonnet_analysis::Node;
use tower_lsp::lsp_types::{DocumentSymbol, SymbolKind};

/// Builds the hierarchical symbol tree for a parsed document.
pub fn document_symbols(root: &Node) -> Vec<DocumentSymbol> {
    build_symbols(root)
}

#[allow(deprecated)]
fn build_symbols(node: &Node) -> Vec<DocumentSymbol> {
    let mut symbols = Vec::new();

    match &**node {
        Expr::Binary(binary) => {
            symbols.extend(build_symbols(&binary.left));
            symbols.extend(build_symbols(&binary.right));
        }
        Expr::Local(local) => {
            for bind in &local.binds {
                let object_range = bind_to_range(bind);
                symbols.push(DocumentSymbol {
                    name: bind.variable.clone(),
                    detail: Some(symbol_details(&bind.body)),
                    kind: SymbolKind::VARIABLE,
                    tags: None,
                    deprecated: None,
                    range: range_ast_to_protocol(&object_range.full_range),
                    selection_range: range_ast_to_protocol(&object_range.selection_range),
                    children: None,
                });
            }
            symbols.extend(build_symbols(&local.body));
        }
        Expr::DesugaredObject(object) => {
            for field in &object.fields {
                let kind = if field.hide == FieldHide::Hidden {
                    SymbolKind::PROPERTY
                } else {
                    SymbolKind::FIELD
                };
                let field_range = field_to_range(field);
                let children = build_symbols(&field.body);
                symbols.push(DocumentSymbol {
                    name: field_range.field_name,
                    detail: Some(symbol_details(&field.body)),
                    kind,
                    tags: None,
                    deprecated: None,
                    range: range_ast_to_protocol(&field_range.full_range),
                    selection_range: range_ast_to_protocol(&field_range.selection_range),
                    children: if children.is_empty() {
                        None
                    } else {
                        Some(children)
                    },
                });
            }
        }
        _ => {}
    }

    symbols
}

fn symbol_details(node: &Node) -> String {
    match &**node {
        Expr::Function(function) => {
            let args: Vec<&str> = function
                .parameters
                .iter()
                .map(|param| param.name.as_str())
                .collect();
            format!("Function({})", args.join(", "))
        }
        Expr::DesugaredObject(_) => "Object".to_string(),
        Expr::LiteralString(_) => "String".to_string(),
        Expr::LiteralNumber(_) => "Number".to_string(),
        Expr::LiteralBoolean(_) => "Boolean".to_string(),
        Expr::Import(import) | Expr::ImportStr(import) => format!("Import {}", import.file),
        Expr::Index(_) => String::new(),
        other => other.type_name().to_string(),
    }
}
