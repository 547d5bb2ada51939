//! `workspace/executeCommand` handlers for evaluating Jsonnet from the editor.

use jsonnet_analysis::position::position_protocol_to_ast;
use jsonnet_analysis::{find_node_by_position, DocumentCache, Evaluator};
use serde_json::Value;
use tower_lsp::lsp_types::{Position, Url};

pub const EVAL_ITEM: &str = "jsonnet.evalItem";
pub const EVAL_FILE: &str = "jsonnet.evalFile";
pub const EVAL_EXPRESSION: &str = "jsonnet.evalExpression";

pub const COMMANDS: [&str; 3] = [EVAL_ITEM, EVAL_FILE, EVAL_EXPRESSION];

/// Dispatches one command. Argument layouts:
/// `evalFile(file)`, `evalExpression(file, expr)`, `evalItem(file, position)`.
pub fn run_command(
    command: &str,
    arguments: &[Value],
    cache: &DocumentCache,
    evaluator: &dyn Evaluator,
) -> Result<Value, String> {
    match command {
        EVAL_ITEM => eval_item(arguments, cache),
        EVAL_FILE => {
            let mut args = arguments.to_vec();
            args.push(Value::String(String::new()));
            eval_expression(&args, evaluator)
        }
        EVAL_EXPRESSION => eval_expression(arguments, evaluator),
        other => Err(format!("unknown command: {other}")),
    }
}

fn eval_item(arguments: &[Value], cache: &DocumentCache) -> Result<Value, String> {
    let (filename, position): (String, Position) = parse_args(arguments)?;

    let uri = Url::from_file_path(&filename)
        .map_err(|()| format!("invalid file path: {filename}"))?;
    let doc = cache
        .get(&uri)
        .map_err(|err| format!("evalItem: unable to retrieve document from the cache: {err}"))?;

    let mut stack = find_node_by_position(doc.ast.as_ref(), position_protocol_to_ast(position))
        .map_err(|err| err.to_string())?;
    let Some(node) = stack.pop() else {
        return Err(format!(
            "no node found at position {}:{}",
            position.line, position.character
        ));
    };

    // Item-level evaluation needs field-path reconstruction which is not
    // implemented yet; reporting what was found keeps the command honest.
    Err(format!("cannot evaluate {} at {:?}", node.type_name(), node.loc()))
}

fn eval_expression(arguments: &[Value], evaluator: &dyn Evaluator) -> Result<Value, String> {
    let (filename, expression): (String, String) = parse_args(arguments)?;

    let mut script = format!("local main = (import '{filename}');\nmain");
    if !expression.is_empty() {
        script.push('.');
        script.push_str(&expression);
    }

    let result = evaluator
        .evaluate_anonymous_snippet(&filename, &script)
        .map_err(|err| err.to_string())?;
    serde_json::from_str(&result).map_err(|err| format!("invalid evaluation output: {err}"))
}

fn parse_args<A, B>(arguments: &[Value]) -> Result<(A, B), String>
where
    A: serde::de::DeserializeOwned,
    B: serde::de::DeserializeOwned,
{
    if arguments.len() != 2 {
        return Err(format!("expected 2 arguments, got {}", arguments.len()));
    }
    let first = serde_json::from_value(arguments[0].clone())
        .map_err(|err| format!("failed to unmarshal first argument: {err}"))?;
    let second = serde_json::from_value(arguments[1].clone())
        .map_err(|err| format!("failed to unmarshal second argument: {err}"))?;
    Ok((first, second))
}
