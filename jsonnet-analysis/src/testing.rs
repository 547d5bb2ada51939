//! Builders for hand-assembled desugared ASTs and an in-memory evaluator,
//! for use in tests here and in downstream crates (via the `test-support`
//! feature). Locations are spelled exactly as the evaluator would report
//! them: one-indexed, end column exclusive.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{
    Apply, Array, Binary, BinaryOp, Bind, Conditional, DesugaredObject, Expr, Field, FieldHide,
    Function, Import, Index, LiteralNumber, LiteralString, LocRange, Local, Location, Node, Param,
    SelfExpr, SuperIndex, Var,
};
use crate::error::{AnalysisError, Result};
use crate::evaluator::{Evaluator, EvaluatorFactory, FormatOptions};

pub fn loc(file: &str, begin_line: usize, begin_col: usize, end_line: usize, end_col: usize) -> LocRange {
    LocRange::new(
        file,
        Location::new(begin_line, begin_col),
        Location::new(end_line, end_col),
    )
}

/// An unset range, as the evaluator emits for synthesized nodes.
pub fn no_loc(file: &str) -> LocRange {
    LocRange::new(file, Location::default(), Location::default())
}

pub fn var(id: &str, loc: LocRange) -> Node {
    Arc::new(Expr::Var(Var {
        loc,
        id: id.to_string(),
    }))
}

pub fn lit_str_node(value: &str, loc: LocRange) -> Node {
    Arc::new(Expr::LiteralString(LiteralString {
        loc,
        value: value.to_string(),
    }))
}

pub fn lit_num(original: &str, loc: LocRange) -> Node {
    Arc::new(Expr::LiteralNumber(LiteralNumber {
        loc,
        original: original.to_string(),
    }))
}

pub fn self_node(loc: LocRange) -> Node {
    Arc::new(Expr::SelfExpr(SelfExpr { loc }))
}

pub fn super_index(index: Node, loc: LocRange) -> Node {
    Arc::new(Expr::SuperIndex(SuperIndex { loc, index }))
}

pub fn index(target: Node, index: Node, loc: LocRange) -> Node {
    Arc::new(Expr::Index(Index { loc, target, index }))
}

pub fn import_node(file: &str, loc: LocRange) -> Node {
    Arc::new(Expr::Import(Import {
        loc,
        file: file.to_string(),
    }))
}

pub fn binary_plus(left: Node, right: Node, loc: LocRange) -> Node {
    Arc::new(Expr::Binary(Binary {
        loc,
        op: BinaryOp::Plus,
        left,
        right,
    }))
}

pub fn local(binds: Vec<Bind>, body: Node, loc: LocRange) -> Node {
    Arc::new(Expr::Local(Local { loc, binds, body }))
}

pub fn bind(variable: &str, body: Node, loc: LocRange) -> Bind {
    Bind {
        variable: variable.to_string(),
        body,
        loc,
    }
}

/// A visible field. The name literal spans just the name, starting at the
/// field's begin, the way the evaluator reports it.
pub fn field(name: &str, body: Node, loc: LocRange) -> Field {
    let name_loc = LocRange::new(
        loc.file.clone(),
        loc.begin,
        Location::new(loc.begin.line, loc.begin.column + name.len()),
    );
    Field {
        name: lit_str_node(name, name_loc),
        body,
        hide: FieldHide::Visible,
        plus_super: false,
        loc,
    }
}

/// A `+:` field.
pub fn field_plus(name: &str, body: Node, loc: LocRange) -> Field {
    Field {
        plus_super: true,
        ..field(name, body, loc)
    }
}

/// A `::` field.
pub fn field_hidden(name: &str, body: Node, loc: LocRange) -> Field {
    Field {
        hide: FieldHide::Hidden,
        ..field(name, body, loc)
    }
}

pub fn obj(fields: Vec<Field>, locals: Vec<Bind>, loc: LocRange) -> Node {
    Arc::new(Expr::DesugaredObject(DesugaredObject {
        loc,
        fields,
        locals,
        asserts: Vec::new(),
    }))
}

pub fn array(elements: Vec<Node>, loc: LocRange) -> Node {
    Arc::new(Expr::Array(Array { loc, elements }))
}

pub fn param(name: &str, loc: LocRange) -> Param {
    Param {
        name: name.to_string(),
        default_arg: None,
        loc,
    }
}

pub fn func(parameters: Vec<Param>, body: Node, loc: LocRange) -> Node {
    Arc::new(Expr::Function(Function {
        loc,
        parameters,
        body,
    }))
}

pub fn apply(target: Node, positional: Vec<Node>, loc: LocRange) -> Node {
    Arc::new(Expr::Apply(Apply {
        loc,
        target,
        positional,
        named: Vec::new(),
    }))
}

pub fn conditional(cond: Node, branch_true: Node, branch_false: Node, loc: LocRange) -> Node {
    Arc::new(Expr::Conditional(Conditional {
        loc,
        cond,
        branch_true,
        branch_false,
    }))
}

/// Obj node alias used where the call site reads better with the suffix.
pub fn obj_node(fields: Vec<Field>, locals: Vec<Bind>, loc: LocRange) -> Node {
    obj(fields, locals, loc)
}

/// In-memory [`Evaluator`] over a fixed set of pre-desugared files.
///
/// `parse` and `import_ast` look files up by name; formatting and
/// evaluation return canned outputs. Enough to exercise the resolver's
/// cross-file paths without a real Jsonnet frontend.
#[derive(Default, Clone)]
pub struct StaticEvaluator {
    files: HashMap<String, Node>,
    format_results: HashMap<String, String>,
    eval_results: HashMap<String, Result<String>>,
    lint_output: String,
    ext_vars: HashMap<String, String>,
}

impl StaticEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, filename: &str, root: Node) -> Self {
        self.files.insert(filename.to_string(), root);
        self
    }

    pub fn with_format_result(mut self, filename: &str, formatted: &str) -> Self {
        self.format_results
            .insert(filename.to_string(), formatted.to_string());
        self
    }

    pub fn with_eval_result(mut self, filename: &str, result: Result<String>) -> Self {
        self.eval_results.insert(filename.to_string(), result);
        self
    }

    pub fn with_lint_output(mut self, output: &str) -> Self {
        self.lint_output = output.to_string();
        self
    }

    pub fn ext_vars(&self) -> &HashMap<String, String> {
        &self.ext_vars
    }

    fn lookup(&self, filename: &str) -> Result<Node> {
        self.files
            .get(filename)
            .cloned()
            .ok_or_else(|| AnalysisError::External(format!("no such file: {filename}")))
    }
}

impl Evaluator for StaticEvaluator {
    fn parse(&self, filename: &str, _text: &str) -> Result<Node> {
        self.lookup(filename)
    }

    fn import_ast(&self, _imported_from: &str, filename: &str) -> Result<(Node, String)> {
        Ok((self.lookup(filename)?, filename.to_string()))
    }

    fn resolve_import(&self, _imported_from: &str, filename: &str) -> Result<String> {
        if self.files.contains_key(filename) {
            Ok(filename.to_string())
        } else {
            Err(AnalysisError::External(format!(
                "couldn't open import: {filename}"
            )))
        }
    }

    fn evaluate_anonymous_snippet(&self, filename: &str, _text: &str) -> Result<String> {
        self.eval_results
            .get(filename)
            .cloned()
            .unwrap_or_else(|| Ok("{ }".to_string()))
    }

    fn lint_snippet(&self, _filename: &str, _text: &str) -> String {
        self.lint_output.clone()
    }

    fn format_file(&self, filename: &str, text: &str, _options: &FormatOptions) -> Result<String> {
        Ok(self
            .format_results
            .get(filename)
            .cloned()
            .unwrap_or_else(|| text.to_string()))
    }

    fn set_ext_vars(&mut self, vars: HashMap<String, String>) {
        self.ext_vars = vars;
    }

    fn reset_ext_vars(&mut self) {
        self.ext_vars.clear();
    }
}

/// Factory handing out clones of one [`StaticEvaluator`], ignoring jpaths.
#[derive(Default, Clone)]
pub struct StaticEvaluatorFactory {
    evaluator: StaticEvaluator,
}

impl StaticEvaluatorFactory {
    pub fn new(evaluator: StaticEvaluator) -> Self {
        Self { evaluator }
    }
}

impl EvaluatorFactory for StaticEvaluatorFactory {
    fn evaluator(&self, _jpaths: &[String]) -> Box<dyn Evaluator> {
        Box::new(self.evaluator.clone())
    }
}
