//! The desugared Jsonnet AST.
//!
//! The evaluator hands us trees in which all syntactic sugar (string field
//! shorthand, object comprehensions, `function` shorthand) has already been
//! lowered to the small core below. Nodes are immutable and shared between
//! caches with `Arc`, so walking the same file twice never reparses it.

use std::fmt;
use std::sync::Arc;

/// Identifier as it appears in source.
pub type Id = String;

/// Shared, immutable reference to an expression node.
pub type Node = Arc<Expr>;

/// One-indexed source position. `(0, 0)` means "unset", matching the
/// sentinel the evaluator emits for synthesized nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn is_set(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One-indexed source span with the file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocRange {
    pub file: String,
    pub begin: Location,
    pub end: Location,
}

impl LocRange {
    pub fn new(file: impl Into<String>, begin: Location, end: Location) -> Self {
        Self {
            file: file.into(),
            begin,
            end,
        }
    }

    pub fn is_set(&self) -> bool {
        self.begin.is_set()
    }
}

/// Field visibility in an object (`:`, `::`, or inherited from `super`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldHide {
    Visible,
    Hidden,
    Inherit,
}

/// A single field of a [`DesugaredObject`]. Field names are expressions;
/// after desugaring they are almost always literal strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Node,
    pub body: Node,
    pub hide: FieldHide,
    /// `true` for fields declared with `+:`, which compose with the
    /// same-named field from `super`.
    pub plus_super: bool,
    pub loc: LocRange,
}

/// A name-to-expression association in a `local` block or an object's locals.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub variable: Id,
    pub body: Node,
    pub loc: LocRange,
}

/// A function parameter, possibly with a default argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Id,
    pub default_arg: Option<Node>,
    pub loc: LocRange,
}

/// A named argument at a call site.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArg {
    pub name: Id,
    pub arg: Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Mult,
    Div,
    Percent,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    BitwiseNot,
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Apply {
    pub loc: LocRange,
    pub target: Node,
    pub positional: Vec<Node>,
    pub named: Vec<NamedArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub loc: LocRange,
    pub elements: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub loc: LocRange,
    pub op: BinaryOp,
    pub left: Node,
    pub right: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub loc: LocRange,
    pub cond: Node,
    pub branch_true: Node,
    pub branch_false: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesugaredObject {
    pub loc: LocRange,
    pub fields: Vec<Field>,
    pub locals: Vec<Bind>,
    pub asserts: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorExpr {
    pub loc: LocRange,
    pub expr: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub loc: LocRange,
    pub parameters: Vec<Param>,
    pub body: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub loc: LocRange,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub loc: LocRange,
    pub target: Node,
    pub index: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InSuper {
    pub loc: LocRange,
    pub index: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralBoolean {
    pub loc: LocRange,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNull {
    pub loc: LocRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNumber {
    pub loc: LocRange,
    pub original: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralString {
    pub loc: LocRange,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub loc: LocRange,
    pub binds: Vec<Bind>,
    pub body: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelfExpr {
    pub loc: LocRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperIndex {
    pub loc: LocRange,
    pub index: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub loc: LocRange,
    pub op: UnaryOp,
    pub expr: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub loc: LocRange,
    pub id: Id,
}

/// The desugared expression sum. One arm per core form; walks that do not
/// care about an arm ignore it.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Apply(Apply),
    Array(Array),
    Binary(Binary),
    Conditional(Conditional),
    DesugaredObject(DesugaredObject),
    Error(ErrorExpr),
    Function(Function),
    Import(Import),
    ImportStr(Import),
    Index(Index),
    InSuper(InSuper),
    LiteralBoolean(LiteralBoolean),
    LiteralNull(LiteralNull),
    LiteralNumber(LiteralNumber),
    LiteralString(LiteralString),
    Local(Local),
    SelfExpr(SelfExpr),
    SuperIndex(SuperIndex),
    Unary(Unary),
    Var(Var),
}

impl Expr {
    pub fn loc(&self) -> &LocRange {
        match self {
            Expr::Apply(n) => &n.loc,
            Expr::Array(n) => &n.loc,
            Expr::Binary(n) => &n.loc,
            Expr::Conditional(n) => &n.loc,
            Expr::DesugaredObject(n) => &n.loc,
            Expr::Error(n) => &n.loc,
            Expr::Function(n) => &n.loc,
            Expr::Import(n) => &n.loc,
            Expr::ImportStr(n) => &n.loc,
            Expr::Index(n) => &n.loc,
            Expr::InSuper(n) => &n.loc,
            Expr::LiteralBoolean(n) => &n.loc,
            Expr::LiteralNull(n) => &n.loc,
            Expr::LiteralNumber(n) => &n.loc,
            Expr::LiteralString(n) => &n.loc,
            Expr::Local(n) => &n.loc,
            Expr::SelfExpr(n) => &n.loc,
            Expr::SuperIndex(n) => &n.loc,
            Expr::Unary(n) => &n.loc,
            Expr::Var(n) => &n.loc,
        }
    }

    /// Every direct child expression, in source order. Field names come
    /// before field bodies so that usage scans see them in the order they
    /// appear in the file.
    pub fn children(&self) -> Vec<Node> {
        match self {
            Expr::Apply(n) => {
                let mut out = vec![n.target.clone()];
                out.extend(n.positional.iter().cloned());
                out.extend(n.named.iter().map(|a| a.arg.clone()));
                out
            }
            Expr::Array(n) => n.elements.clone(),
            Expr::Binary(n) => vec![n.left.clone(), n.right.clone()],
            Expr::Conditional(n) => {
                vec![n.cond.clone(), n.branch_true.clone(), n.branch_false.clone()]
            }
            Expr::DesugaredObject(n) => {
                let mut out = Vec::new();
                for field in &n.fields {
                    out.push(field.name.clone());
                    out.push(field.body.clone());
                }
                for local in &n.locals {
                    out.push(local.body.clone());
                }
                out.extend(n.asserts.iter().cloned());
                out
            }
            Expr::Error(n) => vec![n.expr.clone()],
            Expr::Function(n) => {
                let mut out: Vec<Node> =
                    n.parameters.iter().filter_map(|p| p.default_arg.clone()).collect();
                out.push(n.body.clone());
                out
            }
            Expr::Index(n) => vec![n.target.clone(), n.index.clone()],
            Expr::InSuper(n) => vec![n.index.clone()],
            Expr::Local(n) => {
                let mut out: Vec<Node> = n.binds.iter().map(|b| b.body.clone()).collect();
                out.push(n.body.clone());
                out
            }
            Expr::SuperIndex(n) => vec![n.index.clone()],
            Expr::Unary(n) => vec![n.expr.clone()],
            Expr::Import(_)
            | Expr::ImportStr(_)
            | Expr::LiteralBoolean(_)
            | Expr::LiteralNull(_)
            | Expr::LiteralNumber(_)
            | Expr::LiteralString(_)
            | Expr::SelfExpr(_)
            | Expr::Var(_) => Vec::new(),
        }
    }

    /// Short value-kind name, as shown in completion label details.
    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::Array(_) => "array",
            Expr::LiteralBoolean(_) => "boolean",
            Expr::Function(_) => "function",
            Expr::LiteralNull(_) => "null",
            Expr::LiteralNumber(_) => "number",
            Expr::DesugaredObject(_) => "object",
            Expr::LiteralString(_) => "string",
            Expr::Import(_) | Expr::ImportStr(_) => "import",
            Expr::Index(_) => "object field",
            Expr::Apply(_) => "apply",
            Expr::Binary(_) => "binary",
            Expr::Conditional(_) => "conditional",
            Expr::Error(_) => "error",
            Expr::InSuper(_) => "in super",
            Expr::Local(_) => "local",
            Expr::SelfExpr(_) => "self",
            Expr::SuperIndex(_) => "super index",
            Expr::Unary(_) => "unary",
            Expr::Var(_) => "var",
        }
    }
}

/// Renders a field name for display. Literal strings render as-is, computed
/// names as `[target.index]`, variables by their identifier. Anything else
/// renders empty.
pub fn field_name_to_string(name: &Expr) -> String {
    match name {
        Expr::LiteralString(s) => s.value.clone(),
        Expr::Index(index) => format!(
            "[{}.{}]",
            field_name_to_string(&index.target).trim_matches(&['[', ']'][..]),
            field_name_to_string(&index.index).trim_matches(&['[', ']'][..]),
        ),
        Expr::Var(v) => v.id.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn unset_location_sentinel() {
        assert!(!Location::default().is_set());
        assert!(Location::new(1, 1).is_set());
    }

    #[test]
    fn field_names_render() {
        let l = loc("f.jsonnet", 1, 1, 1, 5);
        assert_eq!(field_name_to_string(&lit_str_node("foo", l.clone())), "foo");
        assert_eq!(field_name_to_string(&var("x", l.clone())), "x");
        let computed = Expr::Index(Index {
            loc: l.clone(),
            target: var("a", l.clone()),
            index: lit_str_node("b", l.clone()),
        });
        assert_eq!(field_name_to_string(&computed), "[a.b]");
        assert_eq!(field_name_to_string(&self_node(l)), "");
    }

    #[test]
    fn children_cover_object_fields_and_locals() {
        let l = loc("f.jsonnet", 1, 1, 3, 1);
        let object = obj(
            vec![field("a", lit_str_node("v", l.clone()), l.clone())],
            vec![bind("h", lit_str_node("w", l.clone()), l.clone())],
            l.clone(),
        );
        let kids = object.children();
        // name, body, local body
        assert_eq!(kids.len(), 3);
    }
}
