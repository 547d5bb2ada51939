//! Position-to-node-stack lookup.
//!
//! Walks the tree with an explicit work stack (large ASTs would otherwise
//! blow the call stack) and collects every node whose range covers the
//! requested location, the innermost ending up on top.

use crate::ast::{Expr, LocRange, Node};
use crate::error::{AnalysisError, Result};
use crate::nodestack::NodeStack;
use crate::position::in_range;

/// Returns the stack of nodes covering `location`, innermost at top.
///
/// The stack is afterwards reordered so enclosing `DesugaredObject`s come
/// before the objects they enclose, regardless of visitation order.
pub fn find_node_by_position(root: Option<&Node>, location: crate::ast::Location) -> Result<NodeStack> {
    let root = root.ok_or_else(|| AnalysisError::InvalidInput("node is absent".to_string()))?;

    // Work items carry an optional range override: function bodies attached
    // as field values have no range of their own and inherit the field's.
    let mut work: Vec<(Node, Option<LocRange>)> = vec![(root.clone(), None)];
    let mut found = NodeStack::rooted(root.clone());

    while let Some((curr, override_loc)) = work.pop() {
        let effective = effective_range(&curr, override_loc);

        if in_range(location, &effective) {
            found.push(curr.clone());
        } else if effective.end.is_set() {
            continue;
        }

        match &*curr {
            Expr::Local(local) => {
                for bind in &local.binds {
                    work.push((bind.body.clone(), None));
                }
                work.push((local.body.clone(), None));
            }
            Expr::DesugaredObject(object) => {
                for field in &object.fields {
                    // Functions have no range; borrow the field's.
                    if matches!(*field.body, Expr::Function(_)) {
                        work.push((field.body.clone(), Some(field.loc.clone())));
                    } else {
                        work.push((field.name.clone(), None));
                        work.push((field.body.clone(), None));
                    }
                }
                for local in &object.locals {
                    work.push((local.body.clone(), None));
                }
                for assert in &object.asserts {
                    work.push((assert.clone(), None));
                }
            }
            Expr::Binary(binary) => {
                work.push((binary.left.clone(), None));
                work.push((binary.right.clone(), None));
            }
            Expr::Array(array) => {
                for element in &array.elements {
                    work.push((element.clone(), None));
                }
            }
            Expr::Apply(apply) => {
                for arg in &apply.positional {
                    work.push((arg.clone(), None));
                }
                for named in &apply.named {
                    work.push((named.arg.clone(), None));
                }
                work.push((apply.target.clone(), None));
            }
            Expr::Conditional(conditional) => {
                work.push((conditional.cond.clone(), None));
                work.push((conditional.branch_true.clone(), None));
                work.push((conditional.branch_false.clone(), None));
            }
            Expr::Error(error) => {
                work.push((error.expr.clone(), None));
            }
            Expr::Function(function) => {
                for param in &function.parameters {
                    if let Some(default_arg) = &param.default_arg {
                        work.push((default_arg.clone(), None));
                    }
                }
                work.push((function.body.clone(), None));
            }
            Expr::Index(idx) => {
                work.push((idx.target.clone(), None));
                work.push((idx.index.clone(), None));
            }
            Expr::InSuper(in_super) => {
                work.push((in_super.index.clone(), None));
            }
            Expr::SuperIndex(super_index) => {
                work.push((super_index.index.clone(), None));
            }
            Expr::Unary(unary) => {
                work.push((unary.expr.clone(), None));
            }
            _ => {}
        }
    }

    found.reorder_desugared_objects();
    Ok(found)
}

/// The range to test against, after overrides and the `SuperIndex` fixup.
///
/// A `SuperIndex` only spans `super` itself, not the `.key` after it (this
/// happens when super carries exactly one index; `super.foo.bar` is fine),
/// so its end column is widened by the key length plus the dot.
fn effective_range(node: &Node, override_loc: Option<LocRange>) -> LocRange {
    if let Some(loc) = override_loc {
        return loc;
    }
    let mut loc = node.loc().clone();
    if let Expr::SuperIndex(super_index) = &**node {
        if let Expr::LiteralString(key) = &*super_index.index {
            loc.end.column += key.value.len() + 1;
        }
    }
    loc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Location;
    use crate::testing::*;

    // { a: 'v', b: self.a }
    fn self_reference_root() -> Node {
        let file = "t.jsonnet";
        let self_loc = loc(file, 1, 14, 1, 18);
        let chain = index(
            self_node(self_loc),
            lit_str_node("a", loc(file, 1, 19, 1, 20)),
            loc(file, 1, 14, 1, 20),
        );
        obj(
            vec![
                field("a", lit_str_node("v", loc(file, 1, 6, 1, 9)), loc(file, 1, 3, 1, 9)),
                field("b", chain, loc(file, 1, 11, 1, 20)),
            ],
            vec![],
            loc(file, 1, 1, 1, 22),
        )
    }

    #[test]
    fn missing_root_is_invalid_input() {
        let err = find_node_by_position(None, Location::new(1, 1)).unwrap_err();
        assert!(matches!(err, crate::error::AnalysisError::InvalidInput(_)));
    }

    #[test]
    fn innermost_node_ends_on_top() {
        let root = self_reference_root();
        let mut stack = find_node_by_position(Some(&root), Location::new(1, 15)).unwrap();
        // deepest node covering 1:15 is the Self inside the index chain
        let top = stack.pop().unwrap();
        assert!(matches!(*top, Expr::SelfExpr(_)));
        // the enclosing object is further down the stack
        assert!(stack
            .stack
            .iter()
            .any(|n| matches!(**n, Expr::DesugaredObject(_))));
    }

    #[test]
    fn outside_any_node_yields_empty_stack() {
        let root = self_reference_root();
        let stack = find_node_by_position(Some(&root), Location::new(5, 1)).unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn super_index_span_is_widened() {
        // { x: 1 } + { y: super.x }: the SuperIndex range only covers
        // "super" but the cursor sits on the trailing ".x".
        let file = "t.jsonnet";
        let lhs = obj(
            vec![field("x", lit_num("1", loc(file, 1, 6, 1, 7)), loc(file, 1, 3, 1, 7))],
            vec![],
            loc(file, 1, 1, 1, 9),
        );
        // dot-sugar index strings come out of desugaring without a location
        let super_node = super_index(lit_str_node("x", no_loc(file)), loc(file, 1, 17, 1, 22));
        let rhs = obj(
            vec![field("y", super_node, loc(file, 1, 14, 1, 24))],
            vec![],
            loc(file, 1, 12, 1, 26),
        );
        let root = binary_plus(lhs, rhs, loc(file, 1, 1, 1, 26));

        // column 23 is the "x" after "super."
        let mut stack = find_node_by_position(Some(&root), Location::new(1, 23)).unwrap();
        let top = stack.pop().unwrap();
        assert!(matches!(*top, Expr::SuperIndex(_)));
    }

    #[test]
    fn function_field_body_inherits_field_range() {
        // { f(x): x }: the Function node has no own range.
        let file = "t.jsonnet";
        let body = var("x", loc(file, 1, 9, 1, 10));
        let function = func(vec![param("x", loc(file, 1, 5, 1, 6))], body, no_loc(file));
        let root = obj(
            vec![field("f", function, loc(file, 1, 3, 1, 10))],
            vec![],
            loc(file, 1, 1, 1, 12),
        );

        let mut stack = find_node_by_position(Some(&root), Location::new(1, 9)).unwrap();
        let top = stack.pop().unwrap();
        assert!(matches!(*top, Expr::Var(_)));
        assert!(stack
            .stack
            .iter()
            .any(|n| matches!(**n, Expr::Function(_))));
    }

    #[test]
    fn enclosing_objects_precede_enclosed_ones() {
        // { outer: { inner: 1 } } spread across four lines
        let file = "t.jsonnet";
        let inner = obj(
            vec![field("inner", lit_num("1", loc(file, 3, 12, 3, 13)), loc(file, 3, 3, 3, 13))],
            vec![],
            loc(file, 2, 10, 4, 2),
        );
        let root = obj(
            vec![field("outer", inner, loc(file, 2, 3, 4, 2))],
            vec![],
            loc(file, 1, 1, 5, 2),
        );

        let stack = find_node_by_position(Some(&root), Location::new(3, 12)).unwrap();
        let object_lines: Vec<usize> = stack
            .stack
            .iter()
            .filter(|n| matches!(***n, Expr::DesugaredObject(_)))
            .map(|n| n.loc().begin.line)
            .collect();
        assert_eq!(object_lines, vec![1, 2]);
    }
}
