//! Ordered sequence of AST nodes used as the search state for position
//! lookups and reference resolution.

use std::cmp::Ordering;

use crate::ast::{Expr, Node};

/// Append/pop-end container of nodes with a distinguished `from` root.
#[derive(Debug, Clone)]
pub struct NodeStack {
    /// Root of the current search; kept even when the stack drains.
    pub from: Node,
    pub stack: Vec<Node>,
}

impl NodeStack {
    /// A stack seeded with its root.
    pub fn new(from: Node) -> Self {
        Self {
            stack: vec![from.clone()],
            from,
        }
    }

    /// An empty stack that remembers its root.
    pub fn rooted(from: Node) -> Self {
        Self {
            from,
            stack: Vec::new(),
        }
    }

    pub fn push(&mut self, node: Node) {
        self.stack.push(node);
    }

    pub fn pop(&mut self) -> Option<Node> {
        self.stack.pop()
    }

    pub fn peek(&self) -> Option<&Node> {
        self.stack.last()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drains the stack into the dotted chain it spells, root segment first.
    ///
    /// `super.a` contributes `["super", "a"]`, `(import 'f.jsonnet').x`
    /// contributes `["f.jsonnet", "x"]`, and so on. Index targets are
    /// re-pushed after their indexes so that pop order yields source order.
    pub fn build_index_list(&mut self) -> Vec<String> {
        let mut index_list = Vec::new();
        while let Some(curr) = self.pop() {
            match &*curr {
                Expr::SuperIndex(super_index) => {
                    self.push(super_index.index.clone());
                    index_list.push("super".to_string());
                }
                Expr::Index(index) => {
                    self.push(index.index.clone());
                    self.push(index.target.clone());
                }
                Expr::LiteralString(s) => index_list.push(s.value.clone()),
                Expr::SelfExpr(_) => index_list.push("self".to_string()),
                Expr::Var(v) => index_list.push(v.id.clone()),
                Expr::Import(import) => index_list.push(import.file.clone()),
                _ => {}
            }
        }
        index_list
    }

    /// Stable reorder so that a `DesugaredObject` strictly enclosing another
    /// (by line span) sorts before it. Ancestor `self` scopes must appear
    /// before descendants when the stack is scanned.
    pub fn reorder_desugared_objects(&mut self) {
        self.stack.sort_by(|a, b| {
            let a_is_object = matches!(**a, Expr::DesugaredObject(_));
            let b_is_object = matches!(**b, Expr::DesugaredObject(_));
            if !a_is_object && !b_is_object {
                return Ordering::Equal;
            }

            let (a_loc, b_loc) = (a.loc(), b.loc());
            if a_loc.begin.line < b_loc.begin.line && a_loc.end.line > b_loc.end.line {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn push_pop_peek() {
        let l = loc("t.jsonnet", 1, 1, 1, 2);
        let root = var("root", l.clone());
        let mut stack = NodeStack::new(root.clone());
        assert!(!stack.is_empty());
        stack.push(var("a", l.clone()));
        assert_eq!(stack.peek().unwrap().loc(), &l);
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
        // the root survives draining
        assert_eq!(stack.from, root);
    }

    #[test]
    fn index_list_for_self_chain() {
        // self.a.b  desugars to Index(Index(Self, "a"), "b")
        let l = loc("t.jsonnet", 1, 1, 1, 10);
        let chain = index(
            index(self_node(l.clone()), lit_str_node("a", l.clone()), l.clone()),
            lit_str_node("b", l.clone()),
            l.clone(),
        );
        let mut stack = NodeStack::new(chain);
        assert_eq!(stack.build_index_list(), vec!["self", "a", "b"]);
    }

    #[test]
    fn index_list_for_super() {
        let l = loc("t.jsonnet", 1, 1, 1, 10);
        let chain = super_index(lit_str_node("x", l.clone()), l.clone());
        let mut stack = NodeStack::new(chain);
        assert_eq!(stack.build_index_list(), vec!["super", "x"]);
    }

    #[test]
    fn index_list_for_import_chain() {
        // (import 'a.jsonnet').foo
        let l = loc("b.jsonnet", 1, 1, 1, 25);
        let chain = index(
            import_node("a.jsonnet", l.clone()),
            lit_str_node("foo", l.clone()),
            l.clone(),
        );
        let mut stack = NodeStack::new(chain);
        assert_eq!(stack.build_index_list(), vec!["a.jsonnet", "foo"]);
    }

    #[test]
    fn index_list_ignores_unrelated_nodes() {
        let l = loc("t.jsonnet", 1, 1, 1, 10);
        let chain = index(var("v", l.clone()), lit_str_node("k", l.clone()), l.clone());
        let mut stack = NodeStack::new(chain);
        stack.push(self_node(l.clone()));
        stack.push(lit_num("3", l.clone()));
        assert_eq!(stack.build_index_list(), vec!["self", "v", "k"]);
    }

    #[test]
    fn reorder_puts_enclosing_objects_first() {
        let outer_loc = loc("t.jsonnet", 1, 1, 10, 1);
        let inner_loc = loc("t.jsonnet", 3, 3, 5, 3);
        let inner = obj_node(vec![], vec![], inner_loc);
        let outer = obj_node(vec![], vec![], outer_loc);
        let filler = var("x", loc("t.jsonnet", 4, 1, 4, 2));

        let mut stack = NodeStack::new(filler.clone());
        stack.stack = vec![inner.clone(), filler.clone(), outer.clone()];
        stack.reorder_desugared_objects();

        let objects: Vec<&Node> = stack
            .stack
            .iter()
            .filter(|n| matches!(***n, Expr::DesugaredObject(_)))
            .collect();
        assert_eq!(objects[0].loc().begin.line, 1);
        assert_eq!(objects[1].loc().begin.line, 3);
    }
}
