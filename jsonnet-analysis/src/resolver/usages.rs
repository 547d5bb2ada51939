//! Whole-file scans for every place a symbol appears.

use crate::ast::{field_name_to_string, Expr, LocRange, Location, Node};
use crate::error::Result;

use super::{bind_to_range, field_to_range, ObjectRange, Processor};

impl Processor<'_> {
    /// Every occurrence of `symbol` across `files`: variable uses, `local`
    /// binds, field definitions, and dotted accesses. Selection ranges point
    /// at the identifier itself.
    pub fn find_usages(&self, files: &[String], symbol: &str) -> Result<Vec<ObjectRange>> {
        let mut ranges = Vec::new();
        for file in files {
            self.check_cancelled()?;
            let (root, _) = self.evaluator.import_ast("", file)?;
            collect_usages(&root, symbol, &mut ranges);
        }
        Ok(ranges)
    }
}

fn collect_usages(root: &Node, symbol: &str, out: &mut Vec<ObjectRange>) {
    let mut work = vec![root.clone()];
    while let Some(curr) = work.pop() {
        match &*curr {
            Expr::Var(v) if v.id == symbol => {
                out.push(ObjectRange::bare(curr.loc().clone()));
            }
            Expr::Local(local) => {
                for b in &local.binds {
                    if b.variable == symbol {
                        out.push(bind_to_range(b));
                    }
                }
            }
            Expr::DesugaredObject(object) => {
                for f in &object.fields {
                    if field_name_to_string(&f.name) == symbol {
                        out.push(field_to_range(f));
                    }
                }
                for b in &object.locals {
                    if b.variable == symbol {
                        out.push(bind_to_range(b));
                    }
                }
            }
            Expr::Index(idx) => {
                if let Expr::LiteralString(name) = &*idx.index {
                    if name.value == symbol {
                        out.push(ObjectRange::bare(index_name_range(&curr, name.value.len())));
                    }
                }
            }
            Expr::SuperIndex(super_index) => {
                if let Expr::LiteralString(name) = &*super_index.index {
                    if name.value == symbol {
                        out.push(ObjectRange::bare(index_name_range(&curr, name.value.len())));
                    }
                }
            }
            _ => {}
        }
        work.extend(curr.children());
    }
}

/// Span of the trailing `.name` of an index. Dot-sugar index strings carry
/// no location, so the span is derived from the index node's end.
fn index_name_range(node: &Node, name_len: usize) -> LocRange {
    let loc = node.loc();
    if let Expr::Index(idx) = &**node {
        let index_loc = idx.index.loc();
        if index_loc.is_set() {
            return index_loc.clone();
        }
    }
    LocRange::new(
        loc.file.clone(),
        Location::new(loc.end.line, loc.end.column.saturating_sub(name_len)),
        loc.end,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentCache;
    use crate::testing::*;

    #[test]
    fn finds_binds_and_var_uses() {
        // local myvar = 'hello'; { a: myvar }
        let f = "t.jsonnet";
        let usage = var("myvar", loc(f, 1, 29, 1, 34));
        let body = obj(
            vec![field("a", usage, loc(f, 1, 26, 1, 34))],
            vec![],
            loc(f, 1, 24, 1, 36),
        );
        let root = local(
            vec![bind(
                "myvar",
                lit_str_node("hello", loc(f, 1, 15, 1, 22)),
                loc(f, 1, 7, 1, 22),
            )],
            body,
            loc(f, 1, 1, 1, 36),
        );

        let cache = DocumentCache::new();
        let evaluator = StaticEvaluator::new().with_file(f, root);
        let processor = Processor::new(&cache, &evaluator);

        let ranges = processor
            .find_usages(&[f.to_string()], "myvar")
            .unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].selection_range, loc(f, 1, 7, 1, 12));
        assert_eq!(ranges[1].selection_range, loc(f, 1, 29, 1, 34));
    }

    #[test]
    fn finds_field_definitions_and_accesses() {
        // { port: 80 } in one file, (import 'cfg.jsonnet').port in another
        let cfg = "cfg.jsonnet";
        let cfg_root = obj(
            vec![field("port", lit_num("80", loc(cfg, 1, 9, 1, 11)), loc(cfg, 1, 3, 1, 11))],
            vec![],
            loc(cfg, 1, 1, 1, 13),
        );
        let f = "main.jsonnet";
        let access = index(
            import_node(cfg, loc(f, 1, 2, 1, 22)),
            lit_str_node("port", no_loc(f)),
            loc(f, 1, 1, 1, 28),
        );

        let cache = DocumentCache::new();
        let evaluator = StaticEvaluator::new()
            .with_file(cfg, cfg_root)
            .with_file(f, access);
        let processor = Processor::new(&cache, &evaluator);

        let ranges = processor
            .find_usages(&[cfg.to_string(), f.to_string()], "port")
            .unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].filename, cfg);
        assert_eq!(ranges[0].selection_range, loc(cfg, 1, 3, 1, 7));
        assert_eq!(ranges[1].filename, f);
        // derived from the index node's end, spanning ".port" minus the dot
        assert_eq!(ranges[1].selection_range, loc(f, 1, 24, 1, 28));
    }

    #[test]
    fn unrelated_symbols_do_not_match() {
        let f = "t.jsonnet";
        let root = local(
            vec![bind("other", lit_num("1", loc(f, 1, 15, 1, 16)), loc(f, 1, 7, 1, 16))],
            var("other", loc(f, 2, 1, 2, 6)),
            loc(f, 1, 1, 2, 6),
        );

        let cache = DocumentCache::new();
        let evaluator = StaticEvaluator::new().with_file(f, root);
        let processor = Processor::new(&cache, &evaluator);

        let ranges = processor.find_usages(&[f.to_string()], "missing").unwrap();
        assert!(ranges.is_empty());
    }
}
