//! Discovery of the objects a file (or stack) evaluates to.

use std::collections::HashSet;

use tracing::debug;

use crate::ast::{Expr, Node};
use crate::error::Result;
use crate::nodestack::NodeStack;

use super::Processor;

impl Processor<'_> {
    /// Top-level objects of `filename`, imported relative to
    /// `imported_from`. Results are cached until the next document write;
    /// files already being unwound (import cycles) yield nothing.
    pub fn find_top_level_objects_in_file(
        &self,
        filename: &str,
        imported_from: &str,
    ) -> Result<Vec<Node>> {
        if let Some(cached) = self.cache.get_top_level_objects(imported_from, filename) {
            return Ok(cached);
        }
        if !self.active_imports.borrow_mut().insert(filename.to_string()) {
            debug!(filename, "import cycle detected, yielding no objects");
            return Ok(Vec::new());
        }
        let result = self
            .evaluator
            .import_ast(imported_from, filename)
            .and_then(|(root, _)| self.find_top_level_objects(&mut NodeStack::new(root)));
        self.active_imports.borrow_mut().remove(filename);

        let objects = result?;
        self.cache
            .put_top_level_objects(imported_from, filename, objects.clone());
        Ok(objects)
    }

    /// Unwinds the stack into the objects it evaluates to, chasing binaries,
    /// locals, imports, indexes, variables, and function bodies. Discovery
    /// order is meaningful: objects merged later come first.
    pub fn find_top_level_objects(&self, stack: &mut NodeStack) -> Result<Vec<Node>> {
        let mut objects = Vec::new();
        // already-visited nodes; recursive binds and re-pushed operands
        // would otherwise loop
        let mut seen: HashSet<*const Expr> = HashSet::new();

        while let Some(curr) = stack.pop() {
            self.check_cancelled()?;
            if !seen.insert(std::sync::Arc::as_ptr(&curr)) {
                continue;
            }
            match &*curr {
                Expr::DesugaredObject(_) => objects.push(curr.clone()),
                Expr::Binary(binary) => {
                    stack.push(binary.left.clone());
                    stack.push(binary.right.clone());
                }
                Expr::Local(local) => stack.push(local.body.clone()),
                Expr::Import(import) => {
                    match self.evaluator.import_ast(&curr.loc().file, &import.file) {
                        Ok((root, _)) => stack.push(root),
                        Err(err) => {
                            debug!(file = %import.file, %err, "skipping unresolvable import");
                        }
                    }
                }
                Expr::Index(idx) => {
                    let Expr::LiteralString(index_value) = &*idx.index else {
                        continue;
                    };

                    // A var target names the container; otherwise the next
                    // node on the stack is it.
                    let container = if matches!(*idx.target, Expr::Var(_)) {
                        match self.find_var_reference(&idx.target) {
                            Ok(reference) => Some(reference),
                            Err(err) => {
                                debug!(%err, "skipping index with unresolvable var target");
                                continue;
                            }
                        }
                    } else {
                        stack.peek().cloned()
                    };

                    let possible_objects: Vec<Node> = match container {
                        Some(container) => match &*container {
                            Expr::DesugaredObject(_) => vec![container.clone()],
                            Expr::Import(import) => self
                                .find_top_level_objects_in_file(&import.file, &container.loc().file)?,
                            _ => Vec::new(),
                        },
                        None => Vec::new(),
                    };
                    for object in possible_objects {
                        if let Expr::DesugaredObject(object) = &*object {
                            for matched in
                                find_object_fields_in_object(object, &index_value.value, false)
                            {
                                stack.push(matched.body.clone());
                            }
                        }
                    }
                }
                Expr::Var(_) => match self.find_var_reference(&curr) {
                    Ok(reference) => stack.push(reference),
                    Err(err) => {
                        debug!(%err, "skipping unresolvable var");
                    }
                },
                Expr::Function(function) => stack.push(function.body.clone()),
                _ => {}
            }
        }
        Ok(objects)
    }
}

/// Fields named `index` across the given objects, in object order.
pub(super) fn find_object_fields_in_objects(
    objects: &[Node],
    index: &str,
    partial_match: bool,
) -> Vec<crate::ast::Field> {
    let mut matching = Vec::new();
    for object in objects {
        if let Expr::DesugaredObject(object) = &**object {
            matching.extend(find_object_fields_in_object(object, index, partial_match));
        }
    }
    matching
}

fn find_object_fields_in_object(
    object: &crate::ast::DesugaredObject,
    index: &str,
    partial_match: bool,
) -> Vec<crate::ast::Field> {
    let mut matching = Vec::new();
    for field in &object.fields {
        let Expr::LiteralString(name) = &*field.name else {
            continue;
        };
        if index == name.value || (partial_match && name.value.starts_with(index)) {
            matching.push(field.clone());
            if !partial_match {
                break;
            }
        }
    }
    matching
}
