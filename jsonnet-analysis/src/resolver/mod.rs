//! Semantic resolution over desugared trees.
//!
//! The [`Processor`] turns a cursor position into the places a symbol is
//! defined: binds for variables, object fields for index chains, files for
//! imports. It never evaluates anything; all reasoning is over node shapes,
//! scopes, and ranges, with the evaluator used only to obtain trees for
//! other files.

mod object_range;
mod top_level;
mod usages;

pub use object_range::{bind_to_range, field_to_range, param_to_range, ObjectRange};

use top_level::find_object_fields_in_objects;

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ast::{Bind, Expr, Field, Location, Node, Param};
use crate::error::{AnalysisError, Result};
use crate::evaluator::Evaluator;
use crate::finder::find_node_by_position;
use crate::nodestack::NodeStack;
use crate::position::range_greater_or_equal;
use crate::store::DocumentCache;

/// Cap on re-rooted chain resolutions. Aliases of aliases deeper than this
/// give up instead of recursing forever.
const MAX_INDEX_DEPTH: usize = 64;

pub struct Processor<'a> {
    cache: &'a DocumentCache,
    evaluator: &'a dyn Evaluator,
    /// Files currently being unwound into top-level objects; re-entering
    /// one means an import cycle, which yields no objects.
    active_imports: RefCell<HashSet<String>>,
    token: CancellationToken,
}

impl<'a> Processor<'a> {
    pub fn new(cache: &'a DocumentCache, evaluator: &'a dyn Evaluator) -> Self {
        Self::with_token(cache, evaluator, CancellationToken::new())
    }

    pub fn with_token(
        cache: &'a DocumentCache,
        evaluator: &'a dyn Evaluator,
        token: CancellationToken,
    ) -> Self {
        Self {
            cache,
            evaluator,
            active_imports: RefCell::new(HashSet::new()),
            token,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }

    /// Definition lookup: resolves whatever sits under `location` in the
    /// tree rooted at `root` to the ranges where it is defined.
    pub fn resolve(&self, root: &Node, location: Location) -> Result<Vec<ObjectRange>> {
        self.check_cancelled()?;
        let mut stack = find_node_by_position(Some(root), location)?;
        let deepest = stack.pop().ok_or(AnalysisError::CannotFindDefinition)?;

        match &*deepest {
            Expr::Var(v) => {
                if v.id == "std" {
                    return Err(AnalysisError::CannotDefineStd);
                }
                if let Some(bind) = find_bind_by_id_via_stack(&stack, &v.id) {
                    Ok(vec![bind_to_range(&bind)])
                } else if let Some(param) = find_parameter_by_id_via_stack(&stack, &v.id, false) {
                    Ok(vec![param_to_range(&param)])
                } else {
                    Err(AnalysisError::NotFound(format!(
                        "no matching bind found for {}",
                        v.id
                    )))
                }
            }
            Expr::Index(_) | Expr::SuperIndex(_) => {
                let index_list = NodeStack::new(deepest.clone()).build_index_list();
                let mut search_stack = stack.clone();
                self.find_ranges_from_index_list(&mut search_stack, &index_list, false)
            }
            Expr::Import(import) | Expr::ImportStr(import) => {
                let resolved = self
                    .evaluator
                    .resolve_import(&root.loc().file, &import.file)?;
                Ok(vec![ObjectRange::bare(crate::ast::LocRange {
                    file: resolved,
                    begin: Location::default(),
                    end: Location::default(),
                })])
            }
            _ => {
                debug!(node = deepest.type_name(), "nothing resolvable under cursor");
                Err(AnalysisError::CannotFindDefinition)
            }
        }
    }

    /// Resolves a dotted chain (as produced by
    /// [`NodeStack::build_index_list`]) to the fields it denotes.
    ///
    /// With `partial_match_fields` the final segment matches by prefix,
    /// which is how completion enumerates candidates.
    pub fn find_ranges_from_index_list(
        &self,
        stack: &mut NodeStack,
        index_list: &[String],
        partial_match_fields: bool,
    ) -> Result<Vec<ObjectRange>> {
        self.ranges_from_index_list(stack, index_list, partial_match_fields, 0)
    }

    fn ranges_from_index_list(
        &self,
        stack: &mut NodeStack,
        index_list: &[String],
        partial_match_fields: bool,
        depth: usize,
    ) -> Result<Vec<ObjectRange>> {
        self.check_cancelled()?;
        if depth > MAX_INDEX_DEPTH {
            return Err(AnalysisError::CannotFindDefinition);
        }

        let (head, rest) = index_list
            .split_first()
            .ok_or_else(|| AnalysisError::InvalidInput("empty index list".to_string()))?;
        // "fn(arg)" steps through the field holding the function
        let head = head.split('(').next().unwrap_or(head);
        let rest: Vec<String> = rest.to_vec();

        let mut same_file_only = false;
        let mut objects: Vec<Node> = Vec::new();

        if head == "super" {
            objects.push(self.find_lhs_desugared_object(stack)?);
        } else if head == "self" {
            let mut tmp = stack.clone();
            // An index inside a binary (self.foo + {...}) must not see the
            // other operand's fields.
            if matches!(tmp.peek().map(|n| &**n), Some(Expr::Binary(_))) {
                tmp.pop();
            }
            objects = filter_self_scope(self.find_top_level_objects(&mut tmp)?);
        } else if head == "std" {
            return Err(AnalysisError::CannotDefineStd);
        } else if head == "$" {
            same_file_only = true;
            let mut root_stack = NodeStack::new(stack.from.clone());
            objects = self.find_top_level_objects(&mut root_stack)?;
        } else if head.contains('.') {
            objects = self.find_top_level_objects_in_file(head, "")?;
        } else {
            let Some(bind) = find_bind_by_id_via_stack(stack, head) else {
                if let Some(param) = find_parameter_by_id_via_stack(stack, head, partial_match_fields)
                {
                    return Ok(vec![param_to_range(&param)]);
                }
                return Err(AnalysisError::NotFound(format!(
                    "could not find bind for {head}"
                )));
            };
            match &*bind.body {
                Expr::DesugaredObject(_) => objects.push(bind.body.clone()),
                Expr::SelfExpr(_) => {
                    let mut root_stack = NodeStack::new(stack.from.clone());
                    objects = self.find_top_level_objects(&mut root_stack)?;
                }
                Expr::Import(import) => {
                    objects = self.find_top_level_objects_in_file(&import.file, "")?;
                }
                Expr::Index(_) | Expr::Apply(_) => {
                    // Re-root: resolve the aliased chain with the remaining
                    // segments appended.
                    let mut prefixed = NodeStack::new(bind.body.clone()).build_index_list();
                    prefixed.extend(rest.iter().cloned());
                    return self.ranges_from_index_list(stack, &prefixed, partial_match_fields, depth + 1);
                }
                Expr::Function(function) => {
                    if let Some(object) = find_child_desugared_object(&function.body) {
                        objects.push(object);
                    }
                }
                other => {
                    return Err(AnalysisError::InvalidInput(format!(
                        "unexpected node type when finding bind for '{head}': {}",
                        other.type_name()
                    )));
                }
            }
        }

        self.extract_object_ranges(stack, objects, same_file_only, &rest, partial_match_fields, depth)
    }

    fn extract_object_ranges(
        &self,
        stack: &mut NodeStack,
        mut objects: Vec<Node>,
        same_file_only: bool,
        index_list: &[String],
        partial_match_fields: bool,
        depth: usize,
    ) -> Result<Vec<ObjectRange>> {
        let mut ranges = Vec::new();
        let mut index_list: Vec<String> = index_list.to_vec();

        while !index_list.is_empty() {
            self.check_cancelled()?;
            let index = index_list.remove(0);
            // Only the last segment may match partially; the rest must be
            // complete field names.
            let partial = partial_match_fields && index_list.is_empty();

            let found_fields = find_object_fields_in_objects(&objects, &index, partial);
            objects.clear();
            if found_fields.is_empty() {
                return Err(AnalysisError::FieldNotFound(index));
            }

            if index_list.is_empty() {
                for found in &found_fields {
                    ranges.push(field_to_range(found));
                    // A plain field shadows everything under it; `field+:`
                    // composes with earlier definitions, so keep collecting.
                    if !found.plus_super && !partial {
                        break;
                    }
                }
                return Ok(ranges);
            }

            let mut field_nodes = self.unpack_field_nodes(&found_fields)?;
            let mut seen: HashSet<*const Expr> = HashSet::new();
            let mut i = 0;
            while i < field_nodes.len() {
                self.check_cancelled()?;
                let field_node = field_nodes[i].clone();
                i += 1;
                if !seen.insert(Arc::as_ptr(&field_node)) {
                    continue;
                }
                match &*field_node {
                    Expr::Apply(apply) => {
                        // The target is a function and will be chased by the
                        // var lookup on a later pass.
                        field_nodes.push(apply.target.clone());
                    }
                    Expr::Var(_) => {
                        let reference = self.find_var_reference(&field_node)?;
                        if let Some(object) = find_child_desugared_object(&reference) {
                            objects.push(object);
                        } else {
                            field_nodes.push(reference);
                        }
                    }
                    Expr::DesugaredObject(_) => objects.push(field_node.clone()),
                    Expr::Index(idx) => {
                        let mut additional =
                            NodeStack::new(field_node.clone()).build_index_list();
                        additional.extend(index_list.iter().cloned());
                        match self.ranges_from_index_list(stack, &additional, partial_match_fields, depth + 1)
                        {
                            Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
                            Ok(result) if !result.is_empty() => {
                                if !same_file_only || result[0].filename == stack.from.loc().file {
                                    return Ok(result);
                                }
                                field_nodes.push(idx.target.clone());
                            }
                            _ => field_nodes.push(idx.target.clone()),
                        }
                    }
                    Expr::Function(function) => {
                        if let Some(object) = find_child_desugared_object(&function.body) {
                            objects.push(object);
                        }
                    }
                    Expr::Import(import) => {
                        let new_objects = self
                            .find_top_level_objects_in_file(&import.file, &field_node.loc().file)?;
                        objects.extend(new_objects);
                    }
                    _ => {}
                }
            }
        }
        Ok(ranges)
    }

    /// Extracts the nodes to search from matched fields.
    ///
    /// Binaries contribute both sides, right first so overriding fields win.
    /// A `self` body is replaced by the objects it refers to, found by
    /// position in its own file.
    fn unpack_field_nodes(&self, fields: &[Field]) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        for field in fields {
            match &*field.body {
                Expr::SelfExpr(_) => {
                    let loc = field.body.loc();
                    let (root, _) = self.evaluator.import_ast("", &loc.file)?;
                    let mut tmp = find_node_by_position(Some(&root), loc.begin)?;
                    while let Some(node) = tmp.pop() {
                        if matches!(*node, Expr::DesugaredObject(_)) {
                            nodes.push(node);
                        }
                    }
                }
                Expr::Binary(binary) => {
                    nodes.push(binary.right.clone());
                    nodes.push(binary.left.clone());
                }
                _ => nodes.push(field.body.clone()),
            }
        }
        Ok(nodes)
    }

    /// Finds the node a variable refers to: the file is re-imported, the
    /// stack at the variable's own position is searched for its bind.
    pub fn find_var_reference(&self, var_node: &Node) -> Result<Node> {
        let Expr::Var(v) = &**var_node else {
            return Err(AnalysisError::InvalidInput(
                "expected a var node".to_string(),
            ));
        };
        let (file_root, _) = self.evaluator.import_ast("", &var_node.loc().file)?;
        let var_stack = find_node_by_position(Some(&file_root), var_node.loc().begin)?;
        let bind = find_bind_by_id_via_stack(&var_stack, &v.id)
            .ok_or_else(|| AnalysisError::NotFound(format!("could not find bind for {}", v.id)))?;
        Ok(bind.body.clone())
    }

    /// Walks outward for the left-hand object of the nearest binary, which
    /// is what `super` refers to.
    fn find_lhs_desugared_object(&self, stack: &mut NodeStack) -> Result<Node> {
        while let Some(curr) = stack.pop() {
            match &*curr {
                Expr::Binary(binary) => match &*binary.left {
                    Expr::DesugaredObject(_) => return Ok(binary.left.clone()),
                    Expr::Var(v) => {
                        if let Some(bind) = find_bind_by_id_via_stack(stack, &v.id) {
                            if let Some(object) = find_child_desugared_object(&bind.body) {
                                return Ok(object);
                            }
                        }
                    }
                    _ => {}
                },
                Expr::Local(local) => {
                    for bind in &local.binds {
                        stack.push(bind.body.clone());
                    }
                    stack.push(local.body.clone());
                }
                _ => {}
            }
        }
        Err(AnalysisError::NoLhsObject)
    }
}

/// Searches the stack for the bind defining `id`: `local` binds and object
/// locals, innermost-last stack order, the root checked last.
pub fn find_bind_by_id_via_stack(stack: &NodeStack, id: &str) -> Option<Bind> {
    let nodes = stack.stack.iter().chain(std::iter::once(&stack.from));
    for node in nodes {
        match &**node {
            Expr::Local(local) => {
                for bind in &local.binds {
                    if bind.variable == id {
                        return Some(bind.clone());
                    }
                }
            }
            Expr::DesugaredObject(object) => {
                for bind in &object.locals {
                    if bind.variable == id {
                        return Some(bind.clone());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Searches the stack's functions for a parameter named `id`. With
/// `partial_match` a prefix is enough, for completion.
pub fn find_parameter_by_id_via_stack(
    stack: &NodeStack,
    id: &str,
    partial_match: bool,
) -> Option<Param> {
    for node in &stack.stack {
        if let Expr::Function(function) = &**node {
            for param in &function.parameters {
                if param.name == id || (partial_match && param.name.starts_with(id)) {
                    return Some(param.clone());
                }
            }
        }
    }
    None
}

/// First object reachable through a chain of binaries, depth-first left.
pub fn find_child_desugared_object(node: &Node) -> Option<Node> {
    match &**node {
        Expr::DesugaredObject(_) => Some(node.clone()),
        Expr::Binary(binary) => find_child_desugared_object(&binary.left)
            .or_else(|| find_child_desugared_object(&binary.right)),
        _ => None,
    }
}

/// Restricts a `self` lookup to the scope it appears in: the first object
/// found is the owner, and anything enclosing it is dropped.
fn filter_self_scope(objects: Vec<Node>) -> Vec<Node> {
    let Some(top_level_loc) = objects.first().map(|o| o.loc().clone()) else {
        return objects;
    };
    let mut result = Vec::with_capacity(objects.len());
    let mut iter = objects.into_iter();
    result.extend(iter.next());
    for object in iter {
        if !range_greater_or_equal(object.loc(), &top_level_loc) {
            result.push(object);
        }
    }
    result
}
