//! Analysis core for the Jsonnet language server.
//!
//! Everything here operates on desugared ASTs supplied by an external
//! [`evaluator::Evaluator`]: position lookup over trees, a versioned
//! document cache, and the [`resolver::Processor`] that turns cursor
//! positions into definition sites. The LSP surface lives in the companion
//! server crate; nothing in this crate speaks JSON-RPC.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod finder;
pub mod nodestack;
pub mod position;
pub mod resolver;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use ast::{Expr, Id, LocRange, Location, Node};
pub use error::{AnalysisError, Result};
pub use evaluator::{Evaluator, EvaluatorFactory, FormatOptions};
pub use finder::find_node_by_position;
pub use nodestack::NodeStack;
pub use resolver::{ObjectRange, Processor};
pub use store::{Document, DocumentCache};
