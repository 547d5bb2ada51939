//! Failure taxonomy shared by the store, the resolver, and the evaluator
//! facade. Handlers decide per-variant whether to surface a protocol error
//! or to log and return an empty result.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Ill-formed request parameters, unknown settings key, wrong arity.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown URI, missing bind, missing parameter.
    #[error("{0} was not found")]
    NotFound(String),

    /// A newer version of the document is already in the cache.
    #[error("newer version of the document is already in the cache")]
    StaleVersion,

    /// A content range that falls outside the document.
    #[error("{0} out of range")]
    OutOfRange(String),

    /// `std` members have no source definition to jump to.
    #[error("cannot get definition of std lib")]
    CannotDefineStd,

    /// `super` used without an enclosing binary `+`.
    #[error("could not find a lhs object")]
    NoLhsObject,

    /// An index chain segment matched no field.
    #[error("field {0} was not found in any object")]
    FieldNotFound(String),

    /// The node under the cursor is not something with a definition.
    #[error("cannot find definition")]
    CannotFindDefinition,

    /// Evaluator import/evaluate/lint/format failure.
    #[error("{0}")]
    External(String),

    /// The request was cancelled before resolution finished.
    #[error("request was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
