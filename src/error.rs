use thiserror::Error;

use crate::capability::SqlDialect;
use crate::plan::Operator;
use crate::template::MarkerId;

/// Errors raised while rewriting or compiling a plan. Compilation is
/// all-or-nothing: no partial template is ever produced.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The operator needs a capability the dialect lacks and no rewrite
    /// fallback exists.
    #[error("{operator} is not supported by {dialect}: {reason}")]
    Unsupported {
        operator: Operator,
        dialect: SqlDialect,
        reason: String,
    },

    /// The plan violates a structural invariant (bad column index, arity
    /// mismatch, dangling node id, ...).
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

/// Errors raised while resolving a compiled template for one execution.
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("placeholder `{0}` has no value in the resolution configuration")]
    UnresolvedPlaceholder(String),

    #[error("dynamic filter {0} has no rows in the resolution configuration")]
    UnresolvedDynamicFilter(MarkerId),

    #[error("dynamic filter {id} expects {expected} values per row, found {found}")]
    FilterArity {
        id: MarkerId,
        expected: usize,
        found: usize,
    },

    #[error("parameter `{0}` is not bound in the parameter context")]
    MissingParameter(String),

    #[error("parameter `{name}` expected {expected}, found {found}")]
    ParameterType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A skip/take count is negative or does not fit a signed 64-bit
    /// integer.
    #[error("row count `{name}` is out of range")]
    RowCountOutOfRange { name: String },

    #[error("query request has not been prepared")]
    NotPrepared,
}

/// Crate-level error for callers that drive the whole pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to read dialect profiles: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse dialect profiles: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid dialect profile `{name}`: {message}")]
    Profile { name: String, message: String },

    #[error("SQL syntax error: {0}")]
    Syntax(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
