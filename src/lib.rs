//! Compiles dialect-independent relational plans into reusable,
//! parameterized SQL statement templates.
pub mod capability;
pub mod compiler;
pub mod error;
pub mod param;
pub mod plan;
pub mod request;
pub mod rewrite;
pub mod sql;
pub mod template;
pub mod value;

pub use capability::{Capabilities, SqlDialect};
pub use compiler::compile;
pub use error::{CompileError, Error, ResolveError, Result};
pub use param::ParameterContext;
pub use plan::{Plan, PlanBuilder};
pub use request::QueryRequest;
pub use template::{ResolutionConfiguration, ResolvedCommand, StatementTemplate, TemplateCache};
pub use value::{SemanticType, Value};
