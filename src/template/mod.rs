//! Compiled statement templates.
//!
//! A template is immutable once compiled and is shared as `Arc` across
//! executions. Per-call data never lives here: parameter values come from a
//! `ParameterContext` and marker choices from a `ResolutionConfiguration`.
mod cache;
mod resolver;

pub use cache::{CacheStats, TemplateCache};
pub use resolver::{ResolutionConfiguration, ResolvedCommand, ResolvedParameter};

use std::fmt;
use std::sync::Arc;

use crate::capability::Capabilities;
use crate::error::ResolveError;
use crate::param::{ParameterBinding, ParameterContext};
use crate::plan::Column;

/// Identifier of a variant or dynamic filter marker within one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub(crate) u32);

impl MarkerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A piece of rendered command text.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    /// Reference into the template's binding list.
    Parameter(usize),
    Placeholder(String),
    Variant {
        id: MarkerId,
        main: Vec<Segment>,
        alternative: Vec<Segment>,
    },
    DynamicFilter {
        id: MarkerId,
        /// One rendered expression per filtered column.
        columns: Vec<Vec<Segment>>,
    },
}

/// Registry entry for a deferred marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Placeholder { name: String },
    /// `rows` is the row-filter binding whose size decides the branch when
    /// a configuration is prepared from a parameter context.
    Variant { id: MarkerId, rows: usize },
    DynamicFilter { id: MarkerId, arity: usize, rows: usize },
}

/// Temporary table the execution layer must create and fill before running
/// the statement. Its name is supplied through `placeholder`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporaryTable {
    pub placeholder: String,
    pub columns: Vec<Column>,
    /// Row-filter binding providing the table's rows.
    pub rows: usize,
}

/// Statement that must run before the main statement.
#[derive(Debug, Clone)]
pub struct Prerequisite {
    pub table: String,
    pub template: Arc<StatementTemplate>,
}

#[derive(Debug, Clone)]
pub struct StatementTemplate {
    pub(crate) segments: Vec<Segment>,
    pub(crate) bindings: Vec<ParameterBinding>,
    pub(crate) markers: Vec<Marker>,
    pub(crate) columns: Vec<Column>,
    pub(crate) temporary_tables: Vec<TemporaryTable>,
    pub(crate) prerequisites: Vec<Prerequisite>,
    pub(crate) capabilities: Capabilities,
}

impl StatementTemplate {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Bindings in index order, each tagged with its semantic type.
    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Output columns of the statement.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn temporary_tables(&self) -> &[TemporaryTable] {
        &self.temporary_tables
    }

    pub fn prerequisites(&self) -> &[Prerequisite] {
        &self.prerequisites
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Produce executable text and the ordered parameter values for one call.
    pub fn resolve(
        &self,
        config: &ResolutionConfiguration,
        ctx: &ParameterContext,
    ) -> Result<ResolvedCommand, ResolveError> {
        resolver::resolve(self, config, ctx)
    }

    /// Template text with markers shown inline.
    pub fn marked_text(&self) -> String {
        let mut out = String::new();
        write_segments(&mut out, &self.segments);
        out
    }
}

fn write_segments(out: &mut String, segments: &[Segment]) {
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Parameter(i) => out.push_str(&format!("{{p{}}}", i)),
            Segment::Placeholder(name) => out.push_str(&format!("{{:{}}}", name)),
            Segment::Variant {
                id,
                main,
                alternative,
            } => {
                out.push_str(&format!("{{{}? ", id));
                write_segments(out, main);
                out.push_str(" | ");
                write_segments(out, alternative);
                out.push('}');
            }
            Segment::DynamicFilter { id, columns } => {
                out.push_str(&format!("{{{} in (", id));
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_segments(out, column);
                }
                out.push_str(")}");
            }
        }
    }
}

impl fmt::Display for StatementTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.marked_text())?;
        for (i, binding) in self.bindings.iter().enumerate() {
            write!(f, "\n  p{}: {}", i, binding)?;
        }
        for table in &self.temporary_tables {
            write!(
                f,
                "\n  temporary table {{:{}}} ({} columns) <- p{}",
                table.placeholder,
                table.columns.len(),
                table.rows
            )?;
        }
        for prerequisite in &self.prerequisites {
            write!(
                f,
                "\n  before: {} <- {}",
                prerequisite.table,
                prerequisite.template.marked_text()
            )?;
        }
        Ok(())
    }
}
