//! Plan → statement template compiler.
//!
//! Runs the default rewrite pipeline, then compiles the plan in a single
//! post-order walk: every node is compiled from its already-compiled
//! children plus its own parameters. Each operator kind has exactly one
//! rule, and a construct the target cannot express fails the whole
//! compilation; no partial template is ever returned.
mod compiled;
mod expr;
mod operators;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::capability::Capabilities;
use crate::error::CompileError;
use crate::param::{BindingKind, ParameterBinding, ParameterSource};
use crate::plan::{Column, Operator, Plan};
use crate::rewrite::Rewriter;
use crate::sql::{render, Expression, Query};
use crate::template::{Marker, MarkerId, Prerequisite, StatementTemplate, TemporaryTable};
use crate::value::SemanticType;

/// Compile a plan into a reusable statement template for one target.
pub fn compile(plan: &Plan, capabilities: &Capabilities) -> Result<StatementTemplate, CompileError> {
    let rewritten = Rewriter::with_defaults().run(plan.clone(), capabilities)?;
    let mut compiler = Compiler::new(capabilities, &rewritten);
    let root = compiler.node(rewritten.root())?;
    let columns = rewritten.root_schema()?.columns.clone();
    let template = compiler.finish(Query::Select(Box::new(root.query)), columns);
    debug!(
        dialect = %capabilities.dialect,
        bindings = template.bindings.len(),
        markers = template.markers.len(),
        prerequisites = template.prerequisites.len(),
        "compiled statement template"
    );
    Ok(template)
}

/// Bindings reused when the same runtime value is referenced again.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SharedBinding {
    Context(String),
    Element(String, usize),
}

pub(crate) struct Compiler<'a> {
    caps: &'a Capabilities,
    plan: &'a Plan,
    bindings: Vec<ParameterBinding>,
    shared: BTreeMap<SharedBinding, usize>,
    markers: Vec<Marker>,
    temporary_tables: Vec<TemporaryTable>,
    prerequisites: Vec<Prerequisite>,
    /// Left-input columns of the enclosing applies, innermost last.
    outer: Vec<Vec<Expression>>,
    aliases: usize,
    next_marker: u32,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(caps: &'a Capabilities, plan: &'a Plan) -> Self {
        Self {
            caps,
            plan,
            bindings: Vec::new(),
            shared: BTreeMap::new(),
            markers: Vec::new(),
            temporary_tables: Vec::new(),
            prerequisites: Vec::new(),
            outer: Vec::new(),
            aliases: 0,
            next_marker: 0,
        }
    }

    fn finish(self, query: Query, columns: Vec<Column>) -> StatementTemplate {
        StatementTemplate {
            segments: render(&query, self.caps),
            bindings: self.bindings,
            markers: self.markers,
            columns,
            temporary_tables: self.temporary_tables,
            prerequisites: self.prerequisites,
            capabilities: self.caps.clone(),
        }
    }

    fn bind(
        &mut self,
        source: impl ParameterSource + 'static,
        ty: SemanticType,
        kind: BindingKind,
    ) -> usize {
        self.bindings.push(ParameterBinding::new(source, ty, kind));
        self.bindings.len() - 1
    }

    fn bind_shared(
        &mut self,
        key: SharedBinding,
        source: impl ParameterSource + 'static,
        ty: SemanticType,
    ) -> usize {
        if let Some(index) = self.shared.get(&key) {
            return *index;
        }
        let index = self.bind(source, ty, BindingKind::Regular);
        self.shared.insert(key, index);
        index
    }

    fn fresh_alias(&mut self) -> String {
        let alias = format!("t{}", self.aliases);
        self.aliases += 1;
        alias
    }

    fn fresh_marker(&mut self) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        id
    }

    fn unsupported(&self, operator: Operator, reason: impl Into<String>) -> CompileError {
        CompileError::Unsupported {
            operator,
            dialect: self.caps.dialect,
            reason: reason.into(),
        }
    }
}

/// Output names of a node: schema names made unique with `_n` suffixes.
fn output_names(columns: &[Column]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    columns
        .iter()
        .map(|column| {
            let mut name = column.name.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", column.name, n);
                n += 1;
            }
            name
        })
        .collect()
}
