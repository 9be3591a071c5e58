//! Structural plan rewrites run before compilation.
//!
//! Each pass takes a plan and returns a new plan; nothing is mutated in
//! place. The default pipeline runs in a fixed order:
//!
//! 1. apply elimination
//! 2. skip/take/paging normalization
//! 3. redundant column pruning
//! 4. ordering propagation
mod apply;
mod ordering;
mod paging;
mod prune;

pub use apply::ApplyElimination;
pub use ordering::OrderingPropagation;
pub use paging::PagingNormalization;
pub use prune::ColumnPruning;

use tracing::{debug, trace};

use crate::capability::Capabilities;
use crate::error::CompileError;
use crate::plan::Plan;

/// A single structural transformation over a plan.
///
/// Passes should be pure: the same plan and capabilities always produce the
/// same output plan.
pub trait RewritePass: Send + Sync {
    /// Unique name identifying this pass.
    fn name(&self) -> &str;

    /// Optional description of what this pass does.
    fn description(&self) -> &str {
        ""
    }

    /// Rewrite a plan, returning it unchanged when nothing applies.
    fn rewrite(&self, plan: Plan, capabilities: &Capabilities) -> Result<Plan, CompileError>;
}

/// Manages and executes a pipeline of rewrite passes.
#[derive(Default)]
pub struct Rewriter {
    passes: Vec<Box<dyn RewritePass>>,
}

impl Rewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard pipeline, in its required order.
    pub fn with_defaults() -> Self {
        let mut rewriter = Self::new();
        rewriter.add_pass(Box::new(ApplyElimination));
        rewriter.add_pass(Box::new(PagingNormalization));
        rewriter.add_pass(Box::new(ColumnPruning));
        rewriter.add_pass(Box::new(OrderingPropagation));
        rewriter
    }

    pub fn add_pass(&mut self, pass: Box<dyn RewritePass>) {
        self.passes.push(pass);
    }

    /// Run all passes on a plan in order.
    pub fn run(&self, plan: Plan, capabilities: &Capabilities) -> Result<Plan, CompileError> {
        let mut current = plan;
        for pass in &self.passes {
            let before = current.arena().len();
            current = pass.rewrite(current, capabilities)?;
            trace!(
                pass = pass.name(),
                nodes_before = before,
                nodes_after = current.arena().len(),
                "rewrite pass finished"
            );
        }
        debug!(
            dialect = %capabilities.dialect,
            nodes = current.arena().len(),
            "plan rewritten"
        );
        Ok(current)
    }

    /// List registered pass names.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}
