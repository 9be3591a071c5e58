//! A plan bound to a target, compiled at most once.
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::capability::Capabilities;
use crate::error::{CompileError, ResolveError};
use crate::param::ParameterContext;
use crate::plan::Plan;
use crate::template::{ResolutionConfiguration, ResolvedCommand, StatementTemplate, TemplateCache};

/// Query plan plus the template compiled from it.
///
/// The template is written once by [`QueryRequest::prepare`] and read-only
/// afterwards, so a prepared request can be resolved from many threads.
#[derive(Debug)]
pub struct QueryRequest {
    plan: Plan,
    capabilities: Capabilities,
    template: OnceLock<Arc<StatementTemplate>>,
}

impl QueryRequest {
    pub fn new(plan: Plan, capabilities: Capabilities) -> Self {
        Self {
            plan,
            capabilities,
            template: OnceLock::new(),
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Compile the plan unless a template is already attached.
    pub fn prepare(&self) -> Result<Arc<StatementTemplate>, CompileError> {
        if let Some(template) = self.template.get() {
            return Ok(template.clone());
        }
        let compiled = Arc::new(crate::compiler::compile(&self.plan, &self.capabilities)?);
        Ok(self.attach(compiled))
    }

    /// Like [`prepare`](Self::prepare), sharing templates through `cache`.
    pub fn prepare_with(&self, cache: &TemplateCache) -> Result<Arc<StatementTemplate>, CompileError> {
        if let Some(template) = self.template.get() {
            return Ok(template.clone());
        }
        let compiled = cache.get_or_compile(&self.plan, &self.capabilities)?;
        Ok(self.attach(compiled))
    }

    fn attach(&self, compiled: Arc<StatementTemplate>) -> Arc<StatementTemplate> {
        let stored = self.template.get_or_init(|| compiled);
        debug!(
            dialect = %self.capabilities.dialect,
            bindings = stored.bindings().len(),
            "prepared query request"
        );
        stored.clone()
    }

    pub fn is_prepared(&self) -> bool {
        self.template.get().is_some()
    }

    pub fn template(&self) -> Result<&Arc<StatementTemplate>, ResolveError> {
        self.template.get().ok_or(ResolveError::NotPrepared)
    }

    /// Resolve the prepared template for one call, deriving marker values
    /// from the context.
    pub fn resolve(&self, ctx: &ParameterContext) -> Result<ResolvedCommand, ResolveError> {
        let template = self.template()?;
        let config = ResolutionConfiguration::prepare(template, ctx)?;
        template.resolve(&config, ctx)
    }
}
