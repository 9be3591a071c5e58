//! Process-local cache of compiled templates, keyed by plan fingerprint.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::StatementTemplate;
use crate::capability::Capabilities;
use crate::compiler;
use crate::error::CompileError;
use crate::plan::{Plan, PlanFingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Shares one compiled template between structurally identical plans.
///
/// Lookups take a read lock only. Concurrent misses on the same fingerprint
/// may each compile; the first template inserted is kept and returned to
/// every caller.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<PlanFingerprint, Arc<StatementTemplate>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &PlanFingerprint) -> Option<Arc<StatementTemplate>> {
        self.entries.read().get(fingerprint).cloned()
    }

    pub fn get_or_compile(
        &self,
        plan: &Plan,
        capabilities: &Capabilities,
    ) -> Result<Arc<StatementTemplate>, CompileError> {
        let fingerprint = PlanFingerprint::compute(plan, capabilities)?;
        if let Some(template) = self.get(&fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(template);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(compiler::compile(plan, capabilities)?);
        let mut entries = self.entries.write();
        let stored = entries.entry(fingerprint).or_insert(compiled).clone();
        debug!(fingerprint = %fingerprint, entries = entries.len(), "cached statement template");
        Ok(stored)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Column, OrderKey, PlanBuilder};
    use crate::value::SemanticType;

    fn plan() -> Plan {
        let mut b = PlanBuilder::new();
        let scan = b
            .index(
                "items",
                vec![
                    Column::new("id", SemanticType::Int64),
                    Column::new("name", SemanticType::String),
                ],
                vec![OrderKey::asc(0)],
            )
            .unwrap();
        let take = b.take(scan, 5u64).unwrap();
        b.finish(take).unwrap()
    }

    #[test]
    fn test_structurally_equal_plans_share_template() {
        let cache = TemplateCache::new();
        let caps = Capabilities::sqlite();
        let a = cache.get_or_compile(&plan(), &caps).unwrap();
        let b = cache.get_or_compile(&plan(), &caps).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );

        cache.get_or_compile(&plan(), &Capabilities::postgres()).unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_compiles_keep_first_insert() {
        let cache = TemplateCache::new();
        let caps = Capabilities::postgres();
        let templates: Vec<Arc<StatementTemplate>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.get_or_compile(&plan(), &caps).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for t in &templates[1..] {
            assert!(Arc::ptr_eq(&templates[0], t));
        }
        assert_eq!(cache.len(), 1);
    }
}
