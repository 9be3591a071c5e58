//! Compiled nodes: a SELECT fragment whose projections are the node's
//! output columns, in schema order.
use crate::plan::OrderKey;
use crate::sql::{Expression, OrderByExpr, SelectQuery};

#[derive(Debug, Clone)]
pub(super) struct CompiledNode {
    pub query: SelectQuery,
    /// Explicit output order, by projection index. `query.order_by` may
    /// additionally carry hidden keys a narrowing projection dropped.
    pub order: Vec<OrderKey>,
    /// Table alias the projections are expressed against.
    pub reference: Option<String>,
}

impl CompiledNode {
    pub fn new(query: SelectQuery, reference: Option<String>) -> Self {
        Self {
            query,
            order: Vec::new(),
            reference,
        }
    }

    pub fn columns(&self) -> Vec<Expression> {
        self.query
            .projections
            .iter()
            .map(|p| p.expr.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.query
            .projections
            .iter()
            .map(|p| p.alias.clone().unwrap_or_default())
            .collect()
    }

    /// Clauses that fix the row set, so new clauses cannot be merged in.
    pub fn is_shaped(&self) -> bool {
        self.query.distinct
            || self.query.has_limit()
            || self.query.set_op.is_some()
            || self.query.lock.is_some()
    }

    /// Plain SELECT-FROM-JOIN-WHERE: safe to extend with joins and
    /// predicates.
    pub fn is_flat(&self) -> bool {
        !self.is_shaped() && !self.query.is_grouped()
    }

    pub fn set_order(&mut self, order: Vec<OrderKey>) {
        self.query.order_by = order
            .iter()
            .filter_map(|key| {
                self.query.projections.get(key.column).map(|p| OrderByExpr {
                    expr: p.expr.clone(),
                    asc: key.direction.is_ascending(),
                })
            })
            .collect();
        self.order = order;
    }

    pub fn clear_order(&mut self) {
        self.query.order_by.clear();
        self.order.clear();
    }

    pub fn rename(&mut self, names: &[String]) {
        for (projection, name) in self.query.projections.iter_mut().zip(names) {
            projection.alias = Some(name.clone());
        }
    }
}
