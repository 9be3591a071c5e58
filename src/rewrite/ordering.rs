use std::collections::BTreeMap;

use tracing::debug;

use super::RewritePass;
use crate::capability::Capabilities;
use crate::error::CompileError;
use crate::plan::{NodeId, Plan, PlanBuilder, PlanKind};

/// Keeps sorts only where order is observable.
///
/// A sort survives when the root or an order-sensitive ancestor (skip, take,
/// paging, seek) sees its order through order-preserving nodes. Sorts under
/// order-breaking nodes are dropped. Where order is needed but only implied
/// by an index key, an explicit sort is inserted so the SQL states it.
pub struct OrderingPropagation;

impl RewritePass for OrderingPropagation {
    fn name(&self) -> &str {
        "ordering_propagation"
    }

    fn description(&self) -> &str {
        "Drops unobservable sorts and makes required ordering explicit"
    }

    fn rewrite(&self, plan: Plan, _capabilities: &Capabilities) -> Result<Plan, CompileError> {
        let mut propagator = Propagator {
            plan: &plan,
            builder: PlanBuilder::new(),
            memo: BTreeMap::new(),
            dropped: 0,
            inserted: 0,
        };
        let root = propagator.visit(plan.root(), true)?;
        let root = propagator.make_explicit(root)?;
        debug!(
            dropped = propagator.dropped,
            inserted = propagator.inserted,
            "propagated ordering"
        );
        propagator.builder.finish(root)
    }
}

struct Propagator<'a> {
    plan: &'a Plan,
    builder: PlanBuilder,
    memo: BTreeMap<(NodeId, bool), NodeId>,
    dropped: usize,
    inserted: usize,
}

impl Propagator<'_> {
    fn visit(&mut self, id: NodeId, required: bool) -> Result<NodeId, CompileError> {
        if let Some(done) = self.memo.get(&(id, required)) {
            return Ok(*done);
        }
        let plan = self.plan;
        let kind = plan.kind(id)?;

        let new = match kind {
            PlanKind::Sort { source, .. } if !required => {
                self.dropped += 1;
                self.visit(*source, false)?
            }
            _ => {
                let flags = child_requirements(kind, required);
                let mut children = Vec::with_capacity(flags.len());
                for (child, needs_order) in kind.children().into_iter().zip(flags) {
                    children.push(self.visit(child, needs_order)?);
                }
                if matches!(
                    kind,
                    PlanKind::Skip { .. }
                        | PlanKind::Take { .. }
                        | PlanKind::Paging { .. }
                        | PlanKind::Seek { .. }
                ) {
                    for child in &mut children {
                        *child = self.make_explicit(*child)?;
                    }
                }
                let mut remaining = children.into_iter();
                let rebuilt = kind.map_children(|old| remaining.next().unwrap_or(old));
                self.builder.add(rebuilt)?
            }
        };
        self.memo.insert((id, required), new);
        Ok(new)
    }

    /// Wrap `id` in a sort on its own order unless that order is already
    /// established by a sort below.
    fn make_explicit(&mut self, id: NodeId) -> Result<NodeId, CompileError> {
        let order = self.builder.schema(id)?.order.clone();
        if order.is_empty() || has_explicit_order(&self.builder, id)? {
            return Ok(id);
        }
        self.inserted += 1;
        self.builder.sort(id, order)
    }
}

/// Whether each child's order must be kept, left before right.
fn child_requirements(kind: &PlanKind, required: bool) -> Vec<bool> {
    let operator = kind.operator();
    match kind {
        PlanKind::Sort { .. } => vec![false],
        PlanKind::RowNumber { .. } => vec![required],
        PlanKind::Join { .. } | PlanKind::PredicateJoin { .. } | PlanKind::Apply { .. } => {
            vec![required, false]
        }
        _ if operator.is_order_sensitive() => vec![true],
        _ if operator.is_order_preserving() => vec![required],
        _ => vec![false; kind.children().len()],
    }
}

fn has_explicit_order(builder: &PlanBuilder, id: NodeId) -> Result<bool, CompileError> {
    let kind = builder.kind(id)?;
    match kind {
        PlanKind::Sort { .. } => Ok(true),
        PlanKind::Join { left, .. }
        | PlanKind::PredicateJoin { left, .. }
        | PlanKind::Apply { left, .. } => has_explicit_order(builder, *left),
        _ if kind.operator().is_order_preserving() => match kind.children().first() {
            Some(source) => has_explicit_order(builder, *source),
            None => Ok(false),
        },
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{AggregateColumn, AggregateFunction, Column, OrderKey, SetKind};
    use crate::value::SemanticType;

    fn items(b: &mut PlanBuilder, key: Vec<OrderKey>) -> NodeId {
        b.index(
            "items",
            vec![
                Column::new("id", SemanticType::Int64),
                Column::new("kind", SemanticType::String),
            ],
            key,
        )
        .unwrap()
    }

    fn run(plan: Plan) -> Plan {
        OrderingPropagation
            .rewrite(plan, &Capabilities::postgres())
            .unwrap()
    }

    #[test]
    fn test_sort_under_aggregate_is_dropped() {
        let mut b = PlanBuilder::new();
        let scan = items(&mut b, vec![]);
        let sorted = b.sort(scan, vec![OrderKey::desc(0)]).unwrap();
        let agg = b
            .add(PlanKind::Aggregate {
                source: sorted,
                group_by: vec![1],
                aggregates: vec![AggregateColumn {
                    function: AggregateFunction::Count,
                    column: None,
                    name: "n".into(),
                }],
            })
            .unwrap();
        let out = run(b.finish(agg).unwrap());
        let PlanKind::Aggregate { source, .. } = out.kind(out.root()).unwrap() else {
            panic!("expected aggregate");
        };
        assert!(matches!(out.kind(*source).unwrap(), PlanKind::Index(_)));
    }

    #[test]
    fn test_sort_under_union_is_dropped() {
        let mut b = PlanBuilder::new();
        let scan = items(&mut b, vec![]);
        let sorted = b.sort(scan, vec![OrderKey::asc(1)]).unwrap();
        let union = b.set(SetKind::Union, sorted, scan).unwrap();
        let out = run(b.finish(union).unwrap());
        assert!(out
            .post_order()
            .iter()
            .all(|id| !matches!(out.kind(*id).unwrap(), PlanKind::Sort { .. })));
    }

    #[test]
    fn test_take_gets_explicit_sort_over_index_key() {
        let mut b = PlanBuilder::new();
        let scan = items(&mut b, vec![OrderKey::asc(0)]);
        let take = b.take(scan, 3u64).unwrap();
        let out = run(b.finish(take).unwrap());
        let PlanKind::Take { source, .. } = out.kind(out.root()).unwrap() else {
            panic!("expected take at root");
        };
        let PlanKind::Sort { order, .. } = out.kind(*source).unwrap() else {
            panic!("expected inserted sort");
        };
        assert_eq!(order, &vec![OrderKey::asc(0)]);
    }

    #[test]
    fn test_root_index_order_becomes_explicit() {
        let mut b = PlanBuilder::new();
        let scan = items(&mut b, vec![OrderKey::asc(0)]);
        let filtered = b
            .filter(
                scan,
                crate::plan::Expr::eq(
                    crate::plan::Expr::column(1),
                    crate::plan::Expr::literal("a"),
                ),
            )
            .unwrap();
        let out = run(b.finish(filtered).unwrap());
        assert!(matches!(
            out.kind(out.root()).unwrap(),
            PlanKind::Sort { .. }
        ));
    }

    #[test]
    fn test_required_root_sort_is_kept_once() {
        let mut b = PlanBuilder::new();
        let scan = items(&mut b, vec![]);
        let sorted = b.sort(scan, vec![OrderKey::desc(1)]).unwrap();
        let plan = b.finish(sorted).unwrap();
        let out = run(plan.clone());
        assert_eq!(out, plan);
    }
}
