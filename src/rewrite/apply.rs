use tracing::debug;

use super::RewritePass;
use crate::capability::{ApplySupport, Capabilities};
use crate::error::CompileError;
use crate::plan::{ApplyType, BinaryOp, Expr, JoinType, NodeId, Plan, PlanBuilder, PlanKind};

/// Turns correlated applies into plain joins on targets without lateral
/// support.
///
/// Only cross and outer applies whose right side is a chain of filters over
/// an uncorrelated subtree qualify, and every correlated conjunct must be a
/// `column = outer column` equality. Anything else is left for the compiler,
/// which rejects it on such targets.
pub struct ApplyElimination;

impl RewritePass for ApplyElimination {
    fn name(&self) -> &str {
        "apply_elimination"
    }

    fn description(&self) -> &str {
        "Rewrites equi-correlated applies into joins"
    }

    fn rewrite(&self, plan: Plan, capabilities: &Capabilities) -> Result<Plan, CompileError> {
        if capabilities.apply != ApplySupport::None {
            return Ok(plan);
        }

        let mut eliminated = 0usize;
        let rewritten = plan.rebuild(|builder, kind| {
            if let PlanKind::Apply {
                left,
                right,
                apply_type: apply_type @ (ApplyType::Cross | ApplyType::Outer),
            } = &kind
            {
                if let Some(join) = decorrelate(builder, *left, *right, *apply_type)? {
                    eliminated += 1;
                    return builder.add(join);
                }
            }
            builder.add(kind)
        })?;

        if eliminated > 0 {
            debug!(eliminated, "replaced applies with joins");
        }
        Ok(rewritten)
    }
}

fn decorrelate(
    builder: &mut PlanBuilder,
    left: NodeId,
    right: NodeId,
    apply_type: ApplyType,
) -> Result<Option<PlanKind>, CompileError> {
    let mut predicates = Vec::new();
    let mut base = right;
    while let PlanKind::Filter { source, predicate } = builder.kind(base)? {
        predicates.push(predicate.clone());
        base = *source;
    }
    if is_correlated(builder, base)? {
        return Ok(None);
    }

    let mut equal_pairs = Vec::new();
    let mut residual = Vec::new();
    for conjunct in predicates.into_iter().flat_map(Expr::into_conjuncts) {
        if !conjunct.has_outer_references() {
            residual.push(conjunct);
            continue;
        }
        match correlated_pair(&conjunct) {
            Some(pair) => equal_pairs.push(pair),
            None => return Ok(None),
        }
    }

    let right = match Expr::conjunction(residual) {
        Some(predicate) => builder.filter(base, predicate)?,
        None => base,
    };
    let join_type = match apply_type {
        ApplyType::Outer => JoinType::LeftOuter,
        _ => JoinType::Inner,
    };
    Ok(Some(PlanKind::Join {
        left,
        right,
        join_type,
        equal_pairs,
    }))
}

/// `(outer column, inner column)` of a `column = outer` conjunct.
fn correlated_pair(expr: &Expr) -> Option<(usize, usize)> {
    match expr {
        Expr::Binary {
            op: BinaryOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(inner), Expr::Outer(outer)) | (Expr::Outer(outer), Expr::Column(inner)) => {
                Some((*outer, *inner))
            }
            _ => None,
        },
        _ => None,
    }
}

fn is_correlated(builder: &PlanBuilder, id: NodeId) -> Result<bool, CompileError> {
    let kind = builder.kind(id)?;
    if matches!(kind, PlanKind::Apply { .. })
        || kind.expressions().iter().any(|e| e.has_outer_references())
    {
        return Ok(true);
    }
    for child in kind.children() {
        if is_correlated(builder, child)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Column;
    use crate::value::SemanticType;

    fn apply_plan(correlation: Expr) -> Plan {
        let mut b = PlanBuilder::new();
        let customers = b
            .index(
                "customers",
                vec![
                    Column::new("id", SemanticType::Int64),
                    Column::new("name", SemanticType::String),
                ],
                vec![],
            )
            .unwrap();
        let orders = b
            .index(
                "orders",
                vec![
                    Column::new("id", SemanticType::Int64),
                    Column::new("customer_id", SemanticType::Int64),
                    Column::new("total", SemanticType::Float64),
                ],
                vec![],
            )
            .unwrap();
        let filtered = b
            .filter(
                orders,
                Expr::and(
                    correlation,
                    Expr::gt(Expr::column(2), Expr::literal(100.0)),
                ),
            )
            .unwrap();
        let apply = b
            .add(PlanKind::Apply {
                left: customers,
                right: filtered,
                apply_type: ApplyType::Outer,
            })
            .unwrap();
        b.finish(apply).unwrap()
    }

    #[test]
    fn test_equi_correlated_apply_becomes_join() {
        let plan = apply_plan(Expr::eq(Expr::column(1), Expr::outer(0)));
        let out = ApplyElimination
            .rewrite(plan, &Capabilities::sqlite())
            .unwrap();
        match out.kind(out.root()).unwrap() {
            PlanKind::Join {
                right,
                join_type,
                equal_pairs,
                ..
            } => {
                assert_eq!(*join_type, JoinType::LeftOuter);
                assert_eq!(equal_pairs, &vec![(0, 1)]);
                assert!(matches!(out.kind(*right).unwrap(), PlanKind::Filter { .. }));
            }
            other => panic!("expected join, got {:?}", other),
        }
        assert_eq!(out.root_schema().unwrap().arity(), 5);
    }

    #[test]
    fn test_non_equi_correlation_is_kept() {
        let plan = apply_plan(Expr::gt(Expr::column(1), Expr::outer(0)));
        let out = ApplyElimination
            .rewrite(plan, &Capabilities::sqlite())
            .unwrap();
        assert!(matches!(
            out.kind(out.root()).unwrap(),
            PlanKind::Apply { .. }
        ));
    }

    #[test]
    fn test_lateral_targets_are_untouched() {
        let plan = apply_plan(Expr::eq(Expr::column(1), Expr::outer(0)));
        let out = ApplyElimination
            .rewrite(plan.clone(), &Capabilities::postgres())
            .unwrap();
        assert_eq!(out, plan);
    }
}
