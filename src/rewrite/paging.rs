use tracing::debug;

use super::RewritePass;
use crate::capability::Capabilities;
use crate::error::CompileError;
use crate::plan::{BinaryOp, Expr, NodeId, OrderKey, Plan, PlanBuilder, PlanKind, RowCount};

/// Name of the synthetic ordinal column added by manual paging.
pub const ORDINAL_COLUMN: &str = "__ordinal";

/// Emulates skip/take/paging with a row number and a range filter on targets
/// without native offset/limit:
///
/// * skip: `ordinal > skip`
/// * take: `ordinal <= take`
/// * paging: `ordinal BETWEEN skip + 1 AND skip + take`
///
/// Counts stay late-bound so one template serves every page.
pub struct PagingNormalization;

impl RewritePass for PagingNormalization {
    fn name(&self) -> &str {
        "paging_normalization"
    }

    fn description(&self) -> &str {
        "Replaces skip/take/paging with a row-number range filter"
    }

    fn rewrite(&self, plan: Plan, capabilities: &Capabilities) -> Result<Plan, CompileError> {
        if capabilities.has_native_paging() {
            return Ok(plan);
        }

        let mut replaced = 0usize;
        let rewritten = plan.rebuild(|builder, kind| {
            let range = match &kind {
                PlanKind::Skip { source, count } => Some((*source, Range::After(count.clone()))),
                PlanKind::Take { source, count } => Some((*source, Range::UpTo(count.clone()))),
                PlanKind::Paging { source, skip, take } => Some((
                    *source,
                    Range::Between(skip.clone(), take.clone()),
                )),
                _ => None,
            };
            match range {
                Some((source, range)) => {
                    replaced += 1;
                    emulate(builder, source, range)
                }
                None => builder.add(kind),
            }
        })?;

        if replaced > 0 {
            debug!(replaced, "emulated paging with row numbers");
        }
        Ok(rewritten)
    }
}

enum Range {
    After(RowCount),
    UpTo(RowCount),
    Between(RowCount, RowCount),
}

fn emulate(builder: &mut PlanBuilder, source: NodeId, range: Range) -> Result<NodeId, CompileError> {
    let (filtered, columns) = ranged(builder, source, range)?;
    builder.select(filtered, columns)
}

/// Numbers and range-filters the rows of `source`. Returns the filtered node
/// and the positions of `source`'s columns in it.
///
/// A select that narrows away sort keys only reports the surviving prefix as
/// its order, so rows are numbered below it where the full keys are visible.
fn ranged(
    builder: &mut PlanBuilder,
    source: NodeId,
    range: Range,
) -> Result<(NodeId, Vec<usize>), CompileError> {
    let narrowing = match builder.kind(source)? {
        PlanKind::Select {
            source: inner,
            columns,
        } => Some((*inner, columns.clone())),
        _ => None,
    };
    if let Some((inner, columns)) = narrowing {
        if builder.schema(source)?.order.len() < builder.schema(inner)?.order.len() {
            let (filtered, below) = ranged(builder, inner, range)?;
            let positions = columns.iter().map(|c| below[*c]).collect();
            return Ok((filtered, positions));
        }
    }

    let schema = builder.schema(source)?;
    let arity = schema.arity();
    let order: Vec<OrderKey> = schema.order.clone();

    let numbered = builder.add(PlanKind::RowNumber {
        source,
        column: ORDINAL_COLUMN.to_string(),
        order,
    })?;

    let ordinal = Expr::column(arity);
    let predicate = match range {
        Range::After(skip) => Expr::binary(ordinal, BinaryOp::Gt, Expr::RowCount(skip)),
        Range::UpTo(take) => Expr::binary(ordinal, BinaryOp::LtEq, Expr::RowCount(take)),
        Range::Between(skip, take) => Expr::Between {
            expr: Box::new(ordinal),
            low: Box::new(Expr::RowCount(skip.clone().plus(RowCount::Literal(1)))),
            high: Box::new(Expr::RowCount(skip.plus(take))),
        },
    };
    let filtered = builder.filter(numbered, predicate)?;
    Ok((filtered, (0..arity).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::PagingSupport;
    use crate::plan::Column;
    use crate::value::SemanticType;

    fn paged() -> Plan {
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
        let page = b
            .add(PlanKind::Paging {
                source: scan,
                skip: RowCount::parameter("skip"),
                take: RowCount::parameter("take"),
            })
            .unwrap();
        b.finish(page).unwrap()
    }

    #[test]
    fn test_paging_becomes_row_number_range() {
        let out = PagingNormalization
            .rewrite(paged(), &Capabilities::sqlite().with_paging(PagingSupport::None))
            .unwrap();

        let PlanKind::Select { source, columns } = out.kind(out.root()).unwrap() else {
            panic!("expected select at root");
        };
        assert_eq!(columns, &vec![0, 1]);
        let PlanKind::Filter { source, predicate } = out.kind(*source).unwrap() else {
            panic!("expected filter");
        };
        match predicate {
            Expr::Between { expr, low, high } => {
                assert_eq!(**expr, Expr::column(2));
                assert_eq!(
                    **low,
                    Expr::RowCount(RowCount::parameter("skip").plus(RowCount::Literal(1)))
                );
                assert_eq!(
                    **high,
                    Expr::RowCount(RowCount::parameter("skip").plus(RowCount::parameter("take")))
                );
            }
            other => panic!("unexpected predicate {:?}", other),
        }
        let PlanKind::RowNumber { order, column, .. } = out.kind(*source).unwrap() else {
            panic!("expected row number");
        };
        assert_eq!(column, ORDINAL_COLUMN);
        assert_eq!(order, &vec![OrderKey::asc(0)]);
        assert_eq!(out.root_schema().unwrap().order, vec![OrderKey::asc(0)]);
    }

    #[test]
    fn test_rows_are_numbered_below_select_hiding_sort_keys() {
        let mut b = PlanBuilder::new();
        let scan = b
            .index(
                "items",
                vec![
                    Column::new("id", SemanticType::Int64),
                    Column::new("name", SemanticType::String),
                ],
                vec![],
            )
            .unwrap();
        let sorted = b.sort(scan, vec![OrderKey::desc(0)]).unwrap();
        let names = b.select(sorted, vec![1]).unwrap();
        let take = b.take(names, 3u64).unwrap();
        let plan = b.finish(take).unwrap();

        let out = PagingNormalization
            .rewrite(plan, &Capabilities::sqlite().with_paging(PagingSupport::None))
            .unwrap();

        let PlanKind::Select { source, columns } = out.kind(out.root()).unwrap() else {
            panic!("expected select at root");
        };
        assert_eq!(columns, &vec![1]);
        let PlanKind::Filter { source, .. } = out.kind(*source).unwrap() else {
            panic!("expected filter");
        };
        let PlanKind::RowNumber { source, order, .. } = out.kind(*source).unwrap() else {
            panic!("expected row number");
        };
        assert_eq!(order, &vec![OrderKey::desc(0)]);
        assert!(matches!(out.kind(*source).unwrap(), PlanKind::Sort { .. }));
    }

    #[test]
    fn test_native_paging_is_untouched() {
        let plan = paged();
        let out = PagingNormalization
            .rewrite(plan.clone(), &Capabilities::sqlite())
            .unwrap();
        assert_eq!(out, plan);
    }
}
