use std::collections::BTreeSet;

use tracing::debug;

use super::RewritePass;
use crate::capability::Capabilities;
use crate::error::CompileError;
use crate::plan::{
    AggregateColumn, ApplyType, CalculatedColumn, Expr, NodeId, OrderKey, Plan, PlanBuilder,
    PlanKind,
};

/// Old output column → new output column, `None` when dropped.
type ColumnMap = Vec<Option<usize>>;

/// Removes columns no ancestor consumes.
///
/// Walks top-down carrying the set of output columns the parent needs. A
/// node's own order columns are always kept so order metadata survives.
/// Distinct and set operations need every input column; the left side of an
/// apply is kept whole because correlated references address it by position.
pub struct ColumnPruning;

impl RewritePass for ColumnPruning {
    fn name(&self) -> &str {
        "column_pruning"
    }

    fn description(&self) -> &str {
        "Drops output columns never consumed by an ancestor"
    }

    fn rewrite(&self, plan: Plan, _capabilities: &Capabilities) -> Result<Plan, CompileError> {
        let before = plan.post_order().len();
        let all = (0..plan.root_schema()?.arity()).collect();
        let mut pruner = Pruner {
            plan: &plan,
            builder: PlanBuilder::new(),
        };
        let (root, _) = pruner.prune(plan.root(), all)?;
        let pruned = pruner.builder.finish(root)?;
        debug!(
            nodes_before = before,
            nodes_after = pruned.post_order().len(),
            "pruned redundant columns"
        );
        Ok(pruned)
    }
}

struct Pruner<'a> {
    plan: &'a Plan,
    builder: PlanBuilder,
}

fn identity(arity: usize) -> ColumnMap {
    (0..arity).map(Some).collect()
}

fn mapped(map: &ColumnMap, column: usize) -> Result<usize, CompileError> {
    map.get(column).copied().flatten().ok_or_else(|| {
        CompileError::InvalidPlan(format!(
            "column {} was pruned but is still referenced",
            column
        ))
    })
}

fn remap_expr(expr: &Expr, map: &ColumnMap) -> Result<Expr, CompileError> {
    for column in expr.columns() {
        mapped(map, column)?;
    }
    Ok(expr.remap_columns(&|c| map.get(c).copied().flatten().unwrap_or(c)))
}

fn remap_keys(keys: &[OrderKey], map: &ColumnMap) -> Result<Vec<OrderKey>, CompileError> {
    keys.iter()
        .map(|k| {
            Ok(OrderKey {
                column: mapped(map, k.column)?,
                direction: k.direction,
            })
        })
        .collect()
}

fn remap_indices(indices: &[usize], map: &ColumnMap) -> Result<Vec<usize>, CompileError> {
    indices.iter().map(|i| mapped(map, *i)).collect()
}

/// Columns below `arity`, and those at or above it shifted down.
fn split(required: &BTreeSet<usize>, arity: usize) -> (BTreeSet<usize>, BTreeSet<usize>) {
    let left = required.iter().copied().filter(|c| *c < arity).collect();
    let right = required
        .iter()
        .copied()
        .filter(|c| *c >= arity)
        .map(|c| c - arity)
        .collect();
    (left, right)
}

/// Output map of a binary node from its sides' maps.
fn concat(left: &ColumnMap, right: &ColumnMap, new_left_arity: usize) -> ColumnMap {
    left.iter()
        .copied()
        .chain(right.iter().map(|c| c.map(|i| i + new_left_arity)))
        .collect()
}

impl Pruner<'_> {
    fn prune(
        &mut self,
        id: NodeId,
        mut required: BTreeSet<usize>,
    ) -> Result<(NodeId, ColumnMap), CompileError> {
        let plan = self.plan;
        let node = plan.node(id)?;
        let arity = node.schema.arity();
        required.extend(node.schema.order.iter().map(|k| k.column));
        required.retain(|c| *c < arity);
        if required.is_empty() && arity > 0 {
            required.insert(0);
        }
        let all = || (0..arity).collect::<BTreeSet<usize>>();

        match &node.kind {
            PlanKind::Index(_) | PlanKind::Store { source: None, .. } => {
                let new = self.builder.add(node.kind.clone())?;
                self.narrow(new, arity, &required)
            }
            PlanKind::Store {
                name,
                columns,
                source: Some(source),
            } => {
                let source_arity = self.plan.schema(*source)?.arity();
                let (child, _) = self.prune(*source, (0..source_arity).collect())?;
                let new = self.builder.add(PlanKind::Store {
                    name: name.clone(),
                    columns: columns.clone(),
                    source: Some(child),
                })?;
                self.narrow(new, arity, &required)
            }
            PlanKind::Select { source, columns } => {
                let kept: Vec<usize> = required.iter().copied().collect();
                let need = kept.iter().map(|p| columns[*p]).collect();
                let (child, child_map) = self.prune(*source, need)?;
                let new_columns = kept
                    .iter()
                    .map(|p| mapped(&child_map, columns[*p]))
                    .collect::<Result<Vec<_>, _>>()?;
                let map = (0..arity)
                    .map(|p| kept.iter().position(|k| *k == p))
                    .collect();
                let child_arity = self.builder.arity(child)?;
                if new_columns.iter().copied().eq(0..child_arity) {
                    return Ok((child, map));
                }
                let new = self.builder.select(child, new_columns)?;
                Ok((new, map))
            }
            PlanKind::Filter { source, predicate } => {
                let mut need = required;
                predicate.collect_columns(&mut need);
                let (child, map) = self.prune(*source, need)?;
                let predicate = remap_expr(predicate, &map)?;
                let new = self.builder.filter(child, predicate)?;
                Ok((new, map))
            }
            PlanKind::Calculate { source, columns } => {
                let n = arity - columns.len();
                let (mut need, calculated) = split(&required, n);
                for j in &calculated {
                    columns[*j].expr.collect_columns(&mut need);
                }
                let (child, child_map) = self.prune(*source, need)?;
                let child_arity = self.builder.arity(child)?;

                let mut map = child_map.clone();
                let mut kept = Vec::new();
                for (j, column) in columns.iter().enumerate() {
                    if calculated.contains(&j) {
                        map.push(Some(child_arity + kept.len()));
                        kept.push(CalculatedColumn {
                            expr: remap_expr(&column.expr, &child_map)?,
                            ..column.clone()
                        });
                    } else {
                        map.push(None);
                    }
                }
                if kept.is_empty() {
                    return Ok((child, map));
                }
                let new = self.builder.add(PlanKind::Calculate {
                    source: child,
                    columns: kept,
                })?;
                Ok((new, map))
            }
            PlanKind::Alias { source, alias } => {
                let (child, map) = self.prune(*source, required)?;
                let new = self.builder.add(PlanKind::Alias {
                    source: child,
                    alias: alias.clone(),
                })?;
                Ok((new, map))
            }
            PlanKind::Sort { source, order } => {
                let mut need = required;
                need.extend(order.iter().map(|k| k.column));
                let (child, map) = self.prune(*source, need)?;
                let order = remap_keys(order, &map)?;
                let new = self.builder.sort(child, order)?;
                Ok((new, map))
            }
            PlanKind::Distinct { source } => {
                let (child, map) = self.prune(*source, all())?;
                let new = self.builder.add(PlanKind::Distinct { source: child })?;
                Ok((new, map))
            }
            PlanKind::Skip { source, .. }
            | PlanKind::Take { source, .. }
            | PlanKind::Paging { source, .. }
            | PlanKind::Lock { source, .. } => {
                let (child, map) = self.prune(*source, required)?;
                let new = self.builder.add(node.kind.map_children(|_| child))?;
                Ok((new, map))
            }
            PlanKind::Seek {
                source,
                key_columns,
                key,
            } => {
                let mut need = required;
                need.extend(key_columns.iter().copied());
                let (child, map) = self.prune(*source, need)?;
                let key_columns = remap_indices(key_columns, &map)?;
                let new = self.builder.seek(child, key_columns, key.clone())?;
                Ok((new, map))
            }
            PlanKind::Aggregate {
                source,
                group_by,
                aggregates,
            } => {
                let g = group_by.len();
                let (_, mut wanted) = split(&required, g);
                if wanted.is_empty() && group_by.is_empty() {
                    wanted = (0..aggregates.len()).collect();
                }
                let mut need: BTreeSet<usize> = group_by.iter().copied().collect();
                need.extend(wanted.iter().filter_map(|j| aggregates[*j].column));
                let (child, child_map) = self.prune(*source, need)?;

                let mut map = identity(g);
                let mut kept = Vec::new();
                for (j, aggregate) in aggregates.iter().enumerate() {
                    if wanted.contains(&j) {
                        map.push(Some(g + kept.len()));
                        kept.push(AggregateColumn {
                            column: aggregate
                                .column
                                .map(|c| mapped(&child_map, c))
                                .transpose()?,
                            ..aggregate.clone()
                        });
                    } else {
                        map.push(None);
                    }
                }
                let new = self.builder.add(PlanKind::Aggregate {
                    source: child,
                    group_by: remap_indices(group_by, &child_map)?,
                    aggregates: kept,
                })?;
                Ok((new, map))
            }
            PlanKind::Join {
                left,
                right,
                join_type,
                equal_pairs,
            } => {
                let nl = self.plan.schema(*left)?.arity();
                let (mut left_need, mut right_need) = split(&required, nl);
                for (l, r) in equal_pairs {
                    left_need.insert(*l);
                    right_need.insert(*r);
                }
                let (new_left, left_map) = self.prune(*left, left_need)?;
                let (new_right, right_map) = self.prune(*right, right_need)?;
                let equal_pairs = equal_pairs
                    .iter()
                    .map(|(l, r)| Ok((mapped(&left_map, *l)?, mapped(&right_map, *r)?)))
                    .collect::<Result<Vec<_>, CompileError>>()?;
                let map = concat(&left_map, &right_map, self.builder.arity(new_left)?);
                let new = self
                    .builder
                    .join(new_left, new_right, *join_type, equal_pairs)?;
                Ok((new, map))
            }
            PlanKind::PredicateJoin {
                left,
                right,
                join_type,
                predicate,
            } => {
                let nl = self.plan.schema(*left)?.arity();
                let mut need = required;
                predicate.collect_columns(&mut need);
                let (left_need, right_need) = split(&need, nl);
                let (new_left, left_map) = self.prune(*left, left_need)?;
                let (new_right, right_map) = self.prune(*right, right_need)?;
                let map = concat(&left_map, &right_map, self.builder.arity(new_left)?);
                let predicate = remap_expr(predicate, &map)?;
                let new = self.builder.add(PlanKind::PredicateJoin {
                    left: new_left,
                    right: new_right,
                    join_type: *join_type,
                    predicate,
                })?;
                Ok((new, map))
            }
            PlanKind::Apply {
                left,
                right,
                apply_type,
            } => {
                let nl = self.plan.schema(*left)?.arity();
                let (new_left, left_map) = self.prune(*left, (0..nl).collect())?;
                let right_need = match apply_type {
                    ApplyType::Cross | ApplyType::Outer => split(&required, nl).1,
                    ApplyType::Existing | ApplyType::NotExisting => BTreeSet::new(),
                };
                let (new_right, right_map) = self.prune(*right, right_need)?;
                let map = match apply_type {
                    ApplyType::Cross | ApplyType::Outer => {
                        concat(&left_map, &right_map, self.builder.arity(new_left)?)
                    }
                    ApplyType::Existing | ApplyType::NotExisting => left_map,
                };
                let new = self.builder.add(PlanKind::Apply {
                    left: new_left,
                    right: new_right,
                    apply_type: *apply_type,
                })?;
                Ok((new, map))
            }
            PlanKind::RowNumber {
                source,
                column,
                order,
            } => {
                let n = arity - 1;
                let (mut need, extra) = split(&required, n);
                if extra.is_empty() {
                    let (child, mut map) = self.prune(*source, need)?;
                    map.push(None);
                    return Ok((child, map));
                }
                need.extend(order.iter().map(|k| k.column));
                let (child, mut map) = self.prune(*source, need)?;
                let order = remap_keys(order, &map)?;
                map.push(Some(self.builder.arity(child)?));
                let new = self.builder.add(PlanKind::RowNumber {
                    source: child,
                    column: column.clone(),
                    order,
                })?;
                Ok((new, map))
            }
            PlanKind::Set { kind, left, right } => {
                let (new_left, map) = self.prune(*left, all())?;
                let (new_right, _) = self.prune(*right, all())?;
                let new = self.builder.set(*kind, new_left, new_right)?;
                Ok((new, map))
            }
            PlanKind::Existence { source, column } => {
                let (child, _) = self.prune(*source, BTreeSet::new())?;
                let new = self.builder.add(PlanKind::Existence {
                    source: child,
                    column: column.clone(),
                })?;
                Ok((new, identity(1)))
            }
            PlanKind::Include {
                source,
                filter_columns,
                rows,
                algorithm,
                column,
            } => {
                let n = arity - 1;
                let (mut need, extra) = split(&required, n);
                if extra.is_empty() {
                    let (child, mut map) = self.prune(*source, need)?;
                    map.push(None);
                    return Ok((child, map));
                }
                need.extend(filter_columns.iter().copied());
                let (child, mut map) = self.prune(*source, need)?;
                let filter_columns = remap_indices(filter_columns, &map)?;
                map.push(Some(self.builder.arity(child)?));
                let new = self.builder.add(PlanKind::Include {
                    source: child,
                    filter_columns,
                    rows: rows.clone(),
                    algorithm: *algorithm,
                    column: column.clone(),
                })?;
                Ok((new, map))
            }
        }
    }

    /// Project a leaf down to the required columns.
    fn narrow(
        &mut self,
        id: NodeId,
        arity: usize,
        required: &BTreeSet<usize>,
    ) -> Result<(NodeId, ColumnMap), CompileError> {
        if required.len() == arity {
            return Ok((id, identity(arity)));
        }
        let kept: Vec<usize> = required.iter().copied().collect();
        let map = (0..arity)
            .map(|c| kept.iter().position(|k| *k == c))
            .collect();
        let new = self.builder.select(id, kept)?;
        Ok((new, map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Column, JoinType};
    use crate::value::SemanticType;

    fn table(b: &mut PlanBuilder, name: &str, columns: &[&str]) -> NodeId {
        b.index(
            name,
            columns
                .iter()
                .map(|c| Column::new(*c, SemanticType::Int64))
                .collect(),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_unused_calculation_is_dropped() {
        let mut b = PlanBuilder::new();
        let scan = table(&mut b, "t", &["a", "b", "c"]);
        let calc = b
            .calculate(
                scan,
                "d",
                SemanticType::Int64,
                Expr::binary(Expr::column(0), crate::plan::BinaryOp::Add, Expr::literal(1i64)),
            )
            .unwrap();
        let narrowed = b.select(calc, vec![1]).unwrap();
        let plan = b.finish(narrowed).unwrap();

        let out = ColumnPruning
            .rewrite(plan, &Capabilities::postgres())
            .unwrap();
        let PlanKind::Select { source, columns } = out.kind(out.root()).unwrap() else {
            panic!("expected select");
        };
        assert_eq!(columns, &vec![1]);
        assert!(matches!(out.kind(*source).unwrap(), PlanKind::Index(_)));
        assert_eq!(out.post_order().len(), 2);
    }

    #[test]
    fn test_join_sides_are_narrowed() {
        let mut b = PlanBuilder::new();
        let a = table(&mut b, "a", &["id", "name", "x"]);
        let c = table(&mut b, "c", &["id", "a_id", "y"]);
        let join = b.join(a, c, JoinType::Inner, vec![(0, 1)]).unwrap();
        let narrowed = b.select(join, vec![1, 4]).unwrap();
        let plan = b.finish(narrowed).unwrap();

        let out = ColumnPruning
            .rewrite(plan, &Capabilities::postgres())
            .unwrap();
        let names: Vec<String> = out
            .root_schema()
            .unwrap()
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["name", "a_id"]);

        let PlanKind::Select { source, columns } = out.kind(out.root()).unwrap() else {
            panic!("expected select");
        };
        assert_eq!(columns, &vec![1, 2]);
        let PlanKind::Join { equal_pairs, .. } = out.kind(*source).unwrap() else {
            panic!("expected join");
        };
        assert_eq!(equal_pairs, &vec![(0, 0)]);
        assert_eq!(out.schema(*source).unwrap().arity(), 3);
    }

    #[test]
    fn test_distinct_keeps_every_column() {
        let mut b = PlanBuilder::new();
        let scan = table(&mut b, "t", &["a", "b"]);
        let distinct = b.add(PlanKind::Distinct { source: scan }).unwrap();
        let narrowed = b.select(distinct, vec![0]).unwrap();
        let plan = b.finish(narrowed).unwrap();

        let out = ColumnPruning
            .rewrite(plan, &Capabilities::postgres())
            .unwrap();
        let PlanKind::Select { source, .. } = out.kind(out.root()).unwrap() else {
            panic!("expected select");
        };
        assert_eq!(out.schema(*source).unwrap().arity(), 2);
    }
}
