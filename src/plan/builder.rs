//! Bottom-up plan construction with schema derivation at insert time.
use std::collections::BTreeSet;

use super::expr::{Expr, RowCount};
use super::node::*;
use super::{Plan, PlanArena, PlanNode};
use crate::error::CompileError;
use crate::value::SemanticType;

type Result<T> = std::result::Result<T, CompileError>;

fn invalid(message: impl Into<String>) -> CompileError {
    CompileError::InvalidPlan(message.into())
}

/// Appends nodes to an arena, deriving and validating each node's schema
/// from its already-inserted children.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    arena: PlanArena,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: PlanKind) -> Result<NodeId> {
        let schema = self.derive_schema(&kind)?;
        let id = NodeId(self.arena.nodes.len() as u32);
        self.arena.nodes.push(PlanNode { kind, schema });
        Ok(id)
    }

    pub fn kind(&self, id: NodeId) -> Result<&PlanKind> {
        self.arena.get(id).map(|n| &n.kind)
    }

    pub fn schema(&self, id: NodeId) -> Result<&Schema> {
        self.arena.get(id).map(|n| &n.schema)
    }

    pub fn arity(&self, id: NodeId) -> Result<usize> {
        self.schema(id).map(Schema::arity)
    }

    pub fn finish(self, root: NodeId) -> Result<Plan> {
        self.arena.get(root)?;
        Ok(Plan {
            arena: self.arena,
            root,
        })
    }

    pub fn index(
        &mut self,
        table: impl Into<String>,
        columns: Vec<Column>,
        key: Vec<OrderKey>,
    ) -> Result<NodeId> {
        self.add(PlanKind::Index(IndexScan {
            table: table.into(),
            columns,
            kind: IndexKind::Primary,
            key,
        }))
    }

    pub fn select(&mut self, source: NodeId, columns: Vec<usize>) -> Result<NodeId> {
        self.add(PlanKind::Select { source, columns })
    }

    pub fn filter(&mut self, source: NodeId, predicate: Expr) -> Result<NodeId> {
        self.add(PlanKind::Filter { source, predicate })
    }

    pub fn calculate(
        &mut self,
        source: NodeId,
        name: impl Into<String>,
        ty: SemanticType,
        expr: Expr,
    ) -> Result<NodeId> {
        self.add(PlanKind::Calculate {
            source,
            columns: vec![CalculatedColumn {
                name: name.into(),
                ty,
                expr,
            }],
        })
    }

    pub fn sort(&mut self, source: NodeId, order: Vec<OrderKey>) -> Result<NodeId> {
        self.add(PlanKind::Sort { source, order })
    }

    pub fn join(
        &mut self,
        left: NodeId,
        right: NodeId,
        join_type: JoinType,
        equal_pairs: Vec<(usize, usize)>,
    ) -> Result<NodeId> {
        self.add(PlanKind::Join {
            left,
            right,
            join_type,
            equal_pairs,
        })
    }

    pub fn skip(&mut self, source: NodeId, count: impl Into<RowCount>) -> Result<NodeId> {
        self.add(PlanKind::Skip {
            source,
            count: count.into(),
        })
    }

    pub fn take(&mut self, source: NodeId, count: impl Into<RowCount>) -> Result<NodeId> {
        self.add(PlanKind::Take {
            source,
            count: count.into(),
        })
    }

    pub fn set(&mut self, kind: SetKind, left: NodeId, right: NodeId) -> Result<NodeId> {
        self.add(PlanKind::Set { kind, left, right })
    }

    pub fn seek(
        &mut self,
        source: NodeId,
        key_columns: Vec<usize>,
        key: impl Into<String>,
    ) -> Result<NodeId> {
        self.add(PlanKind::Seek {
            source,
            key_columns,
            key: key.into(),
        })
    }

    fn derive_schema(&self, kind: &PlanKind) -> Result<Schema> {
        match kind {
            PlanKind::Index(scan) => {
                if scan.columns.is_empty() {
                    return Err(invalid(format!("index on `{}` has no columns", scan.table)));
                }
                check_unique_names(&scan.columns)?;
                check_keys(&scan.key, scan.columns.len(), "index key")?;
                match &scan.kind {
                    IndexKind::Filtered { predicate } => {
                        check_expr(predicate, scan.columns.len(), "index predicate")?
                    }
                    IndexKind::Union { tables } if tables.is_empty() => {
                        return Err(invalid("virtual union index has no tables"))
                    }
                    _ => {}
                }
                Ok(Schema {
                    columns: scan.columns.clone(),
                    order: scan.key.clone(),
                })
            }
            PlanKind::Store {
                name,
                columns,
                source,
            } => {
                if columns.is_empty() {
                    return Err(invalid(format!("store `{}` has no columns", name)));
                }
                check_unique_names(columns)?;
                if let Some(source) = source {
                    let found = self.arity(*source)?;
                    if found != columns.len() {
                        return Err(invalid(format!(
                            "store `{}` declares {} columns but its source has {}",
                            name,
                            columns.len(),
                            found
                        )));
                    }
                }
                Ok(Schema {
                    columns: columns.clone(),
                    order: vec![],
                })
            }
            PlanKind::Select { source, columns } => {
                let input = self.schema(*source)?;
                if columns.is_empty() {
                    return Err(invalid("select keeps no columns"));
                }
                check_indices(columns, input.arity(), "select")?;
                let mut order = Vec::new();
                for key in &input.order {
                    match columns.iter().position(|c| *c == key.column) {
                        Some(position) => order.push(OrderKey {
                            column: position,
                            direction: key.direction,
                        }),
                        None => break,
                    }
                }
                Ok(Schema {
                    columns: columns.iter().map(|i| input.columns[*i].clone()).collect(),
                    order,
                })
            }
            PlanKind::Filter { source, predicate } => {
                let input = self.schema(*source)?;
                check_expr(predicate, input.arity(), "filter predicate")?;
                Ok(input.clone())
            }
            PlanKind::Calculate { source, columns } => {
                let input = self.schema(*source)?;
                let mut schema = input.clone();
                for calculated in columns {
                    check_expr(&calculated.expr, input.arity(), "calculated column")?;
                    schema.columns.push(Column {
                        name: calculated.name.clone(),
                        ty: calculated.ty,
                        nullable: true,
                    });
                }
                Ok(schema)
            }
            PlanKind::Alias { source, alias } => {
                let mut schema = self.schema(*source)?.clone();
                for column in &mut schema.columns {
                    column.name = format!("{}.{}", alias, column.name);
                }
                Ok(schema)
            }
            PlanKind::Sort { source, order } => {
                let input = self.schema(*source)?;
                if order.is_empty() {
                    return Err(invalid("sort has no keys"));
                }
                check_keys(order, input.arity(), "sort key")?;
                Ok(Schema {
                    columns: input.columns.clone(),
                    order: order.clone(),
                })
            }
            PlanKind::Distinct { source }
            | PlanKind::Skip { source, .. }
            | PlanKind::Take { source, .. }
            | PlanKind::Paging { source, .. }
            | PlanKind::Lock { source, .. } => Ok(self.schema(*source)?.clone()),
            PlanKind::Aggregate {
                source,
                group_by,
                aggregates,
            } => {
                let input = self.schema(*source)?;
                check_indices(group_by, input.arity(), "group-by column")?;
                let mut columns: Vec<Column> =
                    group_by.iter().map(|i| input.columns[*i].clone()).collect();
                for aggregate in aggregates {
                    let ty = match (aggregate.function, aggregate.column) {
                        (AggregateFunction::Count, None) => SemanticType::Int64,
                        (_, None) => {
                            return Err(invalid(format!(
                                "{} aggregate `{}` needs an input column",
                                aggregate.function.sql_name(),
                                aggregate.name
                            )))
                        }
                        (function, Some(column)) => {
                            let input_column = input.columns.get(column).ok_or_else(|| {
                                invalid(format!("aggregate column {} out of range", column))
                            })?;
                            match function {
                                AggregateFunction::Count => SemanticType::Int64,
                                AggregateFunction::Avg => SemanticType::Float64,
                                _ => input_column.ty,
                            }
                        }
                    };
                    columns.push(Column {
                        name: aggregate.name.clone(),
                        ty,
                        nullable: aggregate.function != AggregateFunction::Count,
                    });
                }
                if columns.is_empty() {
                    return Err(invalid("aggregate produces no columns"));
                }
                Ok(Schema {
                    columns,
                    order: vec![],
                })
            }
            PlanKind::Join {
                left,
                right,
                join_type,
                equal_pairs,
            } => {
                let (l, r) = (self.schema(*left)?, self.schema(*right)?);
                for (a, b) in equal_pairs {
                    if *a >= l.arity() || *b >= r.arity() {
                        return Err(invalid(format!("join pair ({}, {}) out of range", a, b)));
                    }
                }
                Ok(joined(l, r, *join_type == JoinType::LeftOuter))
            }
            PlanKind::PredicateJoin {
                left,
                right,
                join_type,
                predicate,
            } => {
                let (l, r) = (self.schema(*left)?, self.schema(*right)?);
                check_expr(predicate, l.arity() + r.arity(), "join predicate")?;
                Ok(joined(l, r, *join_type == JoinType::LeftOuter))
            }
            PlanKind::Apply {
                left,
                right,
                apply_type,
            } => {
                let (l, r) = (self.schema(*left)?, self.schema(*right)?);
                match apply_type {
                    ApplyType::Cross => Ok(joined(l, r, false)),
                    ApplyType::Outer => Ok(joined(l, r, true)),
                    ApplyType::Existing | ApplyType::NotExisting => Ok(l.clone()),
                }
            }
            PlanKind::RowNumber {
                source,
                column,
                order,
            } => {
                let input = self.schema(*source)?;
                check_keys(order, input.arity(), "row number key")?;
                let mut schema = input.clone();
                schema
                    .columns
                    .push(Column::new(column.clone(), SemanticType::Int64));
                Ok(schema)
            }
            PlanKind::Set { kind, left, right } => {
                let (l, r) = (self.schema(*left)?, self.schema(*right)?);
                if l.arity() != r.arity() {
                    return Err(invalid(format!(
                        "{:?} inputs have {} and {} columns",
                        kind,
                        l.arity(),
                        r.arity()
                    )));
                }
                let columns = l
                    .columns
                    .iter()
                    .zip(&r.columns)
                    .map(|(a, b)| Column {
                        nullable: a.nullable || b.nullable,
                        ..a.clone()
                    })
                    .collect();
                Ok(Schema {
                    columns,
                    order: vec![],
                })
            }
            PlanKind::Seek {
                source,
                key_columns,
                ..
            } => {
                let input = self.schema(*source)?;
                if key_columns.is_empty() {
                    return Err(invalid("seek has no key columns"));
                }
                check_indices(key_columns, input.arity(), "seek key column")?;
                Ok(input.clone())
            }
            PlanKind::Existence { source, column } => {
                self.schema(*source)?;
                Ok(Schema {
                    columns: vec![Column::new(column.clone(), SemanticType::Boolean)],
                    order: vec![],
                })
            }
            PlanKind::Include {
                source,
                filter_columns,
                column,
                ..
            } => {
                let input = self.schema(*source)?;
                if filter_columns.is_empty() {
                    return Err(invalid("include has no filter columns"));
                }
                check_indices(filter_columns, input.arity(), "include filter column")?;
                let mut schema = input.clone();
                schema
                    .columns
                    .push(Column::new(column.clone(), SemanticType::Boolean));
                Ok(schema)
            }
        }
    }
}

fn joined(left: &Schema, right: &Schema, right_nullable: bool) -> Schema {
    let mut columns = left.columns.clone();
    columns.extend(right.columns.iter().map(|c| Column {
        nullable: c.nullable || right_nullable,
        ..c.clone()
    }));
    Schema {
        columns,
        order: left.order.clone(),
    }
}

fn check_indices(indices: &[usize], arity: usize, what: &str) -> Result<()> {
    match indices.iter().find(|i| **i >= arity) {
        Some(i) => Err(invalid(format!(
            "{} {} out of range for {} input columns",
            what, i, arity
        ))),
        None => Ok(()),
    }
}

fn check_keys(keys: &[OrderKey], arity: usize, what: &str) -> Result<()> {
    let columns: Vec<usize> = keys.iter().map(|k| k.column).collect();
    check_indices(&columns, arity, what)
}

fn check_expr(expr: &Expr, arity: usize, what: &str) -> Result<()> {
    match expr.max_column() {
        Some(i) if i >= arity => Err(invalid(format!(
            "{} references column {} of {} input columns",
            what, i, arity
        ))),
        _ => Ok(()),
    }
}

fn check_unique_names(columns: &[Column]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(invalid(format!("duplicate column `{}`", column.name)));
        }
    }
    Ok(())
}
