//! Compilation rules, one per operator kind.
//!
//! A parent extends a copy of its child's SELECT when the child is shallow
//! enough for the new clause to keep its meaning; otherwise the child is
//! wrapped as a derived table first.
use std::sync::Arc;

use super::compiled::CompiledNode;
use super::expr::Position;
use super::{output_names, Compiler, SharedBinding};
use crate::capability::{ApplySupport, LockSupport, PagingSupport};
use crate::error::CompileError;
use crate::param::{BindingKind, RowCountSource, RowList, TupleElement};
use crate::plan::{
    AggregateColumn, ApplyType, CalculatedColumn, Column, Expr, IncludeAlgorithm, IndexKind,
    IndexScan, JoinType, LockBehavior, LockMode, NodeId, Operator, OrderKey, PlanKind, RowCount,
    SetKind,
};
use crate::sql::{
    Expression, InsertQuery, Join, JoinType as SqlJoinType, LockClause, OrderByExpr, Query,
    SelectItem, SelectQuery, SetOperation, SetOperator, TableRef,
};
use crate::template::{Marker, Prerequisite, TemporaryTable};
use crate::value::{SemanticType, Value};

enum JoinCondition<'p> {
    Pairs(&'p [(usize, usize)]),
    Predicate(&'p Expr),
}

fn column_at(columns: &[Expression], index: usize) -> Result<Expression, CompileError> {
    columns.get(index).cloned().ok_or_else(|| {
        CompileError::InvalidPlan(format!(
            "column {} out of range for {} inputs",
            index,
            columns.len()
        ))
    })
}

fn item(expr: Expression) -> SelectItem {
    SelectItem { expr, alias: None }
}

/// Body of an EXISTS test over a compiled source.
fn existence_query(node: CompiledNode) -> SelectQuery {
    let mut query = node.query;
    query.lock = None;
    if query.has_limit() {
        return query;
    }
    query.order_by.clear();
    if !query.distinct && query.set_op.is_none() && !query.is_grouped() {
        query.projections = vec![item(Expression::Literal(Value::Int(1)))];
    }
    query
}

impl Compiler<'_> {
    pub(super) fn node(&mut self, id: NodeId) -> Result<CompiledNode, CompileError> {
        let plan = self.plan;
        let node = plan.node(id)?;
        let operator = node.kind.operator();

        let mut compiled = match &node.kind {
            PlanKind::Index(scan) => self.index(scan)?,
            PlanKind::Store {
                name,
                columns,
                source,
            } => self.store(name, columns, *source)?,
            PlanKind::Select { source, columns } => self.select(*source, columns)?,
            PlanKind::Filter { source, predicate } => self.filter(*source, predicate)?,
            PlanKind::Calculate { source, columns } => self.calculate(*source, columns)?,
            PlanKind::Alias { source, .. } => self.node(*source)?,
            PlanKind::Sort { source, order } => self.sort(*source, order)?,
            PlanKind::Distinct { source } => self.distinct(*source)?,
            PlanKind::Aggregate {
                source,
                group_by,
                aggregates,
            } => self.aggregate(*source, group_by, aggregates)?,
            PlanKind::Join {
                left,
                right,
                join_type,
                equal_pairs,
            } => self.join(*left, *right, *join_type, JoinCondition::Pairs(equal_pairs))?,
            PlanKind::PredicateJoin {
                left,
                right,
                join_type,
                predicate,
            } => self.join(*left, *right, *join_type, JoinCondition::Predicate(predicate))?,
            PlanKind::Apply {
                left,
                right,
                apply_type,
            } => self.apply(*left, *right, *apply_type)?,
            PlanKind::Skip { source, count } => self.paged(operator, *source, Some(count), None)?,
            PlanKind::Take { source, count } => self.paged(operator, *source, None, Some(count))?,
            PlanKind::Paging { source, skip, take } => {
                self.paged(operator, *source, Some(skip), Some(take))?
            }
            PlanKind::RowNumber { source, order, .. } => self.row_number(*source, order)?,
            PlanKind::Set { kind, left, right } => self.set(operator, *kind, *left, *right)?,
            PlanKind::Seek {
                source,
                key_columns,
                key,
            } => self.seek(*source, key_columns, key)?,
            PlanKind::Lock {
                source,
                mode,
                behavior,
            } => self.lock(*source, *mode, *behavior)?,
            PlanKind::Existence { source, .. } => self.existence(*source)?,
            PlanKind::Include {
                source,
                filter_columns,
                rows,
                algorithm,
                ..
            } => self.include(*source, filter_columns, rows, *algorithm)?,
        };

        compiled.rename(&output_names(&node.schema.columns));
        Ok(compiled)
    }

    /// Re-expose a compiled node as a derived table under a fresh alias.
    pub(super) fn wrap(&mut self, node: CompiledNode) -> CompiledNode {
        let alias = self.fresh_alias();
        let names = node.names();
        let order = node.order;
        let mut inner = node.query;
        if !inner.has_limit() {
            inner.order_by.clear();
        }
        let projections = names
            .iter()
            .map(|name| SelectItem {
                expr: Expression::column(alias.clone(), name.clone()),
                alias: Some(name.clone()),
            })
            .collect();
        let query = SelectQuery {
            projections,
            from: vec![TableRef::Subquery {
                query: Box::new(Query::Select(Box::new(inner))),
                alias: alias.clone(),
            }],
            ..Default::default()
        };
        let mut wrapped = CompiledNode::new(query, Some(alias));
        wrapped.set_order(order);
        wrapped
    }

    fn wrap_if(&mut self, node: CompiledNode, wrap: bool) -> CompiledNode {
        if wrap {
            self.wrap(node)
        } else {
            node
        }
    }

    fn table_select(&mut self, table: &str, columns: &[Column]) -> CompiledNode {
        let alias = self.fresh_alias();
        let projections = columns
            .iter()
            .map(|column| SelectItem {
                expr: Expression::column(alias.clone(), column.name.clone()),
                alias: Some(column.name.clone()),
            })
            .collect();
        let query = SelectQuery {
            projections,
            from: vec![TableRef::Table {
                name: table.to_string(),
                alias: Some(alias.clone()),
            }],
            ..Default::default()
        };
        CompiledNode::new(query, Some(alias))
    }

    fn index(&mut self, scan: &IndexScan) -> Result<CompiledNode, CompileError> {
        match &scan.kind {
            IndexKind::Primary | IndexKind::Secondary { .. } => {
                Ok(self.table_select(&scan.table, &scan.columns))
            }
            IndexKind::Filtered { predicate } => {
                let mut node = self.table_select(&scan.table, &scan.columns);
                let inputs = node.columns();
                node.query.filter = Some(self.translate(predicate, &inputs, Position::Predicate)?);
                Ok(node)
            }
            IndexKind::Union { tables } => {
                let mut parts: Vec<SelectQuery> = tables
                    .iter()
                    .map(|table| self.table_select(table, &scan.columns).query)
                    .collect();
                let mut combined = parts.pop().ok_or_else(|| {
                    CompileError::InvalidPlan("virtual union index has no tables".into())
                })?;
                while let Some(mut left) = parts.pop() {
                    left.set_op = Some(Box::new(SetOperation {
                        op: SetOperator::Union,
                        all: true,
                        right: Query::Select(Box::new(combined)),
                    }));
                    combined = left;
                }
                Ok(self.wrap(CompiledNode::new(combined, None)))
            }
        }
    }

    fn store(
        &mut self,
        name: &str,
        columns: &[Column],
        source: Option<NodeId>,
    ) -> Result<CompiledNode, CompileError> {
        if let Some(source) = source {
            let mut fill = Compiler::new(self.caps, self.plan);
            let compiled = fill.node(source)?;
            let insert = Query::Insert(InsertQuery {
                table: name.to_string(),
                columns: columns.iter().map(|c| c.name.clone()).collect(),
                source: Box::new(Query::Select(Box::new(compiled.query))),
            });
            let template = fill.finish(insert, columns.to_vec());
            self.prerequisites.push(Prerequisite {
                table: name.to_string(),
                template: Arc::new(template),
            });
        }
        Ok(self.table_select(name, columns))
    }

    fn select(&mut self, source: NodeId, columns: &[usize]) -> Result<CompiledNode, CompileError> {
        let child = self.node(source)?;
        let wrap = child.query.distinct || child.query.set_op.is_some();
        let mut node = self.wrap_if(child, wrap);

        let inputs = node.columns();
        node.query.projections = columns
            .iter()
            .map(|i| column_at(&inputs, *i).map(item))
            .collect::<Result<_, _>>()?;

        // ORDER BY may keep hidden keys; only the surviving prefix is
        // reported as output order.
        let mut order = Vec::new();
        for key in &node.order {
            match columns.iter().position(|c| *c == key.column) {
                Some(position) => order.push(OrderKey {
                    column: position,
                    direction: key.direction,
                }),
                None => break,
            }
        }
        node.order = order;
        Ok(node)
    }

    fn filter(&mut self, source: NodeId, predicate: &Expr) -> Result<CompiledNode, CompileError> {
        let child = self.node(source)?;
        let wrap = !child.is_flat();
        let mut node = self.wrap_if(child, wrap);
        let inputs = node.columns();
        let predicate = self.translate(predicate, &inputs, Position::Predicate)?;
        node.query.filter = Some(Expression::and_maybe(node.query.filter.take(), predicate));
        Ok(node)
    }

    fn calculate(
        &mut self,
        source: NodeId,
        columns: &[CalculatedColumn],
    ) -> Result<CompiledNode, CompileError> {
        let child = self.node(source)?;
        let wrap = child.query.distinct || child.query.set_op.is_some();
        let mut node = self.wrap_if(child, wrap);
        let inputs = node.columns();
        for calculated in columns {
            let expr = self.translate(&calculated.expr, &inputs, Position::Value)?;
            node.query.projections.push(item(expr));
        }
        Ok(node)
    }

    fn sort(&mut self, source: NodeId, order: &[OrderKey]) -> Result<CompiledNode, CompileError> {
        let child = self.node(source)?;
        let wrap = child.query.has_limit() || child.query.set_op.is_some();
        let mut node = self.wrap_if(child, wrap);
        node.set_order(order.to_vec());
        Ok(node)
    }

    fn distinct(&mut self, source: NodeId) -> Result<CompiledNode, CompileError> {
        let child = self.node(source)?;
        let wrap = child.query.has_limit() || child.query.set_op.is_some() || child.query.lock.is_some();
        let mut node = self.wrap_if(child, wrap);
        node.query.distinct = true;
        // DISTINCT only allows ORDER BY on projected expressions.
        let order = node.order.clone();
        node.set_order(order);
        Ok(node)
    }

    fn aggregate(
        &mut self,
        source: NodeId,
        group_by: &[usize],
        aggregates: &[AggregateColumn],
    ) -> Result<CompiledNode, CompileError> {
        let child = self.node(source)?;
        let inputs = child.columns();
        // A literal in GROUP BY would read as a column position.
        let literal_key = group_by.iter().any(|i| {
            matches!(
                inputs.get(*i),
                Some(Expression::Literal(_) | Expression::Parameter(_))
            )
        });
        let wrap = !child.is_flat() || literal_key;
        let mut node = self.wrap_if(child, wrap);

        let inputs = node.columns();
        let groups = group_by
            .iter()
            .map(|i| column_at(&inputs, *i))
            .collect::<Result<Vec<_>, _>>()?;
        let mut projections: Vec<SelectItem> = groups.iter().cloned().map(item).collect();
        for aggregate in aggregates {
            let args = match aggregate.column {
                Some(column) => vec![column_at(&inputs, column)?],
                None => vec![Expression::Wildcard],
            };
            projections.push(item(Expression::Aggregate {
                name: aggregate.function.sql_name().to_string(),
                args,
            }));
        }
        node.query.projections = projections;
        node.query.group_by = groups;
        node.clear_order();
        Ok(node)
    }

    fn join(
        &mut self,
        left: NodeId,
        right: NodeId,
        join_type: JoinType,
        condition: JoinCondition<'_>,
    ) -> Result<CompiledNode, CompileError> {
        let left_node = self.node(left)?;
        let wrap = !left_node.is_flat();
        let mut node = self.wrap_if(left_node, wrap);

        // The right side is joined through its own reference when it is a
        // single filtered source; anything else is inlined as a derived table.
        let right_node = self.node(right)?;
        let wrap = right_node.reference.is_none() || !right_node.query.is_simple_source();
        let mut right_node = self.wrap_if(right_node, wrap);

        let left_columns = node.columns();
        let right_columns = right_node.columns();
        let mut conditions = Vec::new();
        match condition {
            JoinCondition::Pairs(pairs) => {
                for (l, r) in pairs {
                    conditions.push(Expression::eq(
                        column_at(&left_columns, *l)?,
                        column_at(&right_columns, *r)?,
                    ));
                }
            }
            JoinCondition::Predicate(predicate) => {
                let inputs: Vec<Expression> = left_columns
                    .iter()
                    .chain(&right_columns)
                    .cloned()
                    .collect();
                conditions.push(self.translate(predicate, &inputs, Position::Predicate)?);
            }
        }
        if let Some(filter) = right_node.query.filter.take() {
            conditions.push(filter);
        }
        let condition = Expression::conjunction(conditions);

        let table = right_node
            .query
            .from
            .pop()
            .ok_or_else(|| CompileError::InvalidPlan("join input has no source".into()))?;
        let (join_type, condition) = match (join_type, condition) {
            (JoinType::Inner, None) => (SqlJoinType::Cross, None),
            (JoinType::Inner, Some(c)) => (SqlJoinType::Inner, Some(c)),
            (JoinType::LeftOuter, c) => (
                SqlJoinType::Left,
                Some(c.unwrap_or_else(|| Expression::truth(true))),
            ),
        };
        node.query.joins.push(Join {
            join_type,
            table,
            condition,
        });
        node.query.projections.extend(right_node.query.projections);
        Ok(node)
    }

    fn apply(
        &mut self,
        left: NodeId,
        right: NodeId,
        apply_type: ApplyType,
    ) -> Result<CompiledNode, CompileError> {
        let correlated_join = matches!(apply_type, ApplyType::Cross | ApplyType::Outer);
        if correlated_join && self.caps.apply == ApplySupport::None {
            return Err(self.unsupported(
                Operator::Apply,
                "correlated apply needs lateral join or APPLY support",
            ));
        }

        let left_node = self.node(left)?;
        let wrap = !left_node.is_flat();
        let mut node = self.wrap_if(left_node, wrap);

        self.outer.push(node.columns());
        let right_node = self.node(right);
        self.outer.pop();
        let right_node = right_node?;

        if !correlated_join {
            let test = Expression::Exists {
                query: Box::new(Query::Select(Box::new(existence_query(right_node)))),
                negated: apply_type == ApplyType::NotExisting,
            };
            node.query.filter = Some(Expression::and_maybe(node.query.filter.take(), test));
            return Ok(node);
        }

        let alias = self.fresh_alias();
        let names = right_node.names();
        let mut inner = right_node.query;
        if !inner.has_limit() {
            inner.order_by.clear();
        }
        let outer_join = apply_type == ApplyType::Outer;
        let join_type = match (self.caps.apply, outer_join) {
            (ApplySupport::CrossApply, false) => SqlJoinType::CrossApply,
            (ApplySupport::CrossApply, true) => SqlJoinType::OuterApply,
            (_, false) => SqlJoinType::CrossLateral,
            (_, true) => SqlJoinType::LeftLateral,
        };
        let condition = (join_type == SqlJoinType::LeftLateral).then(|| Expression::truth(true));
        node.query.joins.push(Join {
            join_type,
            table: TableRef::Subquery {
                query: Box::new(Query::Select(Box::new(inner))),
                alias: alias.clone(),
            },
            condition,
        });
        node.query.projections.extend(
            names
                .iter()
                .map(|name| item(Expression::column(alias.clone(), name.clone()))),
        );
        Ok(node)
    }

    fn row_count(&mut self, count: &RowCount, kind: BindingKind) -> Expression {
        let index = self.bind(RowCountSource(count.clone()), SemanticType::Int64, kind);
        Expression::Parameter(index)
    }

    /// Native skip/take/paging. Counts are always bound, never inlined.
    fn paged(
        &mut self,
        operator: Operator,
        source: NodeId,
        skip: Option<&RowCount>,
        take: Option<&RowCount>,
    ) -> Result<CompiledNode, CompileError> {
        if self.caps.paging == PagingSupport::None {
            return Err(self.unsupported(operator, "no native paging and no row-number emulation"));
        }
        let child = self.node(source)?;
        // A take after a skip fits the same clause; a skip after a take does not.
        let wrap = match skip {
            Some(_) => child.query.has_limit(),
            None => child.query.limit.is_some(),
        } || child.query.set_op.is_some();
        let mut node = self.wrap_if(child, wrap);
        if let Some(take) = take {
            node.query.limit = Some(self.row_count(take, BindingKind::Limit));
        }
        if let Some(skip) = skip {
            node.query.offset = Some(self.row_count(skip, BindingKind::Offset));
        }
        Ok(node)
    }

    fn row_number(&mut self, source: NodeId, order: &[OrderKey]) -> Result<CompiledNode, CompileError> {
        if !self.caps.window_functions {
            return Err(self.unsupported(Operator::RowNumber, "window functions are not available"));
        }
        let child = self.node(source)?;
        let wrap = child.is_shaped();
        let mut node = self.wrap_if(child, wrap);

        let inputs = node.columns();
        let keys = if order.is_empty() {
            vec![OrderKey::asc(0)]
        } else {
            order.to_vec()
        };
        let order_by = keys
            .iter()
            .map(|key| {
                Ok(OrderByExpr {
                    expr: column_at(&inputs, key.column)?,
                    asc: key.direction.is_ascending(),
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;
        node.query.projections.push(item(Expression::WindowFunction {
            function: Box::new(Expression::Function {
                name: "ROW_NUMBER".into(),
                args: vec![],
            }),
            order_by,
        }));
        Ok(node)
    }

    fn set_side(&mut self, id: NodeId) -> Result<CompiledNode, CompileError> {
        let child = self.node(id)?;
        let wrap =
            child.query.has_limit() || child.query.set_op.is_some() || child.query.lock.is_some();
        let mut node = self.wrap_if(child, wrap);
        node.clear_order();
        Ok(node)
    }

    fn set(
        &mut self,
        operator: Operator,
        kind: SetKind,
        left: NodeId,
        right: NodeId,
    ) -> Result<CompiledNode, CompileError> {
        if matches!(kind, SetKind::Except | SetKind::Intersect) && !self.caps.intersect_except {
            return Err(self.unsupported(operator, "INTERSECT and EXCEPT are not available"));
        }
        let left_node = self.set_side(left)?;
        let right_node = self.set_side(right)?;
        let (op, all) = match kind {
            SetKind::Union => (SetOperator::Union, false),
            SetKind::Concat => (SetOperator::Union, true),
            SetKind::Except => (SetOperator::Except, false),
            SetKind::Intersect => (SetOperator::Intersect, false),
        };
        let mut query = left_node.query;
        query.set_op = Some(Box::new(SetOperation {
            op,
            all,
            right: Query::Select(Box::new(right_node.query)),
        }));
        Ok(self.wrap(CompiledNode::new(query, None)))
    }

    fn seek(
        &mut self,
        source: NodeId,
        key_columns: &[usize],
        key: &str,
    ) -> Result<CompiledNode, CompileError> {
        let plan = self.plan;
        let schema = plan.schema(source)?;
        let child = self.node(source)?;
        let wrap = !child.is_flat();
        let mut node = self.wrap_if(child, wrap);

        let inputs = node.columns();
        let mut conditions = Vec::with_capacity(key_columns.len());
        for (position, column) in key_columns.iter().enumerate() {
            let ty = schema
                .columns
                .get(*column)
                .map(|c| c.ty)
                .ok_or_else(|| CompileError::InvalidPlan(format!("seek column {} out of range", column)))?;
            let index = self.bind_shared(
                SharedBinding::Element(key.to_string(), position),
                TupleElement {
                    name: key.to_string(),
                    index: position,
                },
                ty,
            );
            conditions.push(Expression::eq(
                column_at(&inputs, *column)?,
                Expression::Parameter(index),
            ));
        }
        if let Some(predicate) = Expression::conjunction(conditions) {
            node.query.filter = Some(Expression::and_maybe(node.query.filter.take(), predicate));
        }
        Ok(node)
    }

    fn lock(
        &mut self,
        source: NodeId,
        mode: LockMode,
        behavior: LockBehavior,
    ) -> Result<CompiledNode, CompileError> {
        if self.caps.locking == LockSupport::None {
            return Err(self.unsupported(Operator::Lock, "row locking clauses are not available"));
        }
        let mut node = self.node(source)?;
        if node.query.distinct || node.query.is_grouped() || node.query.set_op.is_some() {
            return Err(self.unsupported(
                Operator::Lock,
                "rows of a distinct, grouped or combined result cannot be locked",
            ));
        }
        node.query.lock = Some(LockClause { mode, behavior });
        Ok(node)
    }

    fn existence(&mut self, source: NodeId) -> Result<CompiledNode, CompileError> {
        let child = self.node(source)?;
        let test = Expression::Exists {
            query: Box::new(Query::Select(Box::new(existence_query(child)))),
            negated: false,
        };
        let query = SelectQuery {
            projections: vec![item(self.as_value(test))],
            ..Default::default()
        };
        Ok(CompiledNode::new(query, None))
    }

    fn include(
        &mut self,
        source: NodeId,
        filter_columns: &[usize],
        rows: &str,
        algorithm: IncludeAlgorithm,
    ) -> Result<CompiledNode, CompileError> {
        let plan = self.plan;
        let schema = plan.schema(source)?;
        let child = self.node(source)?;
        let wrap = child.query.distinct || child.query.set_op.is_some();
        let mut node = self.wrap_if(child, wrap);

        let inputs = node.columns();
        let keys = filter_columns
            .iter()
            .map(|c| column_at(&inputs, *c))
            .collect::<Result<Vec<_>, _>>()?;
        let key_columns = filter_columns
            .iter()
            .map(|c| {
                schema.columns.get(*c).cloned().ok_or_else(|| {
                    CompileError::InvalidPlan(format!("include column {} out of range", c))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ty = key_columns
            .first()
            .map(|c| c.ty)
            .ok_or_else(|| CompileError::InvalidPlan("include has no filter columns".into()))?;
        let binding = self.bind(
            RowList {
                name: rows.to_string(),
                types: key_columns.iter().map(|c| c.ty).collect(),
            },
            ty,
            BindingKind::RowFilter,
        );

        let test = match algorithm {
            IncludeAlgorithm::DynamicFilter => self.dynamic_filter(keys, binding),
            IncludeAlgorithm::TemporaryTable => {
                self.temporary_table_filter(keys, key_columns, binding)
            }
            IncludeAlgorithm::Auto => {
                let main = self.dynamic_filter(keys.clone(), binding);
                let alternative = self.temporary_table_filter(keys, key_columns, binding);
                let id = self.fresh_marker();
                self.markers.push(Marker::Variant { id, rows: binding });
                Expression::Variant {
                    id,
                    main: Box::new(main),
                    alternative: Box::new(alternative),
                }
            }
        };
        let test = self.as_value(test);
        node.query.projections.push(item(test));
        Ok(node)
    }

    fn dynamic_filter(&mut self, columns: Vec<Expression>, rows: usize) -> Expression {
        let id = self.fresh_marker();
        self.markers.push(Marker::DynamicFilter {
            id,
            arity: columns.len(),
            rows,
        });
        Expression::DynamicFilter { id, columns }
    }

    /// `EXISTS` against a caller-created temporary table, named per call
    /// through a placeholder.
    fn temporary_table_filter(
        &mut self,
        keys: Vec<Expression>,
        columns: Vec<Column>,
        rows: usize,
    ) -> Expression {
        let placeholder = format!("include_table_{}", self.temporary_tables.len());
        let alias = self.fresh_alias();
        let names = output_names(&columns);
        let columns: Vec<Column> = columns
            .into_iter()
            .zip(&names)
            .map(|(column, name)| Column {
                name: name.clone(),
                ..column
            })
            .collect();
        let conditions = keys
            .into_iter()
            .zip(&names)
            .map(|(key, name)| Expression::eq(key, Expression::column(alias.clone(), name.clone())))
            .collect();
        let query = SelectQuery {
            projections: vec![item(Expression::Literal(Value::Int(1)))],
            from: vec![TableRef::Placeholder {
                name: placeholder.clone(),
                alias,
            }],
            filter: Expression::conjunction(conditions),
            ..Default::default()
        };
        self.markers.push(Marker::Placeholder {
            name: placeholder.clone(),
        });
        self.temporary_tables.push(TemporaryTable {
            placeholder,
            columns,
            rows,
        });
        Expression::Exists {
            query: Box::new(Query::Select(Box::new(query))),
            negated: false,
        }
    }
}
