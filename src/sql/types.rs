//! SQL statement tree produced by the compiler.
//!
//! Besides plain SQL this tree carries the deferred markers of a statement
//! template: named placeholders, variants and dynamic filters. The tree is
//! rendered once per compilation; markers survive rendering as template
//! segments.
use crate::plan::{LockBehavior, LockMode};
use crate::template::MarkerId;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Box<SelectQuery>),
    Insert(InsertQuery),
}

/// `INSERT INTO table (columns) <source>`
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    pub columns: Vec<String>,
    pub source: Box<Query>,
}

/// A SELECT query with the clauses the compiler emits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub projections: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub filter: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
    /// Set operations (UNION, INTERSECT, EXCEPT).
    pub set_op: Option<Box<SetOperation>>,
    pub lock: Option<LockClause>,
}

impl SelectQuery {
    pub fn has_limit(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    /// Aggregates or window functions in the projection, or a GROUP BY.
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
            || self
                .projections
                .iter()
                .any(|p| p.expr.contains_aggregate() || p.expr.contains_window())
    }

    /// A single table or subquery with no joins and nothing that fixes the
    /// row set beyond a WHERE clause.
    pub fn is_simple_source(&self) -> bool {
        self.from.len() == 1
            && self.joins.is_empty()
            && !self.distinct
            && !self.has_limit()
            && self.set_op.is_none()
            && self.lock.is_none()
            && !self.is_grouped()
    }
}

/// `expr AS alias`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expression,
    pub alias: Option<String>,
}

/// Table reference in FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// `table AS alias`
    Table { name: String, alias: Option<String> },
    /// Table name supplied per call through a named placeholder.
    Placeholder { name: String, alias: String },
    /// `(SELECT ...) AS alias`
    Subquery { query: Box<Query>, alias: String },
}

impl TableRef {
    pub fn alias(&self) -> Option<&str> {
        match self {
            TableRef::Table { alias, .. } => alias.as_deref(),
            TableRef::Placeholder { alias, .. } | TableRef::Subquery { alias, .. } => Some(alias),
        }
    }
}

/// JOIN clause representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
    CrossLateral,
    LeftLateral,
    CrossApply,
    OuterApply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockClause {
    pub mode: LockMode,
    pub behavior: LockBehavior,
}

/// Core expression type. Recursive to support arbitrary nesting.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Column reference: `table.column` or just `column`.
    Column { table: Option<String>, name: String },
    /// Literal value, rendered inline.
    Literal(Value),
    /// Binary operation: `left op right`.
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
    /// Scalar function call: `name(args)`.
    Function { name: String, args: Vec<Expression> },
    /// Aggregate function call.
    Aggregate { name: String, args: Vec<Expression> },
    /// Window function: `expr OVER (ORDER BY ...)`.
    WindowFunction {
        function: Box<Expression>,
        order_by: Vec<OrderByExpr>,
    },
    /// CASE WHEN ... THEN ... ELSE ... END
    Case {
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Box<Expression>>,
    },
    /// `[NOT] EXISTS (SELECT ...)`
    Exists { query: Box<Query>, negated: bool },
    /// expr BETWEEN low AND high.
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
    },
    /// expr IS NULL / IS NOT NULL.
    IsNull { expr: Box<Expression>, negated: bool },
    /// Wildcard `*` (used in COUNT(*)).
    Wildcard,
    /// Bound parameter, by index into the template's binding list.
    Parameter(usize),
    /// Named text gap filled per call.
    Placeholder(String),
    /// Exactly one branch is emitted per call: `main` when the id is
    /// selected, `alternative` otherwise.
    Variant {
        id: MarkerId,
        main: Box<Expression>,
        alternative: Box<Expression>,
    },
    /// Membership test of `columns` against a per-call list of row tuples.
    DynamicFilter { id: MarkerId, columns: Vec<Expression> },
    /// Nested expression (parenthesized).
    Nested(Box<Expression>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Like,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Like => "LIKE",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
                | BinaryOperator::Like
        )
    }
}

/// ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expression,
    pub asc: bool,
}

/// Set operation (UNION, INTERSECT, EXCEPT).
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub op: SetOperator,
    pub all: bool,
    pub right: Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

impl Expression {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::binary(left, BinaryOperator::Eq, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(left, BinaryOperator::And, right)
    }

    /// AND together an optional existing predicate and a new one.
    pub fn and_maybe(existing: Option<Expression>, extra: Expression) -> Expression {
        match existing {
            Some(e) => Self::and(e, extra),
            None => extra,
        }
    }

    pub fn conjunction(parts: Vec<Expression>) -> Option<Expression> {
        parts.into_iter().reduce(Self::and)
    }

    /// `1 = 1` / `1 = 0`: boolean constants usable in every dialect.
    pub fn truth(value: bool) -> Expression {
        Self::eq(
            Expression::Literal(Value::Int(1)),
            Expression::Literal(Value::Int(if value { 1 } else { 0 })),
        )
    }

    /// Whether the expression is syntactically a predicate.
    pub fn is_predicate(&self) -> bool {
        match self {
            Expression::BinaryOp { op, .. } => {
                op.is_comparison() || matches!(op, BinaryOperator::And | BinaryOperator::Or)
            }
            Expression::Not(_)
            | Expression::Exists { .. }
            | Expression::Between { .. }
            | Expression::IsNull { .. }
            | Expression::DynamicFilter { .. } => true,
            Expression::Variant {
                main, alternative, ..
            } => main.is_predicate() && alternative.is_predicate(),
            Expression::Nested(inner) => inner.is_predicate(),
            _ => false,
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        self.any(&|e| matches!(e, Expression::Aggregate { .. }))
    }

    pub fn contains_window(&self) -> bool {
        self.any(&|e| matches!(e, Expression::WindowFunction { .. }))
    }

    /// Whether any sub-expression satisfies `pred`. Does not descend into
    /// subqueries.
    fn any(&self, pred: &dyn Fn(&Expression) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Expression::BinaryOp { left, right, .. } => left.any(pred) || right.any(pred),
            Expression::Not(inner) | Expression::Nested(inner) => inner.any(pred),
            Expression::Function { args, .. } | Expression::Aggregate { args, .. } => {
                args.iter().any(|a| a.any(pred))
            }
            Expression::WindowFunction { function, .. } => function.any(pred),
            Expression::Case {
                when_clauses,
                else_clause,
            } => {
                when_clauses.iter().any(|(w, t)| w.any(pred) || t.any(pred))
                    || else_clause.as_ref().is_some_and(|e| e.any(pred))
            }
            Expression::Between { expr, low, high } => {
                expr.any(pred) || low.any(pred) || high.any(pred)
            }
            Expression::IsNull { expr, .. } => expr.any(pred),
            Expression::Variant {
                main, alternative, ..
            } => main.any(pred) || alternative.any(pred),
            Expression::DynamicFilter { columns, .. } => columns.iter().any(|c| c.any(pred)),
            Expression::Column { .. }
            | Expression::Literal(_)
            | Expression::Exists { .. }
            | Expression::Wildcard
            | Expression::Parameter(_)
            | Expression::Placeholder(_) => false,
        }
    }
}
