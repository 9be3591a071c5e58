//! SQL tree → template segments.
//!
//! Converts the compiler's statement tree into dialect-specific text. Plain
//! SQL collapses into text segments; parameters and deferred markers stay
//! structured so the resolver can fill them per call without reparsing.
use super::types::*;
use crate::capability::{Capabilities, PagingSupport, SqlDialect};
use crate::plan::{LockBehavior, LockMode};
use crate::template::Segment;
use crate::value::Value;

/// Render a query into template segments for the given target.
pub fn render(query: &Query, caps: &Capabilities) -> Vec<Segment> {
    let mut w = SqlWriter::new(caps);
    w.query(query);
    w.finish()
}

/// Quote an identifier for the dialect.
pub fn quote_ident(name: &str, dialect: SqlDialect) -> String {
    match dialect {
        SqlDialect::Postgres | SqlDialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        SqlDialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
        SqlDialect::MySql => format!("`{}`", name.replace('`', "``")),
    }
}

/// Inline literal for the dialect.
pub fn render_literal(value: &Value, caps: &Capabilities) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => match (caps.native_booleans, b) {
            (true, true) => "TRUE".to_string(),
            (true, false) => "FALSE".to_string(),
            (false, true) => "1".to_string(),
            (false, false) => "0".to_string(),
        },
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => format!("{:?}", f),
        Value::Float(_) => "NULL".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            match caps.dialect {
                SqlDialect::Postgres => format!("'\\x{}'::bytea", hex),
                SqlDialect::SqlServer => format!("0x{}", hex),
                SqlDialect::Sqlite | SqlDialect::MySql => format!("X'{}'", hex),
            }
        }
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
        Value::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(|v| render_literal(v, caps)).collect();
            format!("({})", parts.join(", "))
        }
        Value::Rows(rows) => {
            let parts: Vec<String> = rows
                .iter()
                .map(|row| render_literal(&Value::Tuple(row.clone()), caps))
                .collect();
            parts.join(", ")
        }
    }
}

struct SqlWriter<'a> {
    caps: &'a Capabilities,
    segments: Vec<Segment>,
    text: String,
}

impl<'a> SqlWriter<'a> {
    fn new(caps: &'a Capabilities) -> Self {
        Self {
            caps,
            segments: Vec::new(),
            text: String::new(),
        }
    }

    fn push(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn push_segment(&mut self, segment: Segment) {
        self.flush();
        self.segments.push(segment);
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            self.segments
                .push(Segment::Text(std::mem::take(&mut self.text)));
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }

    /// Render `expr` on its own, for nesting inside a marker segment.
    fn nested(&self, expr: &Expression) -> Vec<Segment> {
        let mut w = SqlWriter::new(self.caps);
        w.expr(expr);
        w.finish()
    }

    fn ident(&mut self, name: &str) {
        let quoted = quote_ident(name, self.caps.dialect);
        self.push(&quoted);
    }

    fn query(&mut self, query: &Query) {
        match query {
            Query::Select(s) => self.select(s),
            Query::Insert(i) => self.insert(i),
        }
    }

    fn insert(&mut self, insert: &InsertQuery) {
        self.push("INSERT INTO ");
        self.ident(&insert.table);
        self.push(" (");
        for (i, column) in insert.columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(column);
        }
        self.push(") ");
        self.query(&insert.source);
    }

    fn select(&mut self, select: &SelectQuery) {
        // SELECT [DISTINCT]
        self.push("SELECT ");
        if select.distinct {
            self.push("DISTINCT ");
        }
        if select.projections.is_empty() {
            self.push("*");
        }
        for (i, item) in select.projections.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&item.expr);
            if let Some(alias) = &item.alias {
                self.push(" AS ");
                self.ident(alias);
            }
        }

        // FROM
        for (i, table) in select.from.iter().enumerate() {
            self.push(if i == 0 { " FROM " } else { ", " });
            self.table_ref(table);
        }

        // JOINs
        for join in &select.joins {
            self.join(join);
        }

        // WHERE
        if let Some(filter) = &select.filter {
            self.push(" WHERE ");
            self.expr(filter);
        }

        // GROUP BY
        for (i, group) in select.group_by.iter().enumerate() {
            self.push(if i == 0 { " GROUP BY " } else { ", " });
            self.expr(group);
        }

        // Set operations (UNION, INTERSECT, EXCEPT)
        if let Some(set_op) = &select.set_op {
            let op_str = match set_op.op {
                SetOperator::Union => " UNION",
                SetOperator::Intersect => " INTERSECT",
                SetOperator::Except => " EXCEPT",
            };
            self.push(op_str);
            if set_op.all {
                self.push(" ALL");
            }
            self.push(" ");
            self.query(&set_op.right);
        }

        self.order_and_limit(select);

        if let Some(lock) = &select.lock {
            self.lock(lock);
        }
    }

    fn order_and_limit(&mut self, select: &SelectQuery) {
        let offset_fetch = self.caps.paging == PagingSupport::OffsetFetch && select.has_limit();

        // ORDER BY
        if !select.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, order) in select.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(&order.expr);
                self.push(if order.asc { " ASC" } else { " DESC" });
            }
        } else if offset_fetch {
            // OFFSET/FETCH is only valid after an ORDER BY.
            self.push(" ORDER BY (SELECT NULL)");
        }

        if offset_fetch {
            self.push(" OFFSET ");
            match &select.offset {
                Some(offset) => self.expr(offset),
                None => self.push("0"),
            }
            self.push(" ROWS");
            if let Some(limit) = &select.limit {
                self.push(" FETCH NEXT ");
                self.expr(limit);
                self.push(" ROWS ONLY");
            }
            return;
        }

        match (&select.limit, &select.offset) {
            (Some(limit), offset) => {
                self.push(" LIMIT ");
                self.expr(limit);
                if let Some(offset) = offset {
                    self.push(" OFFSET ");
                    self.expr(offset);
                }
            }
            (None, Some(offset)) => {
                match self.caps.dialect {
                    SqlDialect::Sqlite => self.push(" LIMIT -1"),
                    SqlDialect::MySql => self.push(" LIMIT 18446744073709551615"),
                    SqlDialect::Postgres | SqlDialect::SqlServer => {}
                }
                self.push(" OFFSET ");
                self.expr(offset);
            }
            (None, None) => {}
        }
    }

    fn lock(&mut self, lock: &LockClause) {
        self.push(match lock.mode {
            LockMode::Shared => " FOR SHARE",
            LockMode::Exclusive | LockMode::Update => " FOR UPDATE",
        });
        match lock.behavior {
            LockBehavior::Wait => {}
            LockBehavior::NoWait => self.push(" NOWAIT"),
            LockBehavior::SkipLocked => self.push(" SKIP LOCKED"),
        }
    }

    fn table_ref(&mut self, table: &TableRef) {
        match table {
            TableRef::Table { name, alias } => {
                self.ident(name);
                if let Some(a) = alias {
                    self.push(" AS ");
                    self.ident(a);
                }
            }
            TableRef::Placeholder { name, alias } => {
                self.push_segment(Segment::Placeholder(name.clone()));
                self.push(" AS ");
                self.ident(alias);
            }
            TableRef::Subquery { query, alias } => {
                self.push("(");
                self.query(query);
                self.push(") AS ");
                self.ident(alias);
            }
        }
    }

    fn join(&mut self, join: &Join) {
        let type_str = match join.join_type {
            JoinType::Inner => " INNER JOIN ",
            JoinType::Left => " LEFT JOIN ",
            JoinType::Cross => " CROSS JOIN ",
            JoinType::CrossLateral => " CROSS JOIN LATERAL ",
            JoinType::LeftLateral => " LEFT JOIN LATERAL ",
            JoinType::CrossApply => " CROSS APPLY ",
            JoinType::OuterApply => " OUTER APPLY ",
        };
        self.push(type_str);
        self.table_ref(&join.table);
        if let Some(condition) = &join.condition {
            self.push(" ON ");
            self.expr(condition);
        }
    }

    fn expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Column { table, name } => {
                if let Some(t) = table {
                    self.ident(t);
                    self.push(".");
                }
                self.ident(name);
            }
            Expression::Literal(value) => {
                let literal = render_literal(value, self.caps);
                self.push(&literal);
            }
            Expression::BinaryOp { left, op, right } => {
                self.operand(left, *op);
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                self.operand(right, *op);
            }
            Expression::Not(inner) => {
                self.push("NOT (");
                self.expr(inner);
                self.push(")");
            }
            Expression::Function { name, args } | Expression::Aggregate { name, args } => {
                self.push(name);
                self.push("(");
                self.list(args);
                self.push(")");
            }
            Expression::WindowFunction { function, order_by } => {
                self.expr(function);
                self.push(" OVER (");
                for (i, order) in order_by.iter().enumerate() {
                    self.push(if i == 0 { "ORDER BY " } else { ", " });
                    self.expr(&order.expr);
                    self.push(if order.asc { " ASC" } else { " DESC" });
                }
                self.push(")");
            }
            Expression::Case {
                when_clauses,
                else_clause,
            } => {
                self.push("CASE");
                for (when, then) in when_clauses {
                    self.push(" WHEN ");
                    self.expr(when);
                    self.push(" THEN ");
                    self.expr(then);
                }
                if let Some(e) = else_clause {
                    self.push(" ELSE ");
                    self.expr(e);
                }
                self.push(" END");
            }
            Expression::Exists { query, negated } => {
                self.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.query(query);
                self.push(")");
            }
            Expression::Between { expr, low, high } => {
                self.operand(expr, BinaryOperator::And);
                self.push(" BETWEEN ");
                self.operand(low, BinaryOperator::And);
                self.push(" AND ");
                self.operand(high, BinaryOperator::And);
            }
            Expression::IsNull { expr, negated } => {
                self.operand(expr, BinaryOperator::Eq);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expression::Wildcard => self.push("*"),
            Expression::Parameter(index) => self.push_segment(Segment::Parameter(*index)),
            Expression::Placeholder(name) => self.push_segment(Segment::Placeholder(name.clone())),
            Expression::Variant {
                id,
                main,
                alternative,
            } => {
                let segment = Segment::Variant {
                    id: *id,
                    main: self.nested(main),
                    alternative: self.nested(alternative),
                };
                self.push_segment(segment);
            }
            Expression::DynamicFilter { id, columns } => {
                let segment = Segment::DynamicFilter {
                    id: *id,
                    columns: columns.iter().map(|c| self.nested(c)).collect(),
                };
                self.push_segment(segment);
            }
            Expression::Nested(inner) => {
                self.push("(");
                self.expr(inner);
                self.push(")");
            }
        }
    }

    /// Operand of a binary operator, parenthesized unless it binds tighter
    /// or chains the same associative logical operator.
    fn operand(&mut self, expr: &Expression, parent: BinaryOperator) {
        let parens = match expr {
            Expression::BinaryOp { op, .. } => {
                !(*op == parent && matches!(op, BinaryOperator::And | BinaryOperator::Or))
            }
            Expression::Between { .. } | Expression::IsNull { .. } | Expression::Not(_) => true,
            _ => false,
        };
        if parens {
            self.push("(");
            self.expr(expr);
            self.push(")");
        } else {
            self.expr(expr);
        }
    }

    fn list(&mut self, exprs: &[Expression]) {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(e);
        }
    }
}
