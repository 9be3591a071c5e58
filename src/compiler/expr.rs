//! Plan expressions → SQL expressions.
use super::Compiler;
use crate::capability::SqlDialect;
use crate::error::CompileError;
use crate::param::{BindingKind, ContextValue, RowCountSource};
use crate::plan::{BinaryOp, Expr, ScalarFunction};
use crate::sql::{BinaryOperator, Expression};
use crate::value::{SemanticType, Value};

/// Where a translated expression is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Position {
    /// Projected or compared: booleans must be encoded as values.
    Value,
    /// WHERE, ON, CASE WHEN.
    Predicate,
}

fn operator(op: BinaryOp) -> BinaryOperator {
    match op {
        BinaryOp::Eq => BinaryOperator::Eq,
        BinaryOp::NotEq => BinaryOperator::NotEq,
        BinaryOp::Lt => BinaryOperator::Lt,
        BinaryOp::LtEq => BinaryOperator::LtEq,
        BinaryOp::Gt => BinaryOperator::Gt,
        BinaryOp::GtEq => BinaryOperator::GtEq,
        BinaryOp::And => BinaryOperator::And,
        BinaryOp::Or => BinaryOperator::Or,
        BinaryOp::Add => BinaryOperator::Plus,
        BinaryOp::Subtract => BinaryOperator::Minus,
        BinaryOp::Multiply => BinaryOperator::Multiply,
        BinaryOp::Divide => BinaryOperator::Divide,
        BinaryOp::Like => BinaryOperator::Like,
    }
}

fn function_name(function: ScalarFunction, dialect: SqlDialect) -> &'static str {
    match (function, dialect) {
        (ScalarFunction::Upper, _) => "UPPER",
        (ScalarFunction::Lower, _) => "LOWER",
        (ScalarFunction::Length, SqlDialect::SqlServer) => "LEN",
        (ScalarFunction::Length, SqlDialect::MySql) => "CHAR_LENGTH",
        (ScalarFunction::Length, _) => "LENGTH",
        (ScalarFunction::Abs, _) => "ABS",
        (ScalarFunction::Coalesce, _) => "COALESCE",
    }
}

impl Compiler<'_> {
    /// Translate `expr` over the given input column expressions.
    pub(super) fn translate(
        &mut self,
        expr: &Expr,
        inputs: &[Expression],
        position: Position,
    ) -> Result<Expression, CompileError> {
        let translated = match expr {
            Expr::Column(index) => inputs.get(*index).cloned().ok_or_else(|| {
                CompileError::InvalidPlan(format!(
                    "column {} out of range for {} inputs",
                    index,
                    inputs.len()
                ))
            })?,
            Expr::Outer(index) => self
                .outer
                .last()
                .and_then(|scope| scope.get(*index))
                .cloned()
                .ok_or_else(|| {
                    CompileError::InvalidPlan(format!(
                        "outer column {} is not visible from this scope",
                        index
                    ))
                })?,
            Expr::Literal(value) => Expression::Literal(value.clone()),
            Expr::Parameter { name, ty } => {
                let index = self.bind_named(name, *ty);
                Expression::Parameter(index)
            }
            Expr::RowCount(count) => {
                let index = self.bind(
                    RowCountSource(count.clone()),
                    SemanticType::Int64,
                    BindingKind::Regular,
                );
                Expression::Parameter(index)
            }
            Expr::Binary { op, left, right } => {
                let operand = if op.is_logical() {
                    Position::Predicate
                } else {
                    Position::Value
                };
                Expression::binary(
                    self.translate(left, inputs, operand)?,
                    operator(*op),
                    self.translate(right, inputs, operand)?,
                )
            }
            Expr::Not(inner) => {
                Expression::Not(Box::new(self.translate(inner, inputs, Position::Predicate)?))
            }
            Expr::IsNull { expr, negated } => Expression::IsNull {
                expr: Box::new(self.translate(expr, inputs, Position::Value)?),
                negated: *negated,
            },
            Expr::Between { expr, low, high } => Expression::Between {
                expr: Box::new(self.translate(expr, inputs, Position::Value)?),
                low: Box::new(self.translate(low, inputs, Position::Value)?),
                high: Box::new(self.translate(high, inputs, Position::Value)?),
            },
            Expr::Function { function, args } => Expression::Function {
                name: function_name(*function, self.caps.dialect).to_string(),
                args: args
                    .iter()
                    .map(|a| self.translate(a, inputs, Position::Value))
                    .collect::<Result<_, _>>()?,
            },
            Expr::Case {
                branches,
                otherwise,
            } => {
                let mut when_clauses = Vec::with_capacity(branches.len());
                for (when, then) in branches {
                    when_clauses.push((
                        self.translate(when, inputs, Position::Predicate)?,
                        self.translate(then, inputs, Position::Value)?,
                    ));
                }
                let else_clause = match otherwise {
                    Some(e) => Some(Box::new(self.translate(e, inputs, Position::Value)?)),
                    None => None,
                };
                Expression::Case {
                    when_clauses,
                    else_clause,
                }
            }
        };
        Ok(match position {
            Position::Value => self.as_value(translated),
            Position::Predicate => self.as_predicate(translated),
        })
    }

    /// Encode a predicate as `CASE WHEN .. THEN 1 ELSE 0 END` where the
    /// dialect cannot project booleans.
    pub(super) fn as_value(&self, expr: Expression) -> Expression {
        if self.caps.native_booleans || !expr.is_predicate() {
            return expr;
        }
        Expression::Case {
            when_clauses: vec![(expr, Expression::Literal(Value::Int(1)))],
            else_clause: Some(Box::new(Expression::Literal(Value::Int(0)))),
        }
    }

    /// Compare an encoded boolean value against 1 where the dialect cannot
    /// use it bare.
    pub(super) fn as_predicate(&self, expr: Expression) -> Expression {
        if self.caps.native_booleans || expr.is_predicate() {
            return expr;
        }
        Expression::eq(expr, Expression::Literal(Value::Int(1)))
    }

    fn bind_named(&mut self, name: &str, ty: SemanticType) -> usize {
        self.bind_shared(
            super::SharedBinding::Context(name.to_string()),
            ContextValue {
                name: name.to_string(),
            },
            ty,
        )
    }
}
