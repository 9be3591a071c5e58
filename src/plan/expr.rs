//! Scalar expressions carried by plan nodes.
//!
//! Column references are positional: `Column(i)` is the i-th column of the
//! node's input (for joins, of the concatenated left and right inputs).
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::value::{SemanticType, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Column(usize),
    /// Column of the left input of the enclosing apply.
    Outer(usize),
    Literal(Value),
    /// Named runtime parameter, bound per execution.
    Parameter {
        name: String,
        ty: SemanticType,
    },
    RowCount(RowCount),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Function {
        function: ScalarFunction,
        args: Vec<Expr>,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
    Subtract,
    Multiply,
    Divide,
    Like,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::Like
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarFunction {
    Upper,
    Lower,
    Length,
    Abs,
    Coalesce,
}

/// A late-bound row count (skip/take argument).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowCount {
    Literal(u64),
    Parameter(String),
    Sum(Vec<RowCount>),
}

impl RowCount {
    pub fn parameter(name: impl Into<String>) -> Self {
        RowCount::Parameter(name.into())
    }

    pub fn plus(self, other: RowCount) -> Self {
        match self {
            RowCount::Sum(mut parts) => {
                parts.push(other);
                RowCount::Sum(parts)
            }
            single => RowCount::Sum(vec![single, other]),
        }
    }
}

impl From<u64> for RowCount {
    fn from(n: u64) -> Self {
        RowCount::Literal(n)
    }
}

impl Expr {
    pub fn column(index: usize) -> Self {
        Expr::Column(index)
    }

    pub fn outer(index: usize) -> Self {
        Expr::Outer(index)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn parameter(name: impl Into<String>, ty: SemanticType) -> Self {
        Expr::Parameter {
            name: name.into(),
            ty,
        }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Eq, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Gt, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Lt, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Or, right)
    }

    /// Join a list of predicates with AND. `None` when the list is empty.
    pub fn conjunction(parts: Vec<Expr>) -> Option<Expr> {
        parts.into_iter().reduce(Expr::and)
    }

    /// Split a predicate into its top-level AND-ed parts.
    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let mut parts = left.into_conjuncts();
                parts.extend(right.into_conjuncts());
                parts
            }
            other => vec![other],
        }
    }

    /// Collect the input columns referenced by this expression.
    pub fn collect_columns(&self, out: &mut BTreeSet<usize>) {
        self.visit(&mut |e| {
            if let Expr::Column(i) = e {
                out.insert(*i);
            }
        });
    }

    pub fn columns(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    pub fn has_outer_references(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e, Expr::Outer(_)) {
                found = true;
            }
        });
        found
    }

    /// Largest referenced input column, if any.
    pub fn max_column(&self) -> Option<usize> {
        self.columns().into_iter().next_back()
    }

    /// Rewrite input column indices. Outer references are left untouched.
    pub fn remap_columns(&self, map: &impl Fn(usize) -> usize) -> Expr {
        match self {
            Expr::Column(i) => Expr::Column(map(*i)),
            Expr::Outer(_) | Expr::Literal(_) | Expr::Parameter { .. } | Expr::RowCount(_) => {
                self.clone()
            }
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.remap_columns(map)),
                right: Box::new(right.remap_columns(map)),
            },
            Expr::Not(inner) => Expr::Not(Box::new(inner.remap_columns(map))),
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.remap_columns(map)),
                negated: *negated,
            },
            Expr::Between { expr, low, high } => Expr::Between {
                expr: Box::new(expr.remap_columns(map)),
                low: Box::new(low.remap_columns(map)),
                high: Box::new(high.remap_columns(map)),
            },
            Expr::Function { function, args } => Expr::Function {
                function: *function,
                args: args.iter().map(|a| a.remap_columns(map)).collect(),
            },
            Expr::Case {
                branches,
                otherwise,
            } => Expr::Case {
                branches: branches
                    .iter()
                    .map(|(w, t)| (w.remap_columns(map), t.remap_columns(map)))
                    .collect(),
                otherwise: otherwise.as_ref().map(|o| Box::new(o.remap_columns(map))),
            },
        }
    }

    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Column(_)
            | Expr::Outer(_)
            | Expr::Literal(_)
            | Expr::Parameter { .. }
            | Expr::RowCount(_) => {}
            Expr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Not(inner) => inner.visit(f),
            Expr::IsNull { expr, .. } => expr.visit(f),
            Expr::Between { expr, low, high } => {
                expr.visit(f);
                low.visit(f);
                high.visit(f);
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                for (w, t) in branches {
                    w.visit(f);
                    t.visit(f);
                }
                if let Some(o) = otherwise {
                    o.visit(f);
                }
            }
        }
    }
}
