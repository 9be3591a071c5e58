//! Parameter bindings and the sources that produce their runtime values.
//!
//! A compiled template never captures runtime state. Each binding names a
//! [`ParameterSource`] that is evaluated against the [`ParameterContext`] of
//! one execution.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::plan::RowCount;
use crate::value::{SemanticType, Value};

/// Named runtime values supplied for one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterContext {
    values: BTreeMap<String, Value>,
}

impl ParameterContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Value, ResolveError> {
        self.get(name)
            .ok_or_else(|| ResolveError::MissingParameter(name.to_string()))
    }
}

/// Produces the value of a binding for one execution.
pub trait ParameterSource: fmt::Debug + Send + Sync {
    fn resolve(&self, ctx: &ParameterContext) -> Result<Value, ResolveError>;
}

/// Value fixed at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant(pub Value);

impl ParameterSource for Constant {
    fn resolve(&self, _ctx: &ParameterContext) -> Result<Value, ResolveError> {
        Ok(self.0.clone())
    }
}

/// A named context value, passed through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextValue {
    pub name: String,
}

impl ParameterSource for ContextValue {
    fn resolve(&self, ctx: &ParameterContext) -> Result<Value, ResolveError> {
        ctx.require(&self.name).cloned()
    }
}

/// One element of a key tuple. A scalar context value stands in for a
/// one-element tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleElement {
    pub name: String,
    pub index: usize,
}

impl ParameterSource for TupleElement {
    fn resolve(&self, ctx: &ParameterContext) -> Result<Value, ResolveError> {
        match ctx.require(&self.name)? {
            Value::Tuple(items) => items.get(self.index).cloned().ok_or_else(|| {
                ResolveError::ParameterType {
                    name: self.name.clone(),
                    expected: "tuple with enough elements",
                    found: "shorter tuple",
                }
            }),
            Value::Rows(_) => Err(ResolveError::ParameterType {
                name: self.name.clone(),
                expected: "tuple",
                found: "rows",
            }),
            scalar if self.index == 0 => Ok(scalar.clone()),
            other => Err(ResolveError::ParameterType {
                name: self.name.clone(),
                expected: "tuple",
                found: other.kind(),
            }),
        }
    }
}

/// Variable-length row set for membership filters, typed per key column.
#[derive(Debug, Clone, PartialEq)]
pub struct RowList {
    pub name: String,
    pub types: Vec<SemanticType>,
}

impl RowList {
    pub fn arity(&self) -> usize {
        self.types.len()
    }
}

impl ParameterSource for RowList {
    fn resolve(&self, ctx: &ParameterContext) -> Result<Value, ResolveError> {
        match ctx.require(&self.name)? {
            rows @ Value::Rows(_) => Ok(rows.clone()),
            // A single-column row set may be given as a flat tuple.
            Value::Tuple(items) if self.arity() == 1 => Ok(Value::Rows(
                items.iter().map(|v| vec![v.clone()]).collect(),
            )),
            other => Err(ResolveError::ParameterType {
                name: self.name.clone(),
                expected: "rows",
                found: other.kind(),
            }),
        }
    }
}

/// Late-bound row count of a skip/take.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCountSource(pub RowCount);

impl RowCountSource {
    fn evaluate(count: &RowCount, ctx: &ParameterContext) -> Result<i64, ResolveError> {
        let out_of_range = || ResolveError::RowCountOutOfRange {
            name: label(count),
        };
        match count {
            RowCount::Literal(n) => i64::try_from(*n).map_err(|_| out_of_range()),
            RowCount::Parameter(name) => {
                let value = ctx.require(name)?;
                let n = value.as_i64().ok_or_else(|| ResolveError::ParameterType {
                    name: name.clone(),
                    expected: "int",
                    found: value.kind(),
                })?;
                if n < 0 {
                    return Err(out_of_range());
                }
                Ok(n)
            }
            RowCount::Sum(parts) => {
                let mut total = 0i64;
                for part in parts {
                    total = total
                        .checked_add(Self::evaluate(part, ctx)?)
                        .ok_or_else(out_of_range)?;
                }
                Ok(total)
            }
        }
    }
}

fn label(count: &RowCount) -> String {
    match count {
        RowCount::Literal(n) => n.to_string(),
        RowCount::Parameter(name) => name.clone(),
        RowCount::Sum(parts) => parts.iter().map(label).collect::<Vec<_>>().join(" + "),
    }
}

impl ParameterSource for RowCountSource {
    fn resolve(&self, ctx: &ParameterContext) -> Result<Value, ResolveError> {
        Self::evaluate(&self.0, ctx).map(Value::Int)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// One value per execution.
    Regular,
    /// Row set consumed by a dynamic filter or temporary table, never sent
    /// as a driver parameter.
    RowFilter,
    Limit,
    Offset,
}

#[derive(Debug, Clone)]
pub struct ParameterBinding {
    pub source: Arc<dyn ParameterSource>,
    /// Scalar type of the bound value. A row-filter binding reports its
    /// first key column here; [`RowList::types`] holds every column.
    pub ty: SemanticType,
    pub kind: BindingKind,
}

impl ParameterBinding {
    pub fn new(source: impl ParameterSource + 'static, ty: SemanticType, kind: BindingKind) -> Self {
        Self {
            source: Arc::new(source),
            ty,
            kind,
        }
    }

    pub fn resolve(&self, ctx: &ParameterContext) -> Result<Value, ResolveError> {
        self.source.resolve(ctx)
    }
}

impl fmt::Display for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} <- {:?}", self.kind, self.ty.name(), self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_element() {
        let ctx = ParameterContext::new().with("key", Value::Tuple(vec![7.into(), "a".into()]));
        let first = TupleElement {
            name: "key".into(),
            index: 0,
        };
        let second = TupleElement {
            name: "key".into(),
            index: 1,
        };
        assert_eq!(first.resolve(&ctx).unwrap(), Value::Int(7));
        assert_eq!(second.resolve(&ctx).unwrap(), Value::from("a"));

        let scalar = ParameterContext::new().with("key", 9i64);
        assert_eq!(first.resolve(&scalar).unwrap(), Value::Int(9));
        assert!(matches!(
            second.resolve(&scalar),
            Err(ResolveError::ParameterType { .. })
        ));
    }

    #[test]
    fn test_missing_parameter() {
        let source = ContextValue {
            name: "absent".into(),
        };
        assert_eq!(
            source.resolve(&ParameterContext::new()),
            Err(ResolveError::MissingParameter("absent".into()))
        );
    }

    #[test]
    fn test_row_count_sum() {
        let ctx = ParameterContext::new().with("skip", 20i64).with("take", 5i64);
        let count = RowCountSource(
            RowCount::parameter("skip").plus(RowCount::parameter("take")),
        );
        assert_eq!(count.resolve(&ctx).unwrap(), Value::Int(25));

        let bad = ParameterContext::new().with("skip", "x").with("take", 5i64);
        assert!(count.resolve(&bad).is_err());
    }

    #[test]
    fn test_row_count_rejects_negative_values() {
        let ctx = ParameterContext::new().with("take", -1i64);
        assert_eq!(
            RowCountSource(RowCount::parameter("take")).resolve(&ctx),
            Err(ResolveError::RowCountOutOfRange {
                name: "take".into()
            })
        );
    }

    #[test]
    fn test_row_count_overflow_is_an_error() {
        let ctx = ParameterContext::new().with("skip", i64::MAX).with("take", 1i64);
        let high = RowCountSource(RowCount::parameter("skip").plus(RowCount::parameter("take")));
        assert_eq!(
            high.resolve(&ctx),
            Err(ResolveError::RowCountOutOfRange {
                name: "skip + take".into()
            })
        );

        let literal = RowCountSource(RowCount::Literal(u64::MAX));
        assert!(matches!(
            literal.resolve(&ParameterContext::new()),
            Err(ResolveError::RowCountOutOfRange { .. })
        ));
    }

    #[test]
    fn test_row_list_accepts_flat_tuple_for_single_column() {
        let ctx = ParameterContext::new().with("ids", Value::Tuple(vec![1.into(), 2.into()]));
        let rows = RowList {
            name: "ids".into(),
            types: vec![SemanticType::Int64],
        }
        .resolve(&ctx)
        .unwrap();
        assert_eq!(
            rows,
            Value::Rows(vec![vec![Value::Int(1)], vec![Value::Int(2)]])
        );
    }
}
