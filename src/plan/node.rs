//! Plan node kinds and their output schemas.
use std::fmt;

use serde::{Deserialize, Serialize};

use super::expr::{Expr, RowCount};
use crate::value::SemanticType;

/// Index of a node inside a [`super::PlanArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// One output column of a plan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: SemanticType,
    #[serde(default)]
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: SemanticType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn is_ascending(&self) -> bool {
        matches!(self, Direction::Ascending)
    }
}

/// Order key over a node's columns (input columns for Sort/RowNumber
/// parameters, output columns in a [`Schema`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: usize,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderKey {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            direction: Direction::Descending,
        }
    }
}

/// Output schema of a node: its columns plus the order its rows carry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    pub columns: Vec<Column>,
    pub order: Vec<OrderKey>,
}

impl Schema {
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn types(&self) -> Vec<SemanticType> {
        self.columns.iter().map(|c| c.ty).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IndexKind {
    Primary,
    Secondary { name: String },
    /// Partial index: rows satisfying a static predicate over the table.
    Filtered { predicate: Expr },
    /// Virtual index over several tables sharing one column layout.
    Union { tables: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexScan {
    pub table: String,
    pub columns: Vec<Column>,
    pub kind: IndexKind,
    /// Key columns the index is ordered by.
    #[serde(default)]
    pub key: Vec<OrderKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedColumn {
    pub name: String,
    pub ty: SemanticType,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateColumn {
    pub function: AggregateFunction,
    /// Input column; `None` only for `COUNT(*)`.
    pub column: Option<usize>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    LeftOuter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyType {
    Cross,
    Outer,
    Existing,
    NotExisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetKind {
    Union,
    Concat,
    Except,
    Intersect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    Shared,
    Exclusive,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockBehavior {
    #[default]
    Wait,
    NoWait,
    SkipLocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeAlgorithm {
    #[default]
    Auto,
    DynamicFilter,
    TemporaryTable,
}

/// Logical operator together with its parameters and child ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum PlanKind {
    Index(IndexScan),
    /// Named table; with a source the table is filled from it first.
    Store {
        name: String,
        columns: Vec<Column>,
        #[serde(default)]
        source: Option<NodeId>,
    },
    Select {
        source: NodeId,
        columns: Vec<usize>,
    },
    Filter {
        source: NodeId,
        predicate: Expr,
    },
    Calculate {
        source: NodeId,
        columns: Vec<CalculatedColumn>,
    },
    Alias {
        source: NodeId,
        alias: String,
    },
    Sort {
        source: NodeId,
        order: Vec<OrderKey>,
    },
    Distinct {
        source: NodeId,
    },
    Aggregate {
        source: NodeId,
        group_by: Vec<usize>,
        aggregates: Vec<AggregateColumn>,
    },
    Join {
        left: NodeId,
        right: NodeId,
        join_type: JoinType,
        /// `(left column, right column)` equality pairs.
        equal_pairs: Vec<(usize, usize)>,
    },
    PredicateJoin {
        left: NodeId,
        right: NodeId,
        join_type: JoinType,
        predicate: Expr,
    },
    Apply {
        left: NodeId,
        right: NodeId,
        apply_type: ApplyType,
    },
    Skip {
        source: NodeId,
        count: RowCount,
    },
    Take {
        source: NodeId,
        count: RowCount,
    },
    Paging {
        source: NodeId,
        skip: RowCount,
        take: RowCount,
    },
    RowNumber {
        source: NodeId,
        column: String,
        #[serde(default)]
        order: Vec<OrderKey>,
    },
    Set {
        kind: SetKind,
        left: NodeId,
        right: NodeId,
    },
    /// Point lookup: equality on each key column against one runtime key
    /// tuple supplied as the named parameter.
    Seek {
        source: NodeId,
        key_columns: Vec<usize>,
        key: String,
    },
    Lock {
        source: NodeId,
        mode: LockMode,
        #[serde(default)]
        behavior: LockBehavior,
    },
    Existence {
        source: NodeId,
        column: String,
    },
    /// Appends a boolean column telling whether the filter columns of a row
    /// occur in the row set supplied as the named parameter.
    Include {
        source: NodeId,
        filter_columns: Vec<usize>,
        rows: String,
        #[serde(default)]
        algorithm: IncludeAlgorithm,
        column: String,
    },
}

/// Fieldless operator tag, used for classification and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Index,
    Store,
    Select,
    Filter,
    Calculate,
    Alias,
    Sort,
    Distinct,
    Aggregate,
    Join,
    PredicateJoin,
    Apply,
    Skip,
    Take,
    Paging,
    RowNumber,
    Union,
    Concat,
    Except,
    Intersect,
    Seek,
    Lock,
    Existence,
    Include,
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Index => "Index",
            Operator::Store => "Store",
            Operator::Select => "Select",
            Operator::Filter => "Filter",
            Operator::Calculate => "Calculate",
            Operator::Alias => "Alias",
            Operator::Sort => "Sort",
            Operator::Distinct => "Distinct",
            Operator::Aggregate => "Aggregate",
            Operator::Join => "Join",
            Operator::PredicateJoin => "PredicateJoin",
            Operator::Apply => "Apply",
            Operator::Skip => "Skip",
            Operator::Take => "Take",
            Operator::Paging => "Paging",
            Operator::RowNumber => "RowNumber",
            Operator::Union => "Union",
            Operator::Concat => "Concat",
            Operator::Except => "Except",
            Operator::Intersect => "Intersect",
            Operator::Seek => "Seek",
            Operator::Lock => "Lock",
            Operator::Existence => "Existence",
            Operator::Include => "Include",
        }
    }

    /// Correctness depends on the order of the input rows.
    pub fn is_order_sensitive(&self) -> bool {
        matches!(
            self,
            Operator::Skip | Operator::Take | Operator::Paging | Operator::Seek | Operator::RowNumber
        )
    }

    /// Output carries the (left) input's order unchanged.
    pub fn is_order_preserving(&self) -> bool {
        matches!(
            self,
            Operator::Select
                | Operator::Filter
                | Operator::Calculate
                | Operator::Alias
                | Operator::Distinct
                | Operator::Join
                | Operator::PredicateJoin
                | Operator::Apply
                | Operator::Skip
                | Operator::Take
                | Operator::Paging
                | Operator::RowNumber
                | Operator::Seek
                | Operator::Lock
                | Operator::Include
        )
    }

    /// Output has no meaningful order whatever the input order was.
    pub fn is_order_breaking(&self) -> bool {
        matches!(
            self,
            Operator::Union
                | Operator::Concat
                | Operator::Except
                | Operator::Intersect
                | Operator::Existence
                | Operator::Aggregate
        )
    }

    /// Establishes order from its own keys.
    pub fn is_sorter(&self) -> bool {
        matches!(self, Operator::Sort | Operator::Index)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PlanKind {
    pub fn operator(&self) -> Operator {
        match self {
            PlanKind::Index(_) => Operator::Index,
            PlanKind::Store { .. } => Operator::Store,
            PlanKind::Select { .. } => Operator::Select,
            PlanKind::Filter { .. } => Operator::Filter,
            PlanKind::Calculate { .. } => Operator::Calculate,
            PlanKind::Alias { .. } => Operator::Alias,
            PlanKind::Sort { .. } => Operator::Sort,
            PlanKind::Distinct { .. } => Operator::Distinct,
            PlanKind::Aggregate { .. } => Operator::Aggregate,
            PlanKind::Join { .. } => Operator::Join,
            PlanKind::PredicateJoin { .. } => Operator::PredicateJoin,
            PlanKind::Apply { .. } => Operator::Apply,
            PlanKind::Skip { .. } => Operator::Skip,
            PlanKind::Take { .. } => Operator::Take,
            PlanKind::Paging { .. } => Operator::Paging,
            PlanKind::RowNumber { .. } => Operator::RowNumber,
            PlanKind::Set { kind, .. } => match kind {
                SetKind::Union => Operator::Union,
                SetKind::Concat => Operator::Concat,
                SetKind::Except => Operator::Except,
                SetKind::Intersect => Operator::Intersect,
            },
            PlanKind::Seek { .. } => Operator::Seek,
            PlanKind::Lock { .. } => Operator::Lock,
            PlanKind::Existence { .. } => Operator::Existence,
            PlanKind::Include { .. } => Operator::Include,
        }
    }

    /// Child ids, left before right.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            PlanKind::Index(_) => vec![],
            PlanKind::Store { source, .. } => source.iter().copied().collect(),
            PlanKind::Select { source, .. }
            | PlanKind::Filter { source, .. }
            | PlanKind::Calculate { source, .. }
            | PlanKind::Alias { source, .. }
            | PlanKind::Sort { source, .. }
            | PlanKind::Distinct { source }
            | PlanKind::Aggregate { source, .. }
            | PlanKind::Skip { source, .. }
            | PlanKind::Take { source, .. }
            | PlanKind::Paging { source, .. }
            | PlanKind::RowNumber { source, .. }
            | PlanKind::Seek { source, .. }
            | PlanKind::Lock { source, .. }
            | PlanKind::Existence { source, .. }
            | PlanKind::Include { source, .. } => vec![*source],
            PlanKind::Join { left, right, .. }
            | PlanKind::PredicateJoin { left, right, .. }
            | PlanKind::Apply { left, right, .. }
            | PlanKind::Set { left, right, .. } => vec![*left, *right],
        }
    }

    /// Copy of this node with every child id passed through `f`.
    pub fn map_children(&self, mut f: impl FnMut(NodeId) -> NodeId) -> PlanKind {
        let mut kind = self.clone();
        match &mut kind {
            PlanKind::Index(_) => {}
            PlanKind::Store { source, .. } => {
                if let Some(id) = source {
                    *id = f(*id);
                }
            }
            PlanKind::Select { source, .. }
            | PlanKind::Filter { source, .. }
            | PlanKind::Calculate { source, .. }
            | PlanKind::Alias { source, .. }
            | PlanKind::Sort { source, .. }
            | PlanKind::Distinct { source }
            | PlanKind::Aggregate { source, .. }
            | PlanKind::Skip { source, .. }
            | PlanKind::Take { source, .. }
            | PlanKind::Paging { source, .. }
            | PlanKind::RowNumber { source, .. }
            | PlanKind::Seek { source, .. }
            | PlanKind::Lock { source, .. }
            | PlanKind::Existence { source, .. }
            | PlanKind::Include { source, .. } => *source = f(*source),
            PlanKind::Join { left, right, .. }
            | PlanKind::PredicateJoin { left, right, .. }
            | PlanKind::Apply { left, right, .. }
            | PlanKind::Set { left, right, .. } => {
                *left = f(*left);
                *right = f(*right);
            }
        }
        kind
    }

    /// Scalar expressions carried by this node.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            PlanKind::Index(scan) => match &scan.kind {
                IndexKind::Filtered { predicate } => vec![predicate],
                _ => vec![],
            },
            PlanKind::Filter { predicate, .. } | PlanKind::PredicateJoin { predicate, .. } => {
                vec![predicate]
            }
            PlanKind::Calculate { columns, .. } => columns.iter().map(|c| &c.expr).collect(),
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_axes_are_disjoint_where_expected() {
        let all = [
            Operator::Index,
            Operator::Store,
            Operator::Select,
            Operator::Filter,
            Operator::Sort,
            Operator::Union,
            Operator::Existence,
            Operator::Take,
        ];
        for op in all {
            assert!(
                !(op.is_order_preserving() && op.is_order_breaking()),
                "{} both preserves and breaks order",
                op
            );
        }
        assert!(Operator::Take.is_order_sensitive());
        assert!(Operator::Concat.is_order_breaking());
        assert!(Operator::Index.is_sorter());
        assert!(!Operator::Filter.is_sorter());
    }

    #[test]
    fn test_map_children() {
        let kind = PlanKind::Join {
            left: NodeId(0),
            right: NodeId(1),
            join_type: JoinType::Inner,
            equal_pairs: vec![(0, 0)],
        };
        let mapped = kind.map_children(|id| NodeId(id.0 + 10));
        assert_eq!(mapped.children(), vec![NodeId(10), NodeId(11)]);
        assert_eq!(mapped.operator(), Operator::Join);
    }

    #[test]
    fn test_plan_kind_json_shape() {
        let kind: PlanKind = serde_json::from_str(
            r#"{"op":"take","source":3,"count":{"parameter":"take"}}"#,
        )
        .unwrap();
        assert_eq!(
            kind,
            PlanKind::Take {
                source: NodeId(3),
                count: RowCount::Parameter("take".into()),
            }
        );
    }
}
