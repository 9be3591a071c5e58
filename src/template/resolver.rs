//! Post-compile resolution of templates into executable command text.
use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use super::{Marker, MarkerId, Segment, StatementTemplate};
use crate::capability::ParameterStyle;
use crate::error::ResolveError;
use crate::param::ParameterContext;
use crate::sql::{quote_ident, render_literal};
use crate::value::{SemanticType, Value};

/// Per-call marker values. Built fresh for every execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionConfiguration {
    pub placeholders: BTreeMap<String, String>,
    /// Variants whose main branch is emitted.
    pub variants: BTreeSet<MarkerId>,
    pub filters: BTreeMap<MarkerId, Vec<Vec<Value>>>,
}

impl ResolutionConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placeholder(mut self, name: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.placeholders.insert(name.into(), fragment.into());
        self
    }

    pub fn select_variant(mut self, id: MarkerId) -> Self {
        self.variants.insert(id);
        self
    }

    pub fn with_filter_rows(mut self, id: MarkerId, rows: Vec<Vec<Value>>) -> Self {
        self.filters.insert(id, rows);
        self
    }

    /// Derive marker values from the row-filter bindings of `template`:
    /// dynamic filters get their rows, variants are selected when their
    /// row set fits the inline limit, and temporary tables get their own
    /// placeholder name as table name.
    pub fn prepare(
        template: &StatementTemplate,
        ctx: &ParameterContext,
    ) -> Result<Self, ResolveError> {
        let mut config = Self::default();
        let limit = template.capabilities.max_inline_filter_rows;

        for marker in &template.markers {
            match marker {
                Marker::Placeholder { .. } => {}
                Marker::DynamicFilter { id, arity, rows } => {
                    let rows = binding_rows(template, *rows, ctx)?;
                    check_arity(*id, *arity, &rows)?;
                    config.filters.insert(*id, rows);
                }
                Marker::Variant { id, rows } => {
                    let count = binding_rows(template, *rows, ctx)?.len();
                    if count <= limit {
                        config.variants.insert(*id);
                    }
                }
            }
        }

        for table in &template.temporary_tables {
            config.placeholders.insert(
                table.placeholder.clone(),
                quote_ident(&table.placeholder, template.capabilities.dialect),
            );
        }

        Ok(config)
    }
}

/// A bound driver parameter, in command order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameter {
    pub binding: usize,
    /// Marker text as it appears in the command (`$1`, `?1`, `@p0`, `?`).
    pub marker: String,
    pub ty: SemanticType,
    pub value: Value,
}

/// Final command text with its parameters in driver order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommand {
    pub text: String,
    pub parameters: Vec<ResolvedParameter>,
}

impl ResolvedCommand {
    pub fn values(&self) -> Vec<Value> {
        self.parameters.iter().map(|p| p.value.clone()).collect()
    }
}

pub(crate) fn resolve(
    template: &StatementTemplate,
    config: &ResolutionConfiguration,
    ctx: &ParameterContext,
) -> Result<ResolvedCommand, ResolveError> {
    let mut resolution = Resolution {
        template,
        config,
        ctx,
        text: String::new(),
        parameters: Vec::new(),
        numbered: BTreeMap::new(),
    };
    resolution.segments(&template.segments)?;
    trace!(
        parameters = resolution.parameters.len(),
        text = %resolution.text,
        "resolved statement"
    );
    Ok(ResolvedCommand {
        text: resolution.text,
        parameters: resolution.parameters,
    })
}

fn binding_rows(
    template: &StatementTemplate,
    binding: usize,
    ctx: &ParameterContext,
) -> Result<Vec<Vec<Value>>, ResolveError> {
    let binding = template
        .bindings
        .get(binding)
        .ok_or_else(|| ResolveError::MissingParameter(format!("p{}", binding)))?;
    match binding.resolve(ctx)? {
        Value::Rows(rows) => Ok(rows),
        other => Err(ResolveError::ParameterType {
            name: format!("{:?}", binding.source),
            expected: "rows",
            found: other.kind(),
        }),
    }
}

fn check_arity(id: MarkerId, arity: usize, rows: &[Vec<Value>]) -> Result<(), ResolveError> {
    match rows.iter().find(|row| row.len() != arity) {
        Some(row) => Err(ResolveError::FilterArity {
            id,
            expected: arity,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

struct Resolution<'a> {
    template: &'a StatementTemplate,
    config: &'a ResolutionConfiguration,
    ctx: &'a ParameterContext,
    text: String,
    parameters: Vec<ResolvedParameter>,
    /// Binding index → position in `parameters`, for styles that reuse a
    /// marker on repeated occurrences.
    numbered: BTreeMap<usize, usize>,
}

impl Resolution<'_> {
    fn segments(&mut self, segments: &[Segment]) -> Result<(), ResolveError> {
        for segment in segments {
            match segment {
                Segment::Text(text) => self.text.push_str(text),
                Segment::Parameter(index) => self.parameter(*index)?,
                Segment::Placeholder(name) => {
                    let fragment = self
                        .config
                        .placeholders
                        .get(name)
                        .ok_or_else(|| ResolveError::UnresolvedPlaceholder(name.clone()))?;
                    self.text.push_str(fragment);
                }
                Segment::Variant {
                    id,
                    main,
                    alternative,
                } => {
                    if self.config.variants.contains(id) {
                        self.segments(main)?;
                    } else {
                        self.segments(alternative)?;
                    }
                }
                Segment::DynamicFilter { id, columns } => self.dynamic_filter(*id, columns)?,
            }
        }
        Ok(())
    }

    fn parameter(&mut self, index: usize) -> Result<(), ResolveError> {
        let style = self.template.capabilities.dialect.parameter_style();
        if style != ParameterStyle::Positional {
            if let Some(position) = self.numbered.get(&index) {
                let marker = self.parameters[*position].marker.clone();
                self.text.push_str(&marker);
                return Ok(());
            }
        }

        let binding = self
            .template
            .bindings
            .get(index)
            .ok_or_else(|| ResolveError::MissingParameter(format!("p{}", index)))?;
        let value = binding.resolve(self.ctx)?;
        let marker = match style {
            ParameterStyle::Positional => "?".to_string(),
            ParameterStyle::Numbered(prefix) => format!("{}{}", prefix, self.parameters.len() + 1),
            ParameterStyle::Named(prefix) => format!("{}p{}", prefix, index),
        };
        self.text.push_str(&marker);
        self.numbered.insert(index, self.parameters.len());
        self.parameters.push(ResolvedParameter {
            binding: index,
            marker,
            ty: binding.ty,
            value,
        });
        Ok(())
    }

    fn dynamic_filter(&mut self, id: MarkerId, columns: &[Vec<Segment>]) -> Result<(), ResolveError> {
        let rows = self
            .config
            .filters
            .get(&id)
            .ok_or(ResolveError::UnresolvedDynamicFilter(id))?;
        check_arity(id, columns.len(), rows)?;

        if rows.is_empty() {
            self.text.push_str("(1 = 0)");
            return Ok(());
        }

        let mut names = Vec::with_capacity(columns.len());
        for column in columns {
            let start = self.text.len();
            self.segments(column)?;
            names.push(self.text[start..].to_string());
            self.text.truncate(start);
        }

        let caps = &self.template.capabilities;
        let literal = |v: &Value| render_literal(v, caps);
        let predicate = if names.len() == 1 {
            let values: Vec<String> = rows.iter().map(|row| literal(&row[0])).collect();
            format!("({} IN ({}))", names[0], values.join(", "))
        } else if caps.row_value_in {
            let tuples: Vec<String> = rows
                .iter()
                .map(|row| {
                    let values: Vec<String> = row.iter().map(literal).collect();
                    format!("({})", values.join(", "))
                })
                .collect();
            format!("(({}) IN ({}))", names.join(", "), tuples.join(", "))
        } else {
            let alternatives: Vec<String> = rows
                .iter()
                .map(|row| {
                    let equalities: Vec<String> = names
                        .iter()
                        .zip(row)
                        .map(|(name, value)| format!("{} = {}", name, literal(value)))
                        .collect();
                    format!("({})", equalities.join(" AND "))
                })
                .collect();
            format!("({})", alternatives.join(" OR "))
        };
        self.text.push_str(&predicate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::param::{BindingKind, ContextValue, ParameterBinding, RowList};
    use crate::template::TemporaryTable;
    use pretty_assertions::assert_eq;

    fn template(segments: Vec<Segment>, caps: Capabilities) -> StatementTemplate {
        StatementTemplate {
            segments,
            bindings: vec![
                ParameterBinding::new(
                    ContextValue { name: "a".into() },
                    SemanticType::Int64,
                    BindingKind::Regular,
                ),
                ParameterBinding::new(
                    RowList {
                        name: "ids".into(),
                        types: vec![SemanticType::Int64],
                    },
                    SemanticType::Int64,
                    BindingKind::RowFilter,
                ),
            ],
            markers: vec![
                Marker::DynamicFilter {
                    id: MarkerId(0),
                    arity: 1,
                    rows: 1,
                },
                Marker::Variant {
                    id: MarkerId(1),
                    rows: 1,
                },
            ],
            columns: vec![],
            temporary_tables: vec![TemporaryTable {
                placeholder: "include_table_0".into(),
                columns: vec![],
                rows: 1,
            }],
            prerequisites: vec![],
            capabilities: caps,
        }
    }

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_string())
    }

    fn filter(columns: &[&str]) -> Segment {
        Segment::DynamicFilter {
            id: MarkerId(0),
            columns: columns.iter().map(|c| vec![text(c)]).collect(),
        }
    }

    #[test]
    fn test_numbered_parameters_reuse_marker() {
        let t = template(
            vec![
                text("SELECT 1 WHERE a = "),
                Segment::Parameter(0),
                text(" OR b = "),
                Segment::Parameter(0),
            ],
            Capabilities::postgres(),
        );
        let ctx = ParameterContext::new().with("a", 5i64);
        let cmd = t.resolve(&ResolutionConfiguration::new(), &ctx).unwrap();
        assert_eq!(cmd.text, "SELECT 1 WHERE a = $1 OR b = $1");
        assert_eq!(cmd.values(), vec![Value::Int(5)]);

        let positional = template(t.segments.clone(), Capabilities::mysql());
        let cmd = positional
            .resolve(&ResolutionConfiguration::new(), &ctx)
            .unwrap();
        assert_eq!(cmd.text, "SELECT 1 WHERE a = ? OR b = ?");
        assert_eq!(cmd.parameters.len(), 2);
    }

    #[test]
    fn test_empty_dynamic_filter_matches_nothing() {
        let t = template(
            vec![text("SELECT 1 WHERE "), filter(&["x"])],
            Capabilities::postgres(),
        );
        let config = ResolutionConfiguration::new().with_filter_rows(MarkerId(0), vec![]);
        let cmd = t.resolve(&config, &ParameterContext::new()).unwrap();
        assert_eq!(cmd.text, "SELECT 1 WHERE (1 = 0)");
    }

    #[test]
    fn test_multi_column_filter_encodings() {
        let rows = vec![vec![Value::Int(1), Value::from("a")], vec![Value::Int(2), Value::from("b")]];
        let segments = vec![filter(&["x", "y"])];
        let config = ResolutionConfiguration::new().with_filter_rows(MarkerId(0), rows);
        let ctx = ParameterContext::new();

        let pg = template(segments.clone(), Capabilities::postgres());
        assert_eq!(
            pg.resolve(&config, &ctx).unwrap().text,
            "((x, y) IN ((1, 'a'), (2, 'b')))"
        );
        let lite = template(segments, Capabilities::sqlite());
        assert_eq!(
            lite.resolve(&config, &ctx).unwrap().text,
            "((x = 1 AND y = 'a') OR (x = 2 AND y = 'b'))"
        );
    }

    #[test]
    fn test_unresolved_markers_are_errors() {
        let t = template(
            vec![filter(&["x"]), Segment::Placeholder("tbl".into())],
            Capabilities::postgres(),
        );
        let ctx = ParameterContext::new();
        assert_eq!(
            t.resolve(&ResolutionConfiguration::new(), &ctx),
            Err(ResolveError::UnresolvedDynamicFilter(MarkerId(0)))
        );
        let config = ResolutionConfiguration::new().with_filter_rows(MarkerId(0), vec![vec![Value::Int(1)]]);
        assert_eq!(
            t.resolve(&config, &ctx),
            Err(ResolveError::UnresolvedPlaceholder("tbl".into()))
        );
        let bad = ResolutionConfiguration::new()
            .with_filter_rows(MarkerId(0), vec![vec![Value::Int(1), Value::Int(2)]]);
        assert!(matches!(
            t.resolve(&bad, &ctx),
            Err(ResolveError::FilterArity { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn test_variant_emits_exactly_one_branch() {
        let t = template(
            vec![Segment::Variant {
                id: MarkerId(1),
                main: vec![text("MAIN")],
                alternative: vec![text("ALT")],
            }],
            Capabilities::postgres(),
        );
        let ctx = ParameterContext::new();
        let selected = ResolutionConfiguration::new().select_variant(MarkerId(1));
        assert_eq!(t.resolve(&selected, &ctx).unwrap().text, "MAIN");
        assert_eq!(
            t.resolve(&ResolutionConfiguration::new(), &ctx).unwrap().text,
            "ALT"
        );
    }

    #[test]
    fn test_prepare_from_context() {
        let caps = Capabilities::postgres().with_max_inline_filter_rows(2);
        let t = template(vec![], caps);

        let small = ParameterContext::new().with("ids", Value::Rows(vec![vec![1.into()]]));
        let config = ResolutionConfiguration::prepare(&t, &small).unwrap();
        assert!(config.variants.contains(&MarkerId(1)));
        assert_eq!(config.filters[&MarkerId(0)], vec![vec![Value::Int(1)]]);
        assert_eq!(config.placeholders["include_table_0"], "\"include_table_0\"");

        let large = ParameterContext::new().with(
            "ids",
            Value::Rows((0..3).map(|i| vec![Value::Int(i)]).collect()),
        );
        let config = ResolutionConfiguration::prepare(&t, &large).unwrap();
        assert!(config.variants.is_empty());
    }
}
