//! Resolved commands executed against in-memory SQLite.
use std::sync::Arc;

use plansql::capability::PagingSupport;
use plansql::plan::{
    Column, Expr, IncludeAlgorithm, JoinType, NodeId, OrderKey, PlanKind, RowCount, SetKind,
};
use plansql::{
    compile, Capabilities, ParameterContext, Plan, PlanBuilder, QueryRequest,
    ResolutionConfiguration, ResolveError, ResolvedCommand, SemanticType, StatementTemplate, Value,
};
use pretty_assertions::assert_eq;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;

fn database() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER);",
    )
    .unwrap();
    for id in 1..=10 {
        conn.execute(
            "INSERT INTO items (id, name) VALUES (?1, ?2)",
            rusqlite::params![id, format!("item{:02}", id)],
        )
        .unwrap();
    }
    for (id, name) in [(1, "carol"), (2, "alice"), (3, "bob")] {
        conn.execute(
            "INSERT INTO customers (id, name) VALUES (?1, ?2)",
            rusqlite::params![id, name],
        )
        .unwrap();
    }
    for (id, customer) in [(1, 1), (2, 2), (3, 3)] {
        conn.execute(
            "INSERT INTO orders (id, customer_id) VALUES (?1, ?2)",
            rusqlite::params![id, customer],
        )
        .unwrap();
    }
    conn
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        other => panic!("no scalar SQLite value for {:?}", other),
    }
}

/// First column of every row, as integers.
fn first_column(conn: &Connection, command: &ResolvedCommand) -> Vec<i64> {
    let mut stmt = conn.prepare(&command.text).unwrap();
    let values: Vec<SqlValue> = command.values().iter().map(to_sql).collect();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), |row| row.get::<_, i64>(0))
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

fn column(conn: &Connection, command: &ResolvedCommand, index: usize) -> Vec<i64> {
    let mut stmt = conn.prepare(&command.text).unwrap();
    let values: Vec<SqlValue> = command.values().iter().map(to_sql).collect();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), |row| row.get::<_, i64>(index))
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

fn names(conn: &Connection, command: &ResolvedCommand) -> Vec<String> {
    let mut stmt = conn.prepare(&command.text).unwrap();
    let values: Vec<SqlValue> = command.values().iter().map(to_sql).collect();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), |row| row.get::<_, String>(0))
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

/// Every row rendered as text, for comparing result sets of any shape.
fn query_strings(conn: &Connection, command: &ResolvedCommand) -> Vec<String> {
    let mut stmt = conn.prepare(&command.text).unwrap();
    let width = stmt.column_count();
    let values: Vec<SqlValue> = command.values().iter().map(to_sql).collect();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), |row| {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(format!("{:?}", row.get::<_, SqlValue>(i)?));
            }
            Ok(cells.join("|"))
        })
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

fn resolve(template: &StatementTemplate, ctx: &ParameterContext) -> ResolvedCommand {
    let config = ResolutionConfiguration::prepare(template, ctx).unwrap();
    template.resolve(&config, ctx).unwrap()
}

fn two_columns(b: &mut PlanBuilder, table: &str, second: &str, key: Vec<OrderKey>) -> NodeId {
    b.index(
        table,
        vec![
            Column::new("id", SemanticType::Int64),
            Column::new(second, SemanticType::String),
        ],
        key,
    )
    .unwrap()
}

fn manual() -> Capabilities {
    Capabilities::sqlite().with_paging(PagingSupport::None)
}

fn paged_items() -> Plan {
    let mut b = PlanBuilder::new();
    let scan = two_columns(&mut b, "items", "name", vec![]);
    let sorted = b.sort(scan, vec![OrderKey::asc(0)]).unwrap();
    let page = b
        .add(PlanKind::Paging {
            source: sorted,
            skip: RowCount::parameter("skip"),
            take: RowCount::parameter("take"),
        })
        .unwrap();
    b.finish(page).unwrap()
}

#[test]
fn test_paging_matches_between_native_and_manual() {
    let conn = database();
    let plan = paged_items();
    let ctx = ParameterContext::new().with("skip", 2i64).with("take", 3i64);

    let native = compile(&plan, &Capabilities::sqlite()).unwrap();
    let command = resolve(&native, &ctx);
    assert!(command.text.contains("LIMIT ?1 OFFSET ?2"));
    assert_eq!(first_column(&conn, &command), vec![3, 4, 5]);

    let emulated = compile(&plan, &manual()).unwrap();
    let command = resolve(&emulated, &ctx);
    assert!(!command.text.contains("LIMIT"));
    assert_eq!(command.values(), vec![Value::Int(3), Value::Int(5)]);
    assert_eq!(first_column(&conn, &command), vec![3, 4, 5]);
}

#[test]
fn test_one_template_serves_every_page() {
    let conn = database();
    let template = compile(&paged_items(), &manual()).unwrap();
    for (skip, expected) in [(0i64, vec![1, 2, 3]), (8, vec![9, 10]), (10, vec![])] {
        let ctx = ParameterContext::new().with("skip", skip).with("take", 3i64);
        assert_eq!(first_column(&conn, &resolve(&template, &ctx)), expected);
    }
}

/// Items sorted by descending id with only the name projected.
fn paged_names() -> Plan {
    let mut b = PlanBuilder::new();
    let scan = two_columns(&mut b, "items", "name", vec![]);
    let sorted = b.sort(scan, vec![OrderKey::desc(0)]).unwrap();
    let projected = b.select(sorted, vec![1]).unwrap();
    let page = b
        .add(PlanKind::Paging {
            source: projected,
            skip: RowCount::parameter("skip"),
            take: RowCount::parameter("take"),
        })
        .unwrap();
    b.finish(page).unwrap()
}

#[test]
fn test_take_with_hidden_sort_key_matches_native() {
    let conn = database();
    let mut b = PlanBuilder::new();
    let scan = two_columns(&mut b, "items", "name", vec![]);
    let sorted = b.sort(scan, vec![OrderKey::desc(0)]).unwrap();
    let projected = b.select(sorted, vec![1]).unwrap();
    let take = b.take(projected, RowCount::parameter("take")).unwrap();
    let plan = b.finish(take).unwrap();
    let ctx = ParameterContext::new().with("take", 3i64);

    let native = names(&conn, &resolve(&compile(&plan, &Capabilities::sqlite()).unwrap(), &ctx));
    let emulated = names(&conn, &resolve(&compile(&plan, &manual()).unwrap(), &ctx));
    assert_eq!(native, vec!["item10", "item09", "item08"]);
    assert_eq!(emulated, native);
}

#[test]
fn test_every_page_matches_between_native_and_manual() {
    let conn = database();
    let rows = 10i64;
    for plan in [paged_items(), paged_names()] {
        let native = compile(&plan, &Capabilities::sqlite()).unwrap();
        let emulated = compile(&plan, &manual()).unwrap();
        for skip in 0..=rows {
            for take in [0, 1, 3, rows] {
                let ctx = ParameterContext::new().with("skip", skip).with("take", take);
                let native_rows = query_strings(&conn, &resolve(&native, &ctx));
                let emulated_rows = query_strings(&conn, &resolve(&emulated, &ctx));
                let expected = usize::try_from(take.min(rows - skip)).unwrap();
                assert_eq!(native_rows.len(), expected, "skip={} take={}", skip, take);
                assert_eq!(emulated_rows, native_rows, "skip={} take={}", skip, take);
            }
        }
    }
}

#[test]
fn test_out_of_range_page_is_a_resolve_error() {
    let template = compile(&paged_items(), &manual()).unwrap();
    let ctx = ParameterContext::new()
        .with("skip", i64::MAX)
        .with("take", 1i64);
    let result = ResolutionConfiguration::prepare(&template, &ctx)
        .and_then(|config| template.resolve(&config, &ctx));
    assert!(matches!(result, Err(ResolveError::RowCountOutOfRange { .. })));

    let native = compile(&paged_items(), &Capabilities::sqlite()).unwrap();
    let ctx = ParameterContext::new().with("skip", 0i64).with("take", -1i64);
    let result = ResolutionConfiguration::prepare(&native, &ctx)
        .and_then(|config| native.resolve(&config, &ctx));
    assert!(matches!(result, Err(ResolveError::RowCountOutOfRange { .. })));
}

#[test]
fn test_seek_resolves_each_key() {
    let conn = database();
    let mut b = PlanBuilder::new();
    let scan = two_columns(&mut b, "items", "name", vec![]);
    let seek = b.seek(scan, vec![0], "key").unwrap();
    let filtered = b
        .filter(
            seek,
            Expr::IsNull {
                expr: Box::new(Expr::column(1)),
                negated: true,
            },
        )
        .unwrap();
    let template = compile(&b.finish(filtered).unwrap(), &Capabilities::sqlite()).unwrap();
    assert_eq!(template.bindings().len(), 1);

    for key in [7i64, 9] {
        let command = resolve(&template, &ParameterContext::new().with("key", key));
        assert_eq!(command.values(), vec![Value::Int(key)]);
        assert_eq!(first_column(&conn, &command), vec![key]);
    }
}

#[test]
fn test_sort_over_union_orders_combined_rows() {
    let conn = database();
    let mut b = PlanBuilder::new();
    let low_scan = two_columns(&mut b, "items", "name", vec![]);
    let low = b
        .filter(low_scan, Expr::lt(Expr::column(0), Expr::literal(4i64)))
        .unwrap();
    let high_scan = two_columns(&mut b, "items", "name", vec![]);
    let high = b
        .filter(high_scan, Expr::gt(Expr::column(0), Expr::literal(7i64)))
        .unwrap();
    let union = b.set(SetKind::Union, low, high).unwrap();
    let sorted = b.sort(union, vec![OrderKey::desc(0)]).unwrap();
    let template = compile(&b.finish(sorted).unwrap(), &Capabilities::sqlite()).unwrap();

    let command = resolve(&template, &ParameterContext::new());
    assert!(command.text.ends_with("DESC"));
    assert_eq!(first_column(&conn, &command), vec![10, 9, 8, 3, 2, 1]);
}

#[test]
fn test_take_over_sorted_join_without_native_paging() {
    let conn = database();
    let mut b = PlanBuilder::new();
    let customers = two_columns(&mut b, "customers", "name", vec![]);
    let orders = b
        .index(
            "orders",
            vec![
                Column::new("id", SemanticType::Int64),
                Column::new("customer_id", SemanticType::Int64),
            ],
            vec![],
        )
        .unwrap();
    let join = b.join(customers, orders, JoinType::Inner, vec![(0, 1)]).unwrap();
    let sorted = b.sort(join, vec![OrderKey::asc(1)]).unwrap();
    let take = b.take(sorted, RowCount::parameter("n")).unwrap();
    let plan = b.finish(take).unwrap();
    let ctx = ParameterContext::new().with("n", 2i64);

    let emulated = resolve(&compile(&plan, &manual()).unwrap(), &ctx);
    assert!(emulated.text.contains("ROW_NUMBER() OVER (ORDER BY"));
    assert!(emulated.text.contains("\"__ordinal\" <= ?1"));
    assert_eq!(emulated.values(), vec![Value::Int(2)]);

    let native = resolve(&compile(&plan, &Capabilities::sqlite()).unwrap(), &ctx);
    // alice (2), bob (3)
    assert_eq!(first_column(&conn, &emulated), vec![2, 3]);
    assert_eq!(first_column(&conn, &native), vec![2, 3]);
}

fn include_plan(algorithm: IncludeAlgorithm) -> Plan {
    let mut b = PlanBuilder::new();
    let scan = two_columns(&mut b, "items", "name", vec![]);
    let include = b
        .add(PlanKind::Include {
            source: scan,
            filter_columns: vec![0],
            rows: "ids".into(),
            algorithm,
            column: "hit".into(),
        })
        .unwrap();
    let sorted = b.sort(include, vec![OrderKey::asc(0)]).unwrap();
    b.finish(sorted).unwrap()
}

fn id_rows(ids: &[i64]) -> Value {
    Value::Rows(ids.iter().map(|id| vec![Value::Int(*id)]).collect())
}

#[test]
fn test_empty_dynamic_filter_matches_nothing() {
    let conn = database();
    let template = compile(
        &include_plan(IncludeAlgorithm::DynamicFilter),
        &Capabilities::sqlite(),
    )
    .unwrap();

    let command = resolve(&template, &ParameterContext::new().with("ids", id_rows(&[])));
    assert!(command.text.contains("(1 = 0)"));
    assert_eq!(column(&conn, &command, 2), vec![0; 10]);

    let command = resolve(&template, &ParameterContext::new().with("ids", id_rows(&[2, 5])));
    let hits: Vec<i64> = (1..=10).map(|id| i64::from(id == 2 || id == 5)).collect();
    assert_eq!(column(&conn, &command, 2), hits);
}

#[test]
fn test_auto_include_emits_exactly_one_strategy() {
    let conn = database();
    let caps = Capabilities::sqlite().with_max_inline_filter_rows(2);
    let template = compile(&include_plan(IncludeAlgorithm::Auto), &caps).unwrap();
    let expected = |ids: &[i64]| -> Vec<i64> {
        (1..=10).map(|id| i64::from(ids.contains(&id))).collect()
    };

    let small = [3i64, 4];
    let command = resolve(&template, &ParameterContext::new().with("ids", id_rows(&small)));
    assert!(command.text.contains(" IN (3, 4)"));
    assert!(!command.text.contains("include_table_0"));
    assert_eq!(column(&conn, &command, 2), expected(&small));

    let large = [1i64, 6, 10];
    let command = resolve(&template, &ParameterContext::new().with("ids", id_rows(&large)));
    assert!(!command.text.contains(" IN ("));
    assert!(command.text.contains("\"include_table_0\""));

    let table = &template.temporary_tables()[0];
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    conn.execute_batch(&format!(
        "CREATE TEMP TABLE \"{}\" ({})",
        table.placeholder,
        names.join(", ")
    ))
    .unwrap();
    for id in large {
        conn.execute(
            &format!("INSERT INTO \"{}\" VALUES (?1)", table.placeholder),
            [id],
        )
        .unwrap();
    }
    assert_eq!(column(&conn, &command, 2), expected(&large));
}

#[test]
fn test_compilation_is_deterministic_for_every_dialect() {
    for caps in [
        Capabilities::postgres(),
        Capabilities::sqlite(),
        Capabilities::sql_server(),
        Capabilities::mysql(),
        manual(),
    ] {
        let first = compile(&paged_items(), &caps).unwrap();
        let second = compile(&paged_items(), &caps).unwrap();
        assert_eq!(first.to_string(), second.to_string());

        let ctx = ParameterContext::new().with("skip", 1i64).with("take", 2i64);
        assert_eq!(resolve(&first, &ctx), resolve(&second, &ctx));
    }
}

#[test]
fn test_prepared_request_resolves_concurrently() {
    let conn = database();
    let request = Arc::new(QueryRequest::new(paged_items(), Capabilities::sqlite()));
    request.prepare().unwrap();

    let commands: Vec<(i64, ResolvedCommand)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8i64)
            .map(|skip| {
                let request = Arc::clone(&request);
                scope.spawn(move || {
                    let ctx = ParameterContext::new().with("skip", skip).with("take", 1i64);
                    (skip, request.resolve(&ctx).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let text = &commands[0].1.text;
    for (skip, command) in &commands {
        assert_eq!(&command.text, text);
        assert_eq!(first_column(&conn, command), vec![skip + 1]);
    }
}
