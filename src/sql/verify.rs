//! Syntax check of resolved command text.
//!
//! Uses `sqlparser` as an independent parser so generated SQL can be
//! verified without a database connection.
use sqlparser::dialect::{
    Dialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser as SqlParser;

use crate::capability::SqlDialect;
use crate::error::{Error, Result};

fn parser_dialect(dialect: SqlDialect) -> Box<dyn Dialect> {
    match dialect {
        SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
        SqlDialect::Sqlite => Box::new(SQLiteDialect {}),
        SqlDialect::SqlServer => Box::new(MsSqlDialect {}),
        SqlDialect::MySql => Box::new(MySqlDialect {}),
    }
}

/// Parse `sql` as exactly one statement of the given dialect.
pub fn check_syntax(sql: &str, dialect: SqlDialect) -> Result<()> {
    let parser_dialect = parser_dialect(dialect);
    let statements = SqlParser::parse_sql(parser_dialect.as_ref(), sql)
        .map_err(|e| Error::Syntax(e.to_string()))?;
    if statements.len() != 1 {
        return Err(Error::Syntax(format!(
            "expected 1 statement, found {}",
            statements.len()
        )));
    }
    Ok(())
}
