//! Capability descriptors: what a target dialect supports natively.
//!
//! Rewrite passes and the compiler branch on these flags. Built-in profiles
//! cover the common dialects; custom profiles can be loaded from a TOML file
//! where each profile names a built-in `base` and overrides individual flags:
//!
//! ```toml
//! [profiles.legacy_sqlite]
//! base = "sqlite"
//! paging = "none"
//! native_booleans = false
//! ```
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Lexical family of the target dialect: identifier quoting, parameter
/// markers, literal syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    #[default]
    Postgres,
    Sqlite,
    SqlServer,
    MySql,
}

impl SqlDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "PostgreSQL",
            SqlDialect::Sqlite => "SQLite",
            SqlDialect::SqlServer => "SQL Server",
            SqlDialect::MySql => "MySQL",
        }
    }

    /// How bound parameters are spelled in command text.
    pub fn parameter_style(&self) -> ParameterStyle {
        match self {
            SqlDialect::Postgres => ParameterStyle::Numbered('$'),
            SqlDialect::Sqlite => ParameterStyle::Numbered('?'),
            SqlDialect::SqlServer => ParameterStyle::Named('@'),
            SqlDialect::MySql => ParameterStyle::Positional,
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameter marker spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    /// `?` per occurrence, bound in order of appearance.
    Positional,
    /// `$1`, `?1`: numbered by first appearance, repeats reuse the number.
    Numbered(char),
    /// `@p0`: named after the binding index.
    Named(char),
}

/// Native row-skipping support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingSupport {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
    /// No native paging; emulated with a row-number range filter.
    None,
}

/// Native support for correlated (lateral) joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplySupport {
    None,
    /// `JOIN LATERAL (...) ON ...`
    Lateral,
    /// `CROSS APPLY` / `OUTER APPLY`
    CrossApply,
}

/// Row locking support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockSupport {
    None,
    /// `FOR UPDATE` / `FOR SHARE` with `NOWAIT` / `SKIP LOCKED`.
    ForClause,
}

/// Capability descriptor of a target dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub dialect: SqlDialect,
    pub paging: PagingSupport,
    pub window_functions: bool,
    /// Boolean expressions may be projected and boolean columns used bare
    /// in predicate position.
    pub native_booleans: bool,
    pub apply: ApplySupport,
    /// `(a, b) IN ((1, 2), (3, 4))`
    pub row_value_in: bool,
    pub intersect_except: bool,
    pub locking: LockSupport,
    /// Several statements per round trip. Read by the executing layer.
    pub batching: bool,
    /// Sequence objects for key generation. Read by the executing layer.
    pub sequences: bool,
    /// Identity/auto-increment columns. Read by the executing layer.
    pub identity_columns: bool,
    /// Upper bound of rows an `Auto` include inlines as a dynamic filter
    /// before falling back to a temporary table.
    pub max_inline_filter_rows: usize,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::postgres()
    }
}

impl Capabilities {
    pub fn postgres() -> Self {
        Self {
            dialect: SqlDialect::Postgres,
            paging: PagingSupport::LimitOffset,
            window_functions: true,
            native_booleans: true,
            apply: ApplySupport::Lateral,
            row_value_in: true,
            intersect_except: true,
            locking: LockSupport::ForClause,
            batching: true,
            sequences: true,
            identity_columns: true,
            max_inline_filter_rows: 256,
        }
    }

    pub fn sqlite() -> Self {
        Self {
            dialect: SqlDialect::Sqlite,
            paging: PagingSupport::LimitOffset,
            window_functions: true,
            native_booleans: true,
            apply: ApplySupport::None,
            row_value_in: false,
            intersect_except: true,
            locking: LockSupport::None,
            batching: false,
            sequences: false,
            identity_columns: true,
            max_inline_filter_rows: 256,
        }
    }

    pub fn sql_server() -> Self {
        Self {
            dialect: SqlDialect::SqlServer,
            paging: PagingSupport::OffsetFetch,
            window_functions: true,
            native_booleans: false,
            apply: ApplySupport::CrossApply,
            row_value_in: false,
            intersect_except: true,
            locking: LockSupport::None,
            batching: true,
            sequences: true,
            identity_columns: true,
            max_inline_filter_rows: 256,
        }
    }

    pub fn mysql() -> Self {
        Self {
            dialect: SqlDialect::MySql,
            paging: PagingSupport::LimitOffset,
            window_functions: true,
            native_booleans: true,
            apply: ApplySupport::Lateral,
            row_value_in: true,
            intersect_except: false,
            locking: LockSupport::ForClause,
            batching: true,
            sequences: false,
            identity_columns: true,
            max_inline_filter_rows: 256,
        }
    }

    /// Look up a built-in profile by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::postgres()),
            "sqlite" => Some(Self::sqlite()),
            "sqlserver" | "mssql" => Some(Self::sql_server()),
            "mysql" => Some(Self::mysql()),
            _ => None,
        }
    }

    pub fn builtin_names() -> &'static [&'static str] {
        &["postgres", "sqlite", "sqlserver", "mysql"]
    }

    pub fn has_native_paging(&self) -> bool {
        self.paging != PagingSupport::None
    }

    pub fn with_paging(mut self, paging: PagingSupport) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_native_booleans(mut self, native: bool) -> Self {
        self.native_booleans = native;
        self
    }

    pub fn with_apply(mut self, apply: ApplySupport) -> Self {
        self.apply = apply;
        self
    }

    pub fn with_max_inline_filter_rows(mut self, rows: usize) -> Self {
        self.max_inline_filter_rows = rows;
        self
    }
}

/// Default location of the custom profile file.
pub fn default_profiles_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plansql")
        .join("dialects.toml")
}

/// Load custom profiles from a TOML file. A missing file yields no profiles.
pub fn load_profiles(path: &Path) -> Result<BTreeMap<String, Capabilities>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    let profiles = parse_profiles(&content)?;
    debug!(path = %path.display(), count = profiles.len(), "loaded dialect profiles");
    Ok(profiles)
}

/// Parse the `[profiles.<name>]` tables of a profile document.
pub fn parse_profiles(content: &str) -> Result<BTreeMap<String, Capabilities>> {
    let doc: toml::Table = content.parse()?;
    let mut profiles = BTreeMap::new();

    let Some(entries) = doc.get("profiles") else {
        return Ok(profiles);
    };
    let entries = entries.as_table().ok_or_else(|| Error::Profile {
        name: "profiles".into(),
        message: "expected a table of profiles".into(),
    })?;

    for (name, entry) in entries {
        let profile_error = |message: String| Error::Profile {
            name: name.clone(),
            message,
        };
        let mut overrides = entry
            .as_table()
            .cloned()
            .ok_or_else(|| profile_error("expected a table".into()))?;

        let base = match overrides.remove("base") {
            Some(toml::Value::String(base)) => Capabilities::builtin(&base)
                .ok_or_else(|| profile_error(format!("unknown base profile `{}`", base)))?,
            Some(_) => return Err(profile_error("`base` must be a string".into())),
            None => Capabilities::default(),
        };

        let mut merged = match toml::Value::try_from(&base) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => return Err(profile_error("base profile is not a table".into())),
            Err(e) => return Err(profile_error(e.to_string())),
        };
        merged.extend(overrides);

        let caps = toml::Value::Table(merged).try_into::<Capabilities>()?;
        profiles.insert(name.clone(), caps);
    }

    Ok(profiles)
}

/// Resolve a profile name against custom profiles first, then built-ins.
pub fn resolve_profile(
    name: &str,
    custom: &BTreeMap<String, Capabilities>,
) -> Option<Capabilities> {
    custom
        .get(name)
        .cloned()
        .or_else(|| Capabilities::builtin(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        assert_eq!(Capabilities::builtin("postgres"), Some(Capabilities::postgres()));
        assert_eq!(Capabilities::builtin("MSSQL"), Some(Capabilities::sql_server()));
        assert!(Capabilities::builtin("oracle").is_none());
        assert!(!Capabilities::sql_server().native_booleans);
        assert!(Capabilities::sqlite().has_native_paging());
    }

    #[test]
    fn test_parse_profiles_with_base_and_overrides() {
        let profiles = parse_profiles(
            r#"
            [profiles.legacy]
            base = "sqlite"
            paging = "none"
            native_booleans = false
            "#,
        )
        .unwrap();
        let legacy = &profiles["legacy"];
        assert_eq!(legacy.dialect, SqlDialect::Sqlite);
        assert_eq!(legacy.paging, PagingSupport::None);
        assert!(!legacy.native_booleans);
        assert!(legacy.window_functions);
    }

    #[test]
    fn test_parse_profiles_unknown_base() {
        let err = parse_profiles("[profiles.x]\nbase = \"db2\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown base profile"));
    }

    #[test]
    fn test_parse_profiles_empty_document() {
        assert!(parse_profiles("").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_profile_prefers_custom() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "sqlite".to_string(),
            Capabilities::sqlite().with_paging(PagingSupport::None),
        );
        let caps = resolve_profile("sqlite", &custom).unwrap();
        assert_eq!(caps.paging, PagingSupport::None);
        assert_eq!(resolve_profile("mysql", &custom), Some(Capabilities::mysql()));
    }

    #[test]
    fn test_load_profiles_missing_file() {
        let profiles = load_profiles(Path::new("/nonexistent/plansql/dialects.toml")).unwrap();
        assert!(profiles.is_empty());
    }
}
