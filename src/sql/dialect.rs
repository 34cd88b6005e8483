//! SQL dialect abstraction
//!
//! - Dialect: trait for backend-specific SQL text
//! - Identifier quoting
//! - Pagination strategy (count-then-limit vs. direct offset)
//! - Column type mapping for DDL

use crate::error::{EngineError, Result};
use crate::types::ValueKind;

/// Backend-specific SQL generation
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Placeholder for the parameter at 1-based `index`
    fn placeholder(&self, index: usize) -> String;

    /// Whether paginated reads first count the matching rows
    fn requires_total(&self) -> bool;

    /// Most bound parameters one statement may carry
    fn max_params(&self) -> usize;

    /// LIMIT clause (with leading space) skipping `offset` rows and returning at most `count`
    fn limit_clause(&self, offset: u64, count: u64) -> String;

    /// Column type for DDL
    fn column_type(&self, kind: ValueKind, capacity: Option<u32>) -> String;

    /// Quote `alias.column` piecewise
    fn quote_key(&self, key: &str) -> String {
        key.split('.')
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// MySQL / MariaDB
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn requires_total(&self) -> bool {
        true
    }

    fn max_params(&self) -> usize {
        65_535
    }

    fn limit_clause(&self, offset: u64, count: u64) -> String {
        format!(" LIMIT {}, {}", offset, count)
    }

    fn column_type(&self, kind: ValueKind, capacity: Option<u32>) -> String {
        match kind {
            ValueKind::Int => "BIGINT".to_string(),
            ValueKind::Float => "DOUBLE".to_string(),
            ValueKind::Text => match capacity {
                Some(n) => format!("VARCHAR({})", n),
                None => "TEXT".to_string(),
            },
            ValueKind::Bytes => match capacity {
                Some(n) => format!("VARBINARY({})", n),
                None => "BLOB".to_string(),
            },
            ValueKind::Bool => "TINYINT(1)".to_string(),
        }
    }
}

/// SQLite
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn requires_total(&self) -> bool {
        false
    }

    fn max_params(&self) -> usize {
        32_766
    }

    fn limit_clause(&self, offset: u64, count: u64) -> String {
        format!(" LIMIT {} OFFSET {}", count, offset)
    }

    fn column_type(&self, kind: ValueKind, _capacity: Option<u32>) -> String {
        match kind {
            ValueKind::Int | ValueKind::Bool => "INTEGER".to_string(),
            ValueKind::Float => "REAL".to_string(),
            ValueKind::Text => "TEXT".to_string(),
            ValueKind::Bytes => "BLOB".to_string(),
        }
    }
}

/// Pick the dialect for a connection URL
pub fn dialect_for_url(url: &str) -> Result<&'static dyn Dialect> {
    static MYSQL: MySql = MySql;
    static SQLITE: Sqlite = Sqlite;

    let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
    match scheme.as_str() {
        "mysql" => Ok(&MYSQL),
        "sqlite" => Ok(&SQLITE),
        other => Err(EngineError::connection(format!(
            "unsupported database scheme '{}'",
            other
        ))),
    }
}
