//! DDL generation for registered models
//!
//! Generates CREATE/DROP TABLE statements from model metadata for the active
//! dialect. Columns whose default value is `null` are nullable; every other
//! column is `NOT NULL`.

use crate::error::Result;
use crate::model::ModelMetadata;
use crate::sql::builder::SqlBuilder;
use crate::types::ValueKind;

/// Key length used for text primary keys without a capacity hint
const DEFAULT_TEXT_KEY_CAPACITY: u32 = 255;

/// DDL generator for model tables
pub struct DdlGenerator<'a> {
    builder: SqlBuilder<'a>,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(builder: SqlBuilder<'a>) -> Self {
        Self { builder }
    }

    /// `CREATE TABLE IF NOT EXISTS` with one column per non-ignored field
    pub fn create_table(&self, meta: &ModelMetadata) -> Result<String> {
        let dialect = self.builder.dialect();
        let blank = meta.blank_record();

        let column_defs: Vec<String> = meta
            .columns()
            .map(|field| {
                let capacity = match (field.primary_key, field.kind, field.capacity) {
                    (true, ValueKind::Text, None) => Some(DEFAULT_TEXT_KEY_CAPACITY),
                    (_, _, capacity) => capacity,
                };
                let mut def = format!(
                    "{} {}",
                    dialect.quote_identifier(&field.column),
                    dialect.column_type(field.kind, capacity)
                );
                if field.primary_key {
                    def.push_str(" PRIMARY KEY");
                } else if !blank.get(&field.column).is_some_and(|v| v.is_null()) {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.builder.table(meta.table())?,
            column_defs.join(", ")
        ))
    }

    pub fn drop_table(&self, meta: &ModelMetadata) -> Result<String> {
        Ok(format!(
            "DROP TABLE IF EXISTS {}",
            self.builder.table(meta.table())?
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{Token, Wallet};
    use crate::sql::dialect::{MySql, Sqlite};

    #[test]
    fn test_create_table_mysql() {
        let meta = ModelMetadata::of::<Wallet>().unwrap();
        let ddl = DdlGenerator::new(SqlBuilder::new(&MySql))
            .create_table(&meta)
            .unwrap();

        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS `wallet` (`id` BIGINT PRIMARY KEY, \
             `appID` VARCHAR(64) NOT NULL, `ctime` BIGINT NOT NULL)"
        );
    }

    #[test]
    fn test_create_table_sqlite() {
        let meta = ModelMetadata::of::<Wallet>().unwrap();
        let ddl = DdlGenerator::new(SqlBuilder::new(&Sqlite))
            .create_table(&meta)
            .unwrap();

        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"wallet\" (\"id\" INTEGER PRIMARY KEY, \
             \"appID\" TEXT NOT NULL, \"ctime\" INTEGER NOT NULL)"
        );
    }

    #[test]
    fn test_create_table_text_key_nullable_and_ignored() {
        let meta = ModelMetadata::of::<Token>().unwrap();
        let ddl = DdlGenerator::new(SqlBuilder::new(&MySql))
            .create_table(&meta)
            .unwrap();

        assert!(ddl.contains("`token` VARCHAR(255) PRIMARY KEY"));
        assert!(ddl.contains("`owner` TEXT,"));
        assert!(ddl.contains("`active` TINYINT(1) NOT NULL"));
        assert!(ddl.contains("`blob` BLOB NOT NULL"));
        assert!(!ddl.contains("cache"));
    }

    #[test]
    fn test_drop_table_qualified() {
        let meta = ModelMetadata::of::<Wallet>().unwrap();
        let ddl = DdlGenerator::new(SqlBuilder::new(&MySql).database(Some("app")))
            .drop_table(&meta)
            .unwrap();
        assert_eq!(ddl, "DROP TABLE IF EXISTS `app`.`wallet`");
    }
}
