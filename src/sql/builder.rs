//! Statement generation
//!
//! [`SqlBuilder`] turns model metadata plus a [`Condition`] into dialect-specific
//! SQL text and the ordered parameter list that goes with it. Nothing here talks
//! to a database; paginated reads that need a prior count are orchestrated by
//! the executor using [`SqlBuilder::count`] and [`plan_pagination`].

use crate::condition::{Condition, Pagination};
use crate::error::{EngineError, Result};
use crate::model::{ModelMetadata, Record};
use crate::sql::condition::{build_group_by, build_sort_by, build_where};
use crate::sql::dialect::Dialect;
use crate::sql::sanitize::validate_identifier;
use crate::types::Value;

/// Page size used when a page is requested without a size
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

/// Rows to skip and rows to return for one paginated read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    pub offset: u64,
    pub count: u64,
}

impl PagePlan {
    /// Whether the page starts inside `total` matching rows. A page that
    /// does not can be answered empty without reading.
    pub fn within(&self, total: u64) -> bool {
        total > 0 && self.offset < total
    }
}

/// Resolve a pagination block into an offset and row count.
///
/// Returns `None` when both the page number and size are zero. A zero size
/// defaults to [`DEFAULT_PAGE_SIZE`]; a zero page number means the first page.
pub fn plan_pagination(pagination: &Pagination) -> Option<PagePlan> {
    if pagination.page_no == 0 && pagination.page_size == 0 {
        return None;
    }
    let count = if pagination.page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        pagination.page_size
    };
    let offset = if pagination.is_offset {
        pagination.page_no
    } else {
        pagination.page_no.max(1).saturating_sub(1).saturating_mul(count)
    };
    Some(PagePlan { offset, count })
}

/// Builds statements for one dialect, optionally qualifying tables with a database name
#[derive(Debug, Clone, Copy)]
pub struct SqlBuilder<'a> {
    dialect: &'a dyn Dialect,
    database: Option<&'a str>,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            database: None,
        }
    }

    /// Qualify every table as `database.table`
    pub fn database(mut self, database: Option<&'a str>) -> Self {
        self.database = database.filter(|db| !db.is_empty());
        self
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Quoted, optionally database-qualified table name
    pub fn table(&self, table: &str) -> Result<String> {
        validate_identifier(table).map_err(EngineError::Validation)?;
        match self.database {
            Some(db) => {
                validate_identifier(db).map_err(EngineError::Validation)?;
                Ok(format!(
                    "{}.{}",
                    self.dialect.quote_identifier(db),
                    self.dialect.quote_identifier(table)
                ))
            }
            None => Ok(self.dialect.quote_identifier(table)),
        }
    }

    fn where_clause(&self, cnd: &Condition) -> Result<(String, Vec<Value>)> {
        let (clause, params) = build_where(self.dialect, cnd)?;
        if clause.is_empty() {
            Ok((String::new(), params))
        } else {
            Ok((format!(" WHERE {}", clause), params))
        }
    }

    fn placeholders(&self, start: usize, n: usize) -> String {
        (start..start + n)
            .map(|i| self.dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Multi-row INSERT with one VALUES tuple per record
    pub fn insert(&self, meta: &ModelMetadata, records: &[Record]) -> Result<Statement> {
        if records.is_empty() {
            return Err(EngineError::validation("insert requires at least one record"));
        }
        let columns: Vec<_> = meta.columns().collect();
        let column_list = columns
            .iter()
            .map(|f| self.dialect.quote_identifier(&f.column))
            .collect::<Vec<_>>()
            .join(", ");

        let mut params = Vec::with_capacity(columns.len() * records.len());
        let mut tuples = Vec::with_capacity(records.len());
        for record in records {
            tuples.push(format!(
                "({})",
                self.placeholders(params.len() + 1, columns.len())
            ));
            for field in &columns {
                params.push(meta.value_of(record, field)?);
            }
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table(meta.table())?,
            column_list,
            tuples.join(", ")
        );
        Ok(Statement::new(sql, params))
    }

    /// Batched UPDATE: every non-key column becomes
    /// `col = CASE pk WHEN ? THEN ? ... END`, restricted to `pk IN (...)`.
    pub fn update_batch(&self, meta: &ModelMetadata, records: &[Record]) -> Result<Statement> {
        if records.is_empty() {
            return Err(EngineError::UnsafeWhere("UPDATE"));
        }
        let pk_column = &meta.primary_key().column;
        let ids = records
            .iter()
            .map(|record| {
                let id = meta.pk_value(record)?;
                if id.is_zero() {
                    return Err(EngineError::validation(format!(
                        "{}: update requires a primary key on every object",
                        meta.table()
                    )));
                }
                Ok(id)
            })
            .collect::<Result<Vec<_>>>()?;

        let pk = self.dialect.quote_identifier(pk_column);
        let mut params = Vec::new();
        let mut assignments = Vec::new();
        for field in meta.columns().filter(|f| !f.primary_key) {
            let mut arms = String::new();
            for (record, id) in records.iter().zip(&ids) {
                params.push(id.clone());
                let when = self.dialect.placeholder(params.len());
                params.push(meta.value_of(record, field)?);
                let then = self.dialect.placeholder(params.len());
                arms.push_str(&format!(" WHEN {} THEN {}", when, then));
            }
            assignments.push(format!(
                "{} = CASE {}{} END",
                self.dialect.quote_identifier(&field.column),
                pk,
                arms
            ));
        }
        if assignments.is_empty() {
            return Err(EngineError::validation(format!(
                "{}: no columns to update besides the primary key",
                meta.table()
            )));
        }

        let in_list = self.placeholders(params.len() + 1, ids.len());
        params.extend(ids);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} IN ({})",
            self.table(meta.table())?,
            assignments.join(", "),
            pk,
            in_list
        );
        Ok(Statement::new(sql, params))
    }

    /// Records per statement when each record binds `params_per_row` values
    fn rows_per_statement(&self, params_per_row: usize) -> usize {
        (self.dialect.max_params() / params_per_row.max(1)).max(1)
    }

    /// [`SqlBuilder::insert`] split into as many statements as the dialect's
    /// parameter limit requires
    pub fn insert_chunked(
        &self,
        meta: &ModelMetadata,
        records: &[Record],
    ) -> Result<Vec<Statement>> {
        if records.is_empty() {
            return self.insert(meta, records).map(|stmt| vec![stmt]);
        }
        let per_row = meta.columns().count();
        records
            .chunks(self.rows_per_statement(per_row))
            .map(|chunk| self.insert(meta, chunk))
            .collect()
    }

    /// [`SqlBuilder::update_batch`] split into as many statements as the
    /// dialect's parameter limit requires
    pub fn update_batch_chunked(
        &self,
        meta: &ModelMetadata,
        records: &[Record],
    ) -> Result<Vec<Statement>> {
        if records.is_empty() {
            return self.update_batch(meta, records).map(|stmt| vec![stmt]);
        }
        // one WHEN/THEN pair per non-key column plus the IN entry
        let per_row = 2 * meta.columns().filter(|f| !f.primary_key).count() + 1;
        records
            .chunks(self.rows_per_statement(per_row))
            .map(|chunk| self.update_batch(meta, chunk))
            .collect()
    }

    /// `UPDATE ... SET col = ?, ... WHERE ...` from the condition's Upset
    pub fn update_by_condition(&self, meta: &ModelMetadata, cnd: &Condition) -> Result<Statement> {
        let upset = cnd
            .upset_payload()
            .filter(|u| !u.keys.is_empty())
            .ok_or_else(|| EngineError::validation("update by condition requires an Upset"))?;
        if upset.keys.len() != upset.values.len() {
            return Err(EngineError::UpsetMismatch {
                keys: upset.keys.len(),
                values: upset.values.len(),
            });
        }
        if !cnd.restricts_rows() {
            return Err(EngineError::UnsafeWhere("UPDATE"));
        }

        let mut params = Vec::with_capacity(upset.values.len());
        let mut assignments = Vec::with_capacity(upset.keys.len());
        for (key, value) in upset.keys.iter().zip(&upset.values) {
            let field = meta.field(key).ok_or_else(|| {
                EngineError::validation(format!("{} has no column '{}'", meta.table(), key))
            })?;
            if field.primary_key {
                return Err(EngineError::validation(format!(
                    "{}: the primary key '{}' cannot be updated",
                    meta.table(),
                    key
                )));
            }
            params.push(value.clone());
            assignments.push(format!(
                "{} = {}",
                self.dialect.quote_identifier(&field.column),
                self.dialect.placeholder(params.len())
            ));
        }

        let (where_sql, where_params) = self.where_clause(cnd)?;
        params.extend(where_params);
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.table(meta.table())?,
            assignments.join(", "),
            where_sql
        );
        Ok(Statement::new(sql, params))
    }

    /// `DELETE ... WHERE pk IN (...)`
    pub fn delete_by_ids(&self, meta: &ModelMetadata, ids: &[Value]) -> Result<Statement> {
        if ids.is_empty() {
            return Err(EngineError::UnsafeWhere("DELETE"));
        }
        if ids.iter().any(Value::is_zero) {
            return Err(EngineError::validation(format!(
                "{}: delete requires a primary key on every object",
                meta.table()
            )));
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.table(meta.table())?,
            self.dialect.quote_identifier(&meta.primary_key().column),
            self.placeholders(1, ids.len())
        );
        Ok(Statement::new(sql, ids.to_vec()))
    }

    pub fn delete_by_condition(&self, meta: &ModelMetadata, cnd: &Condition) -> Result<Statement> {
        if !cnd.restricts_rows() {
            return Err(EngineError::UnsafeWhere("DELETE"));
        }
        let (where_sql, params) = self.where_clause(cnd)?;
        let sql = format!("DELETE FROM {}{}", self.table(meta.table())?, where_sql);
        Ok(Statement::new(sql, params))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn projection(&self, meta: &ModelMetadata, cnd: &Condition) -> Result<String> {
        if cnd.projected_fields().is_empty() {
            return Ok(meta
                .columns()
                .map(|f| self.dialect.quote_identifier(&f.column))
                .collect::<Vec<_>>()
                .join(", "));
        }
        cnd.projected_fields()
            .iter()
            .map(|name| {
                meta.field(name)
                    .map(|f| self.dialect.quote_identifier(&f.column))
                    .ok_or_else(|| {
                        EngineError::validation(format!(
                            "{} has no column '{}'",
                            meta.table(),
                            name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()
            .map(|cols| cols.join(", "))
    }

    /// Single-table SELECT with WHERE, GROUP BY and ORDER BY (no LIMIT)
    pub fn select(&self, meta: &ModelMetadata, cnd: &Condition) -> Result<Statement> {
        let (where_sql, params) = self.where_clause(cnd)?;
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            self.projection(meta, cnd)?,
            self.table(meta.table())?,
            where_sql,
            build_group_by(self.dialect, cnd)?,
            build_sort_by(self.dialect, cnd)?
        );
        Ok(Statement::new(sql, params))
    }

    /// `FROM table alias [JOIN ...]` for complex queries
    fn complex_from(&self, cnd: &Condition) -> Result<String> {
        let from = cnd.from_clause().ok_or_else(|| {
            EngineError::validation("complex query requires a FROM table and alias")
        })?;
        validate_identifier(&from.alias).map_err(EngineError::Validation)?;
        let mut sql = format!(
            "{} {}",
            self.table(&from.table)?,
            self.dialect.quote_identifier(&from.alias)
        );

        if let Some(join) = cnd.join_clause() {
            let mut parts = join.table.split_whitespace();
            let table = parts
                .next()
                .ok_or_else(|| EngineError::validation("join table cannot be empty"))?;
            sql.push_str(&format!(" {} {}", join.kind.as_sql(), self.table(table)?));
            if let Some(alias) = parts.next() {
                validate_identifier(alias).map_err(EngineError::Validation)?;
                sql.push(' ');
                sql.push_str(&self.dialect.quote_identifier(alias));
            }
            if parts.next().is_some() {
                return Err(EngineError::validation(format!(
                    "join table '{}' must be `table` or `table alias`",
                    join.table
                )));
            }
            if join.on.trim().is_empty() {
                return Err(EngineError::validation("join requires an ON expression"));
            }
            sql.push_str(&format!(" ON {}", join.on));
        }
        Ok(sql)
    }

    /// Multi-table SELECT over raw projected expressions (no LIMIT)
    pub fn select_complex(&self, cnd: &Condition) -> Result<Statement> {
        if cnd.projected_fields().is_empty() {
            return Err(EngineError::validation(
                "complex query requires at least one projected field",
            ));
        }
        let from = self.complex_from(cnd)?;
        let (where_sql, params) = self.where_clause(cnd)?;
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            cnd.projected_fields().join(", "),
            from,
            where_sql,
            build_group_by(self.dialect, cnd)?,
            build_sort_by(self.dialect, cnd)?
        );
        Ok(Statement::new(sql, params))
    }

    /// `COUNT(1)` over the rows (or groups) a read would return. Complex
    /// conditions carry their own FROM and need no model.
    pub fn count(&self, meta: Option<&ModelMetadata>, cnd: &Condition) -> Result<Statement> {
        let (where_sql, params) = self.where_clause(cnd)?;
        let group_by = build_group_by(self.dialect, cnd)?;
        let table = || match meta {
            Some(meta) => self.table(meta.table()),
            None => Err(EngineError::validation(
                "count requires a condition bound to a model or a FROM clause",
            )),
        };

        let sql = if cnd.is_complex() {
            if cnd.projected_fields().is_empty() {
                return Err(EngineError::validation(
                    "complex query requires at least one projected field",
                ));
            }
            format!(
                "SELECT COUNT(1) FROM (SELECT {} FROM {}{}{}) _cnt",
                cnd.projected_fields().join(", "),
                self.complex_from(cnd)?,
                where_sql,
                group_by
            )
        } else if !group_by.is_empty() {
            format!(
                "SELECT COUNT(1) FROM (SELECT 1 AS _one FROM {}{}{}) _cnt",
                table()?,
                where_sql,
                group_by
            )
        } else {
            format!("SELECT COUNT(1) FROM {}{}", table()?, where_sql)
        };
        Ok(Statement::new(sql, params))
    }

    /// `SELECT 1 ... LIMIT 1`
    pub fn exists(&self, meta: &ModelMetadata, cnd: &Condition) -> Result<Statement> {
        let (where_sql, params) = self.where_clause(cnd)?;
        let sql = format!(
            "SELECT 1 FROM {}{}{}",
            self.table(meta.table())?,
            where_sql,
            self.dialect.limit_clause(0, 1)
        );
        Ok(Statement::new(sql, params))
    }

    /// Append the dialect's LIMIT clause for `plan`
    pub fn paginate(&self, stmt: &mut Statement, plan: PagePlan) {
        stmt.sql
            .push_str(&self.dialect.limit_clause(plan.offset, plan.count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{JoinKind, Order};
    use crate::model::Model;
    use crate::model::tests::{Token, Wallet};
    use crate::sql::dialect::{MySql, Sqlite};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Wide {
        id: i64,
        c0: i64,
        c1: i64,
        c2: i64,
        c3: i64,
        c4: i64,
        c5: i64,
        c6: i64,
        c7: i64,
        c8: i64,
        c9: i64,
    }

    impl Model for Wide {
        const TABLE: &'static str = "wide";
    }

    fn wallet_meta() -> ModelMetadata {
        ModelMetadata::of::<Wallet>().unwrap()
    }

    fn wallet_record(meta: &ModelMetadata, id: i64, app: &str) -> Record {
        meta.encode(&Wallet {
            id,
            app_id: app.to_string(),
            ctime: 7,
        })
        .unwrap()
    }

    // ==================== Pagination ====================

    #[test]
    fn test_plan_pagination() {
        let none = Condition::new();
        assert_eq!(plan_pagination(none.pagination()), None);

        let page = Condition::new().limit(3, 20);
        assert_eq!(
            plan_pagination(page.pagination()),
            Some(PagePlan {
                offset: 40,
                count: 20
            })
        );

        let default_size = Condition::new().limit(2, 0);
        assert_eq!(
            plan_pagination(default_size.pagination()),
            Some(PagePlan {
                offset: 10,
                count: DEFAULT_PAGE_SIZE
            })
        );

        let page_zero = Condition::new().limit(0, 5);
        assert_eq!(plan_pagination(page_zero.pagination()).unwrap().offset, 0);

        let offset = Condition::new().offset(7, 3);
        assert_eq!(
            plan_pagination(offset.pagination()),
            Some(PagePlan {
                offset: 7,
                count: 3
            })
        );
    }

    #[test]
    fn test_page_within_total() {
        let plan = PagePlan {
            offset: 20,
            count: 10,
        };
        assert!(plan.within(25));
        assert!(plan.within(21));
        assert!(!plan.within(20));
        assert!(!plan.within(0));
        assert!(!PagePlan { offset: 0, count: 10 }.within(0));
        assert!(PagePlan { offset: 0, count: 10 }.within(1));
    }

    #[test]
    fn test_count_then_limit_plan() {
        let meta = wallet_meta();
        let builder = SqlBuilder::new(&MySql);
        assert!(builder.dialect().requires_total());

        let mut cnd = Condition::model::<Wallet>().eq("appID", "a").limit(3, 10);
        let count = builder.count(Some(&meta), &cnd).unwrap();
        assert_eq!(count.sql, "SELECT COUNT(1) FROM `wallet` WHERE `appID` = ?");
        assert_eq!(count.params, vec![Value::from("a")]);

        let plan = plan_pagination(cnd.pagination()).unwrap();
        cnd.set_total(25);
        assert_eq!(cnd.pagination().page_count, Some(3));
        assert!(plan.within(25));

        let mut stmt = builder.select(&meta, &cnd).unwrap();
        builder.paginate(&mut stmt, plan);
        assert_eq!(
            stmt.sql,
            "SELECT `id`, `appID`, `ctime` FROM `wallet` WHERE `appID` = ? LIMIT 20, 10"
        );

        // past the last row, or nothing to page through
        let beyond = plan_pagination(cnd.clone().limit(4, 10).pagination()).unwrap();
        assert!(!beyond.within(25));
        assert!(!plan.within(0));
    }

    #[test]
    fn test_paginate_per_dialect() {
        let mut stmt = Statement::new("SELECT 1".to_string(), Vec::new());
        SqlBuilder::new(&MySql).paginate(&mut stmt, PagePlan { offset: 20, count: 10 });
        assert_eq!(stmt.sql, "SELECT 1 LIMIT 20, 10");

        let mut stmt = Statement::new("SELECT 1".to_string(), Vec::new());
        SqlBuilder::new(&Sqlite).paginate(&mut stmt, PagePlan { offset: 20, count: 10 });
        assert_eq!(stmt.sql, "SELECT 1 LIMIT 10 OFFSET 20");
    }

    // ==================== Insert ====================

    #[test]
    fn test_insert_multi_row() {
        let meta = wallet_meta();
        let records = vec![wallet_record(&meta, 1, "a"), wallet_record(&meta, 2, "b")];
        let stmt = SqlBuilder::new(&MySql).insert(&meta, &records).unwrap();

        assert_eq!(
            stmt.sql,
            "INSERT INTO `wallet` (`id`, `appID`, `ctime`) VALUES (?, ?, ?), (?, ?, ?)"
        );
        assert_eq!(stmt.params.len(), 6);
        assert_eq!(stmt.params[3], Value::Int(2));
        assert_eq!(stmt.params[4], Value::from("b"));
    }

    #[test]
    fn test_insert_skips_ignored_fields() {
        let meta = ModelMetadata::of::<Token>().unwrap();
        let record = meta
            .encode(&Token {
                token: "t1".to_string(),
                cache: "not stored".to_string(),
                ..Token::default()
            })
            .unwrap();
        let stmt = SqlBuilder::new(&Sqlite).insert(&meta, &[record]).unwrap();

        assert!(!stmt.sql.contains("cache"));
        assert_eq!(stmt.params.len(), 5);
        assert_eq!(stmt.params[1], Value::Null);
    }

    #[test]
    fn test_database_qualified_table() {
        let meta = wallet_meta();
        let records = vec![wallet_record(&meta, 1, "a")];
        let stmt = SqlBuilder::new(&MySql)
            .database(Some("app"))
            .insert(&meta, &records)
            .unwrap();
        assert!(stmt.sql.starts_with("INSERT INTO `app`.`wallet`"));

        let bad = SqlBuilder::new(&MySql).database(Some("app; DROP"));
        assert!(bad.insert(&meta, &records).is_err());
    }

    #[test]
    fn test_insert_chunked_fits_parameter_limit() {
        let meta = ModelMetadata::of::<Wide>().unwrap();
        let records: Vec<Record> = (1..=4000)
            .map(|id| meta.encode(&Wide { id, ..Wide::default() }).unwrap())
            .collect();
        let builder = SqlBuilder::new(&Sqlite);

        // 11 columns per row: 2978 rows per statement
        let stmts = builder.insert_chunked(&meta, &records).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts.iter().all(|s| s.params.len() <= Sqlite.max_params()));
        assert_eq!(stmts[0].params.len(), 2978 * 11);
        assert_eq!(stmts[1].params[0], Value::Int(2979));

        let single = builder.insert_chunked(&meta, &records[..10]).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0], builder.insert(&meta, &records[..10]).unwrap());

        assert!(builder.insert_chunked(&meta, &[]).is_err());
    }

    // ==================== Update ====================

    #[test]
    fn test_update_batch_chunked_fits_parameter_limit() {
        let meta = ModelMetadata::of::<Wide>().unwrap();
        let records: Vec<Record> = (1..=2000)
            .map(|id| meta.encode(&Wide { id, ..Wide::default() }).unwrap())
            .collect();

        // 21 params per row: 1560 rows per statement
        let stmts = SqlBuilder::new(&Sqlite)
            .update_batch_chunked(&meta, &records)
            .unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts.iter().all(|s| s.params.len() <= Sqlite.max_params()));
        assert_eq!(stmts[0].params.len(), 1560 * 21);
        assert_eq!(
            stmts.iter().map(|s| s.params.len()).sum::<usize>(),
            2000 * 21
        );
        assert_eq!(stmts[1].params.last(), Some(&Value::Int(2000)));

        let mysql = SqlBuilder::new(&MySql)
            .update_batch_chunked(&meta, &records)
            .unwrap();
        assert_eq!(mysql.len(), 1);

        assert!(matches!(
            SqlBuilder::new(&Sqlite).update_batch_chunked(&meta, &[]),
            Err(EngineError::UnsafeWhere("UPDATE"))
        ));
    }

    #[test]
    fn test_update_batch_case_when() {
        let meta = wallet_meta();
        let records = vec![wallet_record(&meta, 1, "a"), wallet_record(&meta, 2, "b")];
        let stmt = SqlBuilder::new(&MySql).update_batch(&meta, &records).unwrap();

        assert_eq!(
            stmt.sql,
            "UPDATE `wallet` SET \
             `appID` = CASE `id` WHEN ? THEN ? WHEN ? THEN ? END, \
             `ctime` = CASE `id` WHEN ? THEN ? WHEN ? THEN ? END \
             WHERE `id` IN (?, ?)"
        );
        assert_eq!(
            stmt.params,
            vec![
                Value::Int(1),
                Value::from("a"),
                Value::Int(2),
                Value::from("b"),
                Value::Int(1),
                Value::Int(7),
                Value::Int(2),
                Value::Int(7),
                Value::Int(1),
                Value::Int(2),
            ]
        );
    }

    #[test]
    fn test_update_batch_requires_keys() {
        let meta = wallet_meta();
        let records = vec![wallet_record(&meta, 0, "a")];
        let err = SqlBuilder::new(&MySql)
            .update_batch(&meta, &records)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_update_by_condition() {
        let meta = wallet_meta();
        let cnd = Condition::model::<Wallet>()
            .eq("id", 5)
            .upset(["appID", "ctime"], [Value::from("b"), Value::Int(9)]);
        let stmt = SqlBuilder::new(&Sqlite)
            .update_by_condition(&meta, &cnd)
            .unwrap();

        assert_eq!(
            stmt.sql,
            "UPDATE \"wallet\" SET \"appID\" = ?, \"ctime\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(
            stmt.params,
            vec![Value::from("b"), Value::Int(9), Value::Int(5)]
        );
    }

    #[test]
    fn test_update_by_condition_guards() {
        let meta = wallet_meta();
        let builder = SqlBuilder::new(&MySql);

        let no_upset = Condition::model::<Wallet>().eq("id", 1);
        assert!(builder.update_by_condition(&meta, &no_upset).is_err());

        let mismatch = Condition::model::<Wallet>()
            .eq("id", 1)
            .upset(["appID", "ctime"], ["x"]);
        assert!(matches!(
            builder.update_by_condition(&meta, &mismatch),
            Err(EngineError::UpsetMismatch { keys: 2, values: 1 })
        ));

        let no_where = Condition::model::<Wallet>().upset(["appID"], ["x"]);
        assert!(matches!(
            builder.update_by_condition(&meta, &no_where),
            Err(EngineError::UnsafeWhere("UPDATE"))
        ));

        let empty_or = Condition::model::<Wallet>()
            .or([Condition::new()])
            .upset(["appID"], ["x"]);
        assert!(matches!(
            builder.update_by_condition(&meta, &empty_or),
            Err(EngineError::UnsafeWhere("UPDATE"))
        ));

        let always = Condition::model::<Wallet>()
            .not_in_list("id", Vec::<i64>::new())
            .upset(["appID"], ["x"]);
        assert!(matches!(
            builder.update_by_condition(&meta, &always),
            Err(EngineError::UnsafeWhere("UPDATE"))
        ));

        let always_or = Condition::model::<Wallet>()
            .or([
                Condition::new().eq("ctime", 1),
                Condition::new().not_in_list("id", Vec::<i64>::new()),
            ])
            .upset(["appID"], ["x"]);
        assert!(matches!(
            builder.update_by_condition(&meta, &always_or),
            Err(EngineError::UnsafeWhere("UPDATE"))
        ));

        let pk = Condition::model::<Wallet>()
            .eq("ctime", 1)
            .upset(["id"], [2]);
        assert!(builder.update_by_condition(&meta, &pk).is_err());

        let unknown = Condition::model::<Wallet>()
            .eq("id", 1)
            .upset(["nope"], [2]);
        assert!(builder.update_by_condition(&meta, &unknown).is_err());
    }

    // ==================== Delete ====================

    #[test]
    fn test_delete_by_ids() {
        let meta = wallet_meta();
        let stmt = SqlBuilder::new(&MySql)
            .delete_by_ids(&meta, &[Value::Int(1), Value::Int(2)])
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `wallet` WHERE `id` IN (?, ?)");

        assert!(matches!(
            SqlBuilder::new(&MySql).delete_by_ids(&meta, &[]),
            Err(EngineError::UnsafeWhere("DELETE"))
        ));
    }

    #[test]
    fn test_delete_by_condition_requires_where() {
        let meta = wallet_meta();
        let builder = SqlBuilder::new(&MySql);

        assert!(matches!(
            builder.delete_by_condition(&meta, &Condition::model::<Wallet>()),
            Err(EngineError::UnsafeWhere("DELETE"))
        ));

        let always = Condition::model::<Wallet>().not_in_list("id", Vec::<i64>::new());
        assert!(matches!(
            builder.delete_by_condition(&meta, &always),
            Err(EngineError::UnsafeWhere("DELETE"))
        ));

        let narrowed = always.eq("ctime", 3);
        let stmt = builder.delete_by_condition(&meta, &narrowed).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `wallet` WHERE 1 = 1 AND `ctime` = ?");

        let stmt = builder
            .delete_by_condition(&meta, &Condition::model::<Wallet>().lt("ctime", 100))
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `wallet` WHERE `ctime` < ?");
    }

    // ==================== Select ====================

    #[test]
    fn test_select_full() {
        let meta = wallet_meta();
        let cnd = Condition::new()
            .eq("appID", "a")
            .group_by(["appID"])
            .order_by("ctime", Order::Desc);
        let stmt = SqlBuilder::new(&MySql).select(&meta, &cnd).unwrap();

        assert_eq!(
            stmt.sql,
            "SELECT `id`, `appID`, `ctime` FROM `wallet` WHERE `appID` = ? GROUP BY `appID` ORDER BY `ctime` DESC"
        );
    }

    #[test]
    fn test_select_projection() {
        let meta = wallet_meta();
        let cnd = Condition::new().fields(["id", "ctime"]);
        let stmt = SqlBuilder::new(&Sqlite).select(&meta, &cnd).unwrap();
        assert_eq!(stmt.sql, "SELECT \"id\", \"ctime\" FROM \"wallet\"");

        let bad = Condition::new().fields(["count(id)"]);
        assert!(SqlBuilder::new(&Sqlite).select(&meta, &bad).is_err());
    }

    #[test]
    fn test_select_complex_with_join() {
        let cnd = Condition::new()
            .fields(["count(a.id) as id", "a.appID"])
            .from("wallet", "a")
            .join(JoinKind::Left, "token t", "t.owner = a.appID")
            .gt("a.ctime", 0)
            .group_by(["a.appID"]);
        let stmt = SqlBuilder::new(&MySql).select_complex(&cnd).unwrap();

        assert_eq!(
            stmt.sql,
            "SELECT count(a.id) as id, a.appID FROM `wallet` `a` \
             LEFT JOIN `token` `t` ON t.owner = a.appID \
             WHERE `a`.`ctime` > ? GROUP BY `a`.`appID`"
        );
        assert_eq!(stmt.params, vec![Value::Int(0)]);
    }

    #[test]
    fn test_select_complex_requirements() {
        let builder = SqlBuilder::new(&MySql);
        let no_from = Condition::new().fields(["a.id"]);
        assert!(builder.select_complex(&no_from).is_err());

        let no_fields = Condition::new().from("wallet", "a");
        assert!(builder.select_complex(&no_fields).is_err());
    }

    // ==================== Count / Exists ====================

    #[test]
    fn test_count_simple_and_grouped() {
        let meta = wallet_meta();
        let builder = SqlBuilder::new(&MySql);

        let simple = builder
            .count(Some(&meta), &Condition::new().eq("appID", "a").order_by("id", Order::Asc))
            .unwrap();
        assert_eq!(simple.sql, "SELECT COUNT(1) FROM `wallet` WHERE `appID` = ?");

        let grouped = builder
            .count(Some(&meta), &Condition::new().group_by(["appID"]))
            .unwrap();
        assert_eq!(
            grouped.sql,
            "SELECT COUNT(1) FROM (SELECT 1 AS _one FROM `wallet` GROUP BY `appID`) _cnt"
        );
    }

    #[test]
    fn test_count_complex() {
        let cnd = Condition::new()
            .fields(["a.appID"])
            .from("wallet", "a")
            .eq("a.ctime", 1);
        let stmt = SqlBuilder::new(&Sqlite).count(None, &cnd).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(1) FROM (SELECT a.appID FROM \"wallet\" \"a\" WHERE \"a\".\"ctime\" = ?) _cnt"
        );
        assert_eq!(stmt.params, vec![Value::Int(1)]);

        let unbound = SqlBuilder::new(&Sqlite).count(None, &Condition::new());
        assert!(unbound.is_err());
    }

    #[test]
    fn test_exists() {
        let meta = wallet_meta();
        let stmt = SqlBuilder::new(&Sqlite)
            .exists(&meta, &Condition::new().eq("id", 3))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT 1 FROM \"wallet\" WHERE \"id\" = ? LIMIT 1 OFFSET 0"
        );
    }
}
