//! CRUD operations on a [`Manager`]
//!
//! Every public method funnels its result through the manager's error sink, so
//! any failure (validation or execution) marks the unit of work for rollback.
//! Writes on mirrored models queue a [`SyncOperation`](crate::sync::SyncOperation)
//! once the statement succeeds.

use std::sync::Arc;

use sqlx::any::AnyRow;
use sqlx::{Column, Row};

use crate::condition::Condition;
use crate::error::{EngineError, Result};
use crate::manager::Manager;
use crate::model::{self, Model, ModelMetadata};
use crate::sql::builder::{PagePlan, plan_pagination};
use crate::sync::SyncWrite;
use crate::types::{Value, ValueKind, decode_column};

/// Largest number of objects accepted by one batched write
pub const MAX_BATCH: usize = 2000;

fn check_batch(len: usize, op: &str) -> Result<()> {
    if len == 0 {
        return Err(EngineError::validation(format!(
            "{} requires at least one object",
            op
        )));
    }
    if len > MAX_BATCH {
        return Err(EngineError::BatchTooLarge {
            len,
            max: MAX_BATCH,
        });
    }
    Ok(())
}

/// Metadata of the model a condition is bound to
fn bound_model(cnd: &Condition, op: &str) -> Result<Arc<ModelMetadata>> {
    let model = cnd.model_ref().ok_or_else(|| {
        EngineError::validation(format!(
            "{} requires a condition bound to a model (Condition::model::<T>())",
            op
        ))
    })?;
    model::lookup_id(model.type_id, model.type_name)
}

/// Metadata of `T`, rejecting a condition bound to another model
fn model_for<T: Model>(cnd: &Condition) -> Result<Arc<ModelMetadata>> {
    let meta = model::lookup::<T>()?;
    if let Some(bound) = cnd.model_ref() {
        if bound.type_id != meta.type_id() {
            return Err(EngineError::validation(format!(
                "condition bound to {} used to read {}",
                bound.type_name,
                meta.type_name()
            )));
        }
    }
    Ok(meta)
}

/// Rebuild an object from a row, matching result columns to fields by name.
/// Columns with no matching field are skipped; NULLs keep the field's default.
fn decode_row<T: Model>(meta: &ModelMetadata, row: &AnyRow) -> Result<T> {
    let mut record = meta.blank_record();
    for (index, column) in row.columns().iter().enumerate() {
        let Some(field) = meta.field(column.name()) else {
            continue;
        };
        let value = decode_column(row, index, field.kind)?;
        if !value.is_null() {
            record.insert(field.column.clone(), value);
        }
    }
    meta.decode(record)
}

fn warn_if_untouched(rows: u64, op: &'static str, meta: &ModelMetadata) {
    if rows == 0 {
        tracing::warn!(op, table = meta.table(), "statement affected no rows");
    }
}

impl Manager {
    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert objects with multi-row statements, split only where the
    /// backend's parameter limit requires it.
    ///
    /// Objects whose primary key is zero (`0` or `""`) receive a generated key,
    /// written back into the object before the insert runs.
    pub async fn save<T: Model>(&mut self, objects: &mut [T]) -> Result<u64> {
        let result = self.save_inner(objects).await;
        self.record(result)
    }

    async fn save_inner<T: Model>(&mut self, objects: &mut [T]) -> Result<u64> {
        check_batch(objects.len(), "save")?;
        let meta = model::lookup::<T>()?;

        let mut records = Vec::with_capacity(objects.len());
        for obj in objects.iter_mut() {
            let mut record = meta.encode(obj)?;
            if meta.pk_value(&record)?.is_zero() {
                let key = self.next_key(&meta)?;
                meta.set_pk(&mut record, key);
                *obj = meta.decode(record.clone())?;
            }
            records.push(record);
        }

        let stmts = self.builder().insert_chunked(&meta, &records)?;
        let rows = self.execute_all(stmts).await?;
        self.enqueue(&meta, SyncWrite::Save(records));
        Ok(rows)
    }

    /// Update every column of the given objects by primary key with CASE-WHEN
    /// statements, split like [`Manager::save`]. Keys are never generated here.
    pub async fn update<T: Model>(&mut self, objects: &[T]) -> Result<u64> {
        let result = self.update_inner(objects).await;
        self.record(result)
    }

    async fn update_inner<T: Model>(&mut self, objects: &[T]) -> Result<u64> {
        check_batch(objects.len(), "update")?;
        let meta = model::lookup::<T>()?;
        let records = objects
            .iter()
            .map(|obj| meta.encode(obj))
            .collect::<Result<Vec<_>>>()?;

        let stmts = self.builder().update_batch_chunked(&meta, &records)?;
        let rows = self.execute_all(stmts).await?;
        warn_if_untouched(rows, "update", &meta);
        self.enqueue(&meta, SyncWrite::Update(records));
        Ok(rows)
    }

    /// Apply the condition's Upset to every matching row
    pub async fn update_by_cnd(&mut self, cnd: &Condition) -> Result<u64> {
        let result = self.update_by_cnd_inner(cnd).await;
        self.record(result)
    }

    async fn update_by_cnd_inner(&mut self, cnd: &Condition) -> Result<u64> {
        let meta = bound_model(cnd, "update by condition")?;
        let stmt = self.builder().update_by_condition(&meta, cnd)?;
        let rows = self.execute(stmt).await?;
        warn_if_untouched(rows, "update_by_cnd", &meta);
        if self.mirrors(&meta) {
            self.enqueue(&meta, SyncWrite::UpdateByCnd(cnd.clone()));
        }
        Ok(rows)
    }

    /// Delete the given objects by primary key
    pub async fn delete<T: Model>(&mut self, objects: &[T]) -> Result<u64> {
        let result = self.delete_inner(objects).await;
        self.record(result)
    }

    async fn delete_inner<T: Model>(&mut self, objects: &[T]) -> Result<u64> {
        check_batch(objects.len(), "delete")?;
        let meta = model::lookup::<T>()?;
        let ids = objects
            .iter()
            .map(|obj| meta.encode(obj).and_then(|record| meta.pk_value(&record)))
            .collect::<Result<Vec<_>>>()?;
        self.delete_ids(meta, ids).await
    }

    /// Delete rows of `T` by primary key
    pub async fn delete_by_id<T: Model>(
        &mut self,
        ids: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<u64> {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        let result = self.delete_by_id_inner::<T>(ids).await;
        self.record(result)
    }

    async fn delete_by_id_inner<T: Model>(&mut self, ids: Vec<Value>) -> Result<u64> {
        check_batch(ids.len(), "delete by id")?;
        let meta = model::lookup::<T>()?;
        self.delete_ids(meta, ids).await
    }

    async fn delete_ids(&mut self, meta: Arc<ModelMetadata>, ids: Vec<Value>) -> Result<u64> {
        let stmt = self.builder().delete_by_ids(&meta, &ids)?;
        let rows = self.execute(stmt).await?;
        warn_if_untouched(rows, "delete", &meta);
        self.enqueue(&meta, SyncWrite::Delete(ids));
        Ok(rows)
    }

    /// Delete every row matching the condition; a condition without
    /// predicates is refused.
    pub async fn delete_by_cnd(&mut self, cnd: &Condition) -> Result<u64> {
        let result = self.delete_by_cnd_inner(cnd).await;
        self.record(result)
    }

    async fn delete_by_cnd_inner(&mut self, cnd: &Condition) -> Result<u64> {
        let meta = bound_model(cnd, "delete by condition")?;
        let stmt = self.builder().delete_by_condition(&meta, cnd)?;
        let rows = self.execute(stmt).await?;
        warn_if_untouched(rows, "delete_by_cnd", &meta);
        if self.mirrors(&meta) {
            self.enqueue(&meta, SyncWrite::DeleteByCnd(cnd.clone()));
        }
        Ok(rows)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load `obj` by its primary key. Returns `false` and leaves `obj`
    /// untouched when no row matches.
    pub async fn find_by_id<T: Model>(&mut self, obj: &mut T) -> Result<bool> {
        let result = self.find_by_id_inner(obj).await;
        self.record(result)
    }

    async fn find_by_id_inner<T: Model>(&mut self, obj: &mut T) -> Result<bool> {
        let meta = model::lookup::<T>()?;
        let id = meta.pk_value(&meta.encode(obj)?)?;
        if id.is_zero() {
            return Err(EngineError::validation(format!(
                "{}: find by id requires a primary key",
                meta.table()
            )));
        }
        let cnd = Condition::new().eq(meta.primary_key().column.clone(), id);
        self.fetch_one(&meta, &cnd, false, obj).await
    }

    /// First row matching the condition. Absence is `Ok(false)`.
    pub async fn find_one<T: Model>(&mut self, cnd: &Condition, out: &mut T) -> Result<bool> {
        let result = self.find_one_inner(cnd, out, false).await;
        self.record(result)
    }

    async fn find_one_inner<T: Model>(
        &mut self,
        cnd: &Condition,
        out: &mut T,
        complex: bool,
    ) -> Result<bool> {
        let meta = model_for::<T>(cnd)?;
        self.fetch_one(&meta, cnd, complex, out).await
    }

    /// Rows matching the condition, paginated when the condition asks for it.
    /// Counting dialects store the total on `cnd` unless it already holds one.
    pub async fn find_list<T: Model>(&mut self, cnd: &mut Condition) -> Result<Vec<T>> {
        let result = self.find_list_inner(cnd, false).await;
        self.record(result)
    }

    async fn find_list_inner<T: Model>(
        &mut self,
        cnd: &mut Condition,
        complex: bool,
    ) -> Result<Vec<T>> {
        let meta = model_for::<T>(cnd)?;
        self.fetch_list(&meta, cnd, complex).await
    }

    /// First row of a multi-table query; requires FROM and projected fields
    pub async fn find_one_complex<T: Model>(
        &mut self,
        cnd: &Condition,
        out: &mut T,
    ) -> Result<bool> {
        let result = self.find_one_inner(cnd, out, true).await;
        self.record(result)
    }

    /// Rows of a multi-table query, decoded into `T` by column name
    pub async fn find_list_complex<T: Model>(&mut self, cnd: &mut Condition) -> Result<Vec<T>> {
        let result = self.find_list_inner(cnd, true).await;
        self.record(result)
    }

    /// Number of rows (or groups) matching the condition; also stores the
    /// total and page count on `cnd`
    pub async fn count(&mut self, cnd: &mut Condition) -> Result<u64> {
        let result = self.count_inner(cnd).await;
        self.record(result)
    }

    async fn count_inner(&mut self, cnd: &mut Condition) -> Result<u64> {
        let meta = if cnd.is_complex() {
            None
        } else {
            Some(bound_model(cnd, "count")?)
        };
        let total = self.count_rows(meta.as_deref(), cnd).await?;
        cnd.set_total(total);
        Ok(total)
    }

    /// Whether any row matches the condition
    pub async fn exists(&mut self, cnd: &Condition) -> Result<bool> {
        let result = self.exists_inner(cnd).await;
        self.record(result)
    }

    async fn exists_inner(&mut self, cnd: &Condition) -> Result<bool> {
        let meta = bound_model(cnd, "exists")?;
        let stmt = self.builder().exists(&meta, cnd)?;
        Ok(self.fetch_optional(stmt).await?.is_some())
    }

    async fn count_rows(&mut self, meta: Option<&ModelMetadata>, cnd: &Condition) -> Result<u64> {
        let stmt = self.builder().count(meta, cnd)?;
        let row = self
            .fetch_optional(stmt)
            .await?
            .ok_or_else(|| EngineError::validation("count returned no row"))?;
        let total = decode_column(&row, 0, ValueKind::Int)?
            .as_i64()
            .unwrap_or(0);
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn fetch_one<T: Model>(
        &mut self,
        meta: &ModelMetadata,
        cnd: &Condition,
        complex: bool,
        out: &mut T,
    ) -> Result<bool> {
        let builder = self.builder();
        let mut stmt = if complex {
            builder.select_complex(cnd)?
        } else {
            builder.select(meta, cnd)?
        };
        let offset = plan_pagination(cnd.pagination()).map_or(0, |plan| plan.offset);
        builder.paginate(&mut stmt, PagePlan { offset, count: 1 });

        match self.fetch_optional(stmt).await? {
            Some(row) => {
                *out = decode_row(meta, &row)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fetch_list<T: Model>(
        &mut self,
        meta: &ModelMetadata,
        cnd: &mut Condition,
        complex: bool,
    ) -> Result<Vec<T>> {
        let builder = self.builder();
        let mut stmt = if complex {
            builder.select_complex(cnd)?
        } else {
            builder.select(meta, cnd)?
        };

        if let Some(plan) = plan_pagination(cnd.pagination()) {
            if self.dialect().requires_total() {
                let total = match cnd.pagination().page_total {
                    Some(total) => total,
                    None => {
                        let total = self
                            .count_rows((!complex).then_some(meta), cnd)
                            .await?;
                        cnd.set_total(total);
                        total
                    }
                };
                if !plan.within(total) {
                    return Ok(Vec::new());
                }
            }
            self.builder().paginate(&mut stmt, plan);
        }

        let rows = self.fetch_all(stmt).await?;
        rows.iter().map(|row| decode_row(meta, row)).collect()
    }
}
