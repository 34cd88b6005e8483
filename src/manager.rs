//! Unit-of-work handle
//!
//! A [`Manager`] owns one pooled connection or one open transaction for the
//! duration of a unit of work. Every CRUD call runs through it with the
//! configured statement timeout, and every failure is recorded on it. [`Manager::close`]
//! resolves the unit of work exactly once:
//!
//! - no recorded errors: commit
//! - any recorded error: roll back
//!
//! Commit and rollback failures are logged rather than returned. Queued mirror
//! operations are replayed only after a clean commit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::any::AnyRow;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, Transaction};

use crate::config::ManagerOptions;
use crate::error::{EngineError, Result};
use crate::id::IdGenerator;
use crate::model::{self, Model, ModelMetadata};
use crate::sql::builder::{SqlBuilder, Statement};
use crate::sql::ddl::DdlGenerator;
use crate::sql::dialect::Dialect;
use crate::sync::{SyncOperation, SyncWrite, Synchronizer};
use crate::types::{Value, ValueKind, bind_value};

pub(crate) enum Executor {
    Connection(PoolConnection<Any>),
    Transaction(Transaction<'static, Any>),
}

impl Executor {
    fn connection(&mut self) -> &mut AnyConnection {
        match self {
            Executor::Connection(conn) => &mut **conn,
            Executor::Transaction(tx) => &mut **tx,
        }
    }
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(EngineError::Timeout(limit)),
    }
}

fn prepare(stmt: &Statement) -> sqlx::query::Query<'_, Any, sqlx::any::AnyArguments<'_>> {
    stmt.params
        .iter()
        .cloned()
        .fold(sqlx::query(&stmt.sql), bind_value)
}

/// Connection or transaction scoped to one unit of work
pub struct Manager {
    executor: Option<Executor>,
    dialect: &'static dyn Dialect,
    options: ManagerOptions,
    timeout: Duration,
    ids: Arc<IdGenerator>,
    mirror: Option<Synchronizer>,
    errors: Vec<String>,
    pending: Vec<SyncOperation>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("dialect", &self.dialect.name())
            .field("options", &self.options)
            .field("closed", &self.executor.is_none())
            .field("errors", &self.errors)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Manager {
    pub(crate) fn new(
        executor: Executor,
        dialect: &'static dyn Dialect,
        options: ManagerOptions,
        timeout: Duration,
        ids: Arc<IdGenerator>,
        mirror: Option<Synchronizer>,
    ) -> Self {
        Self {
            executor: Some(executor),
            dialect,
            options,
            timeout,
            ids,
            mirror,
            errors: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self.executor, Some(Executor::Transaction(_)))
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_none()
    }

    /// Messages of every error recorded so far
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Number of mirror operations waiting for close
    pub fn pending_sync(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn builder(&self) -> SqlBuilder<'_> {
        SqlBuilder::new(self.dialect).database(self.options.database.as_deref())
    }

    pub(crate) fn next_key(&self, meta: &ModelMetadata) -> Result<Value> {
        match meta.primary_key().kind {
            ValueKind::Text => self.ids.next_string(self.options.node).map(Value::Text),
            _ => self.ids.next_id(self.options.node).map(Value::Int),
        }
    }

    /// Error sink: remember a failed call so close rolls back
    pub(crate) fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if !matches!(e, EngineError::Closed) {
                tracing::debug!(error = %e, "unit of work recorded an error");
                self.errors.push(e.to_string());
            }
        }
        result
    }

    pub(crate) fn mirrors(&self, meta: &ModelMetadata) -> bool {
        self.options.mirror_to_secondary && meta.is_mirrored() && self.mirror.is_some()
    }

    pub(crate) fn enqueue(&mut self, meta: &Arc<ModelMetadata>, write: SyncWrite) {
        if self.mirrors(meta) {
            self.pending
                .push(SyncOperation::new(Arc::clone(meta), write));
        }
    }

    fn connection(&mut self) -> Result<&mut AnyConnection> {
        self.executor
            .as_mut()
            .map(Executor::connection)
            .ok_or(EngineError::Closed)
    }

    pub(crate) async fn execute(&mut self, stmt: Statement) -> Result<u64> {
        tracing::debug!(sql = %stmt.sql, params = ?stmt.params, "execute");
        let limit = self.timeout;
        let conn = self.connection()?;
        let result = with_timeout(limit, prepare(&stmt).execute(conn)).await?;
        Ok(result.rows_affected())
    }

    /// Run statements in order on this unit of work; returns the summed rows affected
    pub(crate) async fn execute_all(&mut self, stmts: Vec<Statement>) -> Result<u64> {
        let mut rows = 0;
        for stmt in stmts {
            rows += self.execute(stmt).await?;
        }
        Ok(rows)
    }

    pub(crate) async fn fetch_all(&mut self, stmt: Statement) -> Result<Vec<AnyRow>> {
        tracing::debug!(sql = %stmt.sql, params = ?stmt.params, "query");
        let limit = self.timeout;
        let conn = self.connection()?;
        with_timeout(limit, prepare(&stmt).fetch_all(conn)).await
    }

    pub(crate) async fn fetch_optional(&mut self, stmt: Statement) -> Result<Option<AnyRow>> {
        tracing::debug!(sql = %stmt.sql, params = ?stmt.params, "query");
        let limit = self.timeout;
        let conn = self.connection()?;
        with_timeout(limit, prepare(&stmt).fetch_optional(conn)).await
    }

    /// Run a trusted statement with positional parameters; returns rows affected
    pub async fn execute_raw(&mut self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let stmt = Statement {
            sql: sql.to_string(),
            params,
        };
        let result = self.execute(stmt).await;
        self.record(result)
    }

    /// `CREATE TABLE IF NOT EXISTS` for a registered model
    pub async fn create_table<T: Model>(&mut self) -> Result<()> {
        let result = self.create_table_inner::<T>().await;
        self.record(result)
    }

    async fn create_table_inner<T: Model>(&mut self) -> Result<()> {
        let meta = model::lookup::<T>()?;
        let sql = DdlGenerator::new(self.builder()).create_table(&meta)?;
        self.execute(Statement {
            sql,
            params: Vec::new(),
        })
        .await?;
        Ok(())
    }

    /// `DROP TABLE IF EXISTS` for a registered model
    pub async fn drop_table<T: Model>(&mut self) -> Result<()> {
        let result = self.drop_table_inner::<T>().await;
        self.record(result)
    }

    async fn drop_table_inner<T: Model>(&mut self) -> Result<()> {
        let meta = model::lookup::<T>()?;
        let sql = DdlGenerator::new(self.builder()).drop_table(&meta)?;
        self.execute(Statement {
            sql,
            params: Vec::new(),
        })
        .await?;
        Ok(())
    }

    /// Resolve the unit of work. Only the first call has an effect.
    pub async fn close(&mut self) -> Result<()> {
        let Some(executor) = self.executor.take() else {
            return Ok(());
        };
        let pending = std::mem::take(&mut self.pending);

        let committed = match executor {
            Executor::Connection(conn) => {
                drop(conn);
                self.errors.is_empty()
            }
            Executor::Transaction(tx) if self.errors.is_empty() => {
                match with_timeout(self.timeout, tx.commit()).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(error = %e, "commit failed");
                        false
                    }
                }
            }
            Executor::Transaction(tx) => {
                tracing::warn!(errors = self.errors.len(), "rolling back unit of work");
                if let Err(e) = with_timeout(self.timeout, tx.rollback()).await {
                    tracing::error!(error = %e, "rollback failed");
                }
                false
            }
        };

        if committed && !pending.is_empty() {
            if let Some(mirror) = &self.mirror {
                mirror.replay(pending).await;
            }
        }
        Ok(())
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if let Some(executor) = &self.executor {
            let transactional = matches!(executor, Executor::Transaction(_));
            tracing::warn!(
                transactional,
                pending = self.pending.len(),
                "manager dropped without close; open transaction rolls back"
            );
        }
    }
}
