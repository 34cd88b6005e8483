//! Secondary-store synchronization
//!
//! Successful writes on mirrored models are queued on the manager as
//! [`SyncOperation`]s. After the unit of work commits cleanly, [`Synchronizer`]
//! replays them one by one against a [`DocumentStore`]. Replay is best effort:
//! a failure is logged and the remaining operations still run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::condition::Condition;
use crate::error::Result;
use crate::model::{ModelMetadata, Record};
use crate::types::Value;

/// Peer store that receives mirrored writes
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save(&self, meta: &ModelMetadata, records: &[Record]) -> Result<()>;

    async fn update(&self, meta: &ModelMetadata, records: &[Record]) -> Result<()>;

    async fn delete(&self, meta: &ModelMetadata, ids: &[Value]) -> Result<()>;

    async fn update_by_cnd(&self, meta: &ModelMetadata, cnd: &Condition) -> Result<()>;

    async fn delete_by_cnd(&self, meta: &ModelMetadata, cnd: &Condition) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Save,
    Update,
    Delete,
    UpdateByCnd,
    DeleteByCnd,
}

/// A committed write and the data it carried
#[derive(Debug, Clone)]
pub enum SyncWrite {
    /// Encoded objects, generated keys included
    Save(Vec<Record>),
    Update(Vec<Record>),
    /// Primary keys of deleted rows
    Delete(Vec<Value>),
    UpdateByCnd(Condition),
    DeleteByCnd(Condition),
}

impl SyncWrite {
    pub fn kind(&self) -> SyncKind {
        match self {
            SyncWrite::Save(_) => SyncKind::Save,
            SyncWrite::Update(_) => SyncKind::Update,
            SyncWrite::Delete(_) => SyncKind::Delete,
            SyncWrite::UpdateByCnd(_) => SyncKind::UpdateByCnd,
            SyncWrite::DeleteByCnd(_) => SyncKind::DeleteByCnd,
        }
    }
}

/// One committed write waiting to be mirrored
#[derive(Debug, Clone)]
pub struct SyncOperation {
    pub model: Arc<ModelMetadata>,
    pub write: SyncWrite,
}

impl SyncOperation {
    pub fn new(model: Arc<ModelMetadata>, write: SyncWrite) -> Self {
        Self { model, write }
    }

    pub fn kind(&self) -> SyncKind {
        self.write.kind()
    }

    async fn apply(&self, store: &dyn DocumentStore) -> Result<()> {
        let meta = self.model.as_ref();
        match &self.write {
            SyncWrite::Save(records) => store.save(meta, records).await,
            SyncWrite::Update(records) => store.update(meta, records).await,
            SyncWrite::Delete(ids) => store.delete(meta, ids).await,
            SyncWrite::UpdateByCnd(cnd) => store.update_by_cnd(meta, cnd).await,
            SyncWrite::DeleteByCnd(cnd) => store.delete_by_cnd(meta, cnd).await,
        }
    }
}

/// Outcome of one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    pub failed: usize,
}

/// Replays queued operations against a document store
#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer").finish_non_exhaustive()
    }
}

impl Synchronizer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Apply every operation in order. Failures are logged, never returned.
    pub async fn replay(&self, operations: Vec<SyncOperation>) -> ReplayReport {
        let mut report = ReplayReport::default();
        for op in operations {
            match op.apply(self.store.as_ref()).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        kind = ?op.kind(),
                        table = op.model.table(),
                        error = %e,
                        "secondary store replay failed"
                    );
                }
            }
        }
        if report.failed > 0 {
            tracing::warn!(
                applied = report.applied,
                failed = report.failed,
                "secondary store replay finished with failures"
            );
        }
        report
    }
}
