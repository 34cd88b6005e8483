//! Engine: named connection pools and manager acquisition
//!
//! An [`Engine`] owns one `sqlx` pool per configured datasource together with
//! the dialect derived from its URL, the shared id generator, and the optional
//! document-store mirror. It is cheap to clone and safe to share across tasks;
//! each unit of work acquires its own [`Manager`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

use crate::config::{EngineConfig, ManagerOptions};
use crate::error::{EngineError, Result};
use crate::id::IdGenerator;
use crate::manager::{Executor, Manager};
use crate::sql::dialect::{Dialect, dialect_for_url};
use crate::sync::{DocumentStore, Synchronizer};

#[derive(Debug)]
struct Datasource {
    pool: AnyPool,
    dialect: &'static dyn Dialect,
}

/// Shared entry point for units of work
#[derive(Debug, Clone)]
pub struct Engine {
    datasources: Arc<HashMap<String, Datasource>>,
    ids: Arc<IdGenerator>,
    mirror: Option<Synchronizer>,
    default_timeout: Duration,
}

impl Engine {
    /// Open a pool for every configured datasource
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let mut datasources = HashMap::with_capacity(config.datasources.len());
        for ds in &config.datasources {
            let dialect = dialect_for_url(&ds.url)?;
            let pool = AnyPoolOptions::new()
                .max_connections(config.pool.max_connections)
                .min_connections(config.pool.min_connections)
                .acquire_timeout(config.pool.acquire_timeout)
                .idle_timeout(config.pool.idle_timeout)
                .connect(&ds.url)
                .await
                .map_err(|e| EngineError::connection(format!("{}: {}", ds.name, e)))?;
            tracing::info!(datasource = %ds.name, dialect = dialect.name(), "datasource connected");
            datasources.insert(ds.name.clone(), Datasource { pool, dialect });
        }

        Ok(Self {
            datasources: Arc::new(datasources),
            ids: Arc::new(IdGenerator::new(config.node_id)?),
            mirror: None,
            default_timeout: config.default_timeout,
        })
    }

    /// Attach the document store that mirrored writes are replayed against
    pub fn with_mirror(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.mirror = Some(Synchronizer::new(store));
        self
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    fn datasource(&self, name: &str) -> Result<&Datasource> {
        self.datasources
            .get(name)
            .ok_or_else(|| EngineError::DatasourceNotFound(name.to_string()))
    }

    pub fn pool(&self, name: &str) -> Result<&AnyPool> {
        self.datasource(name).map(|ds| &ds.pool)
    }

    pub fn dialect(&self, name: &str) -> Result<&'static dyn Dialect> {
        self.datasource(name).map(|ds| ds.dialect)
    }

    pub fn id_generator(&self) -> &IdGenerator {
        &self.ids
    }

    /// Start a unit of work: take a pooled connection, or begin a transaction
    /// when `options.open_tx` is set.
    pub async fn acquire(&self, options: ManagerOptions) -> Result<Manager> {
        let ds = self.datasource(&options.ds_name)?;
        let timeout = options.timeout.unwrap_or(self.default_timeout);

        let executor = if options.open_tx {
            let tx = tokio::time::timeout(timeout, ds.pool.begin())
                .await
                .map_err(|_| EngineError::Timeout(timeout))??;
            Executor::Transaction(tx)
        } else {
            let conn = tokio::time::timeout(timeout, ds.pool.acquire())
                .await
                .map_err(|_| EngineError::Timeout(timeout))??;
            Executor::Connection(conn)
        };
        tracing::debug!(
            datasource = %options.ds_name,
            transactional = options.open_tx,
            "manager acquired"
        );

        Ok(Manager::new(
            executor,
            ds.dialect,
            options,
            timeout,
            Arc::clone(&self.ids),
            self.mirror.clone(),
        ))
    }

    /// Close every pool, waiting for checked-out connections to return
    pub async fn close(&self) {
        for (name, ds) in self.datasources.iter() {
            ds.pool.close().await;
            tracing::info!(datasource = %name, "datasource closed");
        }
    }
}
