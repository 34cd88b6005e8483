//! # relstore
//!
//! A model-driven relational access engine for MySQL and SQLite.
//!
//! Plain `serde` structs are registered once as models. A fluent [`Condition`]
//! describes filters, sorting, grouping, pagination, projections and updates;
//! the engine compiles it into dialect-correct parameterized SQL and runs it
//! inside a unit of work that commits or rolls back as a whole.
//!
//! ## Features
//!
//! - **Model Registry**: per-type metadata (columns, primary key, kinds) built once at startup
//! - **Condition DSL**: comparison, range, set, pattern and null predicates with nested OR
//! - **Dialects**: MySQL (count-then-limit pagination) and SQLite (direct offset)
//! - **Units of Work**: pooled connection or transaction per [`Manager`], resolved once on close
//! - **Batched Writes**: multi-row INSERT and CASE-WHEN batch UPDATE, up to 2000 objects
//! - **Distributed Ids**: snowflake keys generated for objects saved with a zero key
//! - **Mirroring**: best-effort replay of committed writes into a [`DocumentStore`]
//! - **SQL Injection Prevention**: values are always bound; identifiers are validated and quoted
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relstore::{Condition, Engine, EngineConfig, ManagerOptions, Model, Registry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Wallet {
//!     id: i64,
//!     #[serde(rename = "appID")]
//!     app_id: String,
//!     ctime: i64,
//! }
//!
//! impl Model for Wallet {
//!     const TABLE: &'static str = "wallet";
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     relstore::install(Registry::builder().register::<Wallet>()?.build())?;
//!
//!     let config = EngineConfig::builder()
//!         .datasource("MASTER", "mysql://root@localhost/app")
//!         .build()?;
//!     let engine = Engine::connect(config).await?;
//!
//!     let mut m = engine.acquire(ManagerOptions::new().open_tx(true)).await?;
//!     let mut wallets = [Wallet { app_id: "a".into(), ..Default::default() }];
//!     m.save(&mut wallets).await?;
//!
//!     let mut found = Wallet::default();
//!     m.find_one(&Condition::new().eq("id", wallets[0].id), &mut found).await?;
//!
//!     m.update_by_cnd(
//!         &Condition::model::<Wallet>()
//!             .eq("id", wallets[0].id)
//!             .upset(["appID"], ["b"]),
//!     )
//!     .await?;
//!     m.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use std::time::Duration;
//! use relstore::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .datasource("MASTER", "sqlite://app.db?mode=rwc")
//!     .max_connections(8)
//!     .node_id(3)                                 // Node id for generated keys
//!     .default_timeout(Duration::from_secs(10))   // Per-statement timeout
//!     .build()
//!     .unwrap();
//! ```

pub mod condition;
pub mod config;
pub mod crud;
pub mod engine;
pub mod error;
pub mod id;
pub mod manager;
pub mod model;
pub mod sql;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use condition::{Condition, JoinKind, Operator, Order, Pagination, Predicate};
pub use config::{DatasourceConfig, EngineConfig, EngineConfigBuilder, ManagerOptions, PoolSettings};
pub use crud::MAX_BATCH;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use id::IdGenerator;
pub use manager::Manager;
pub use model::{
    FieldDescriptor, Model, ModelMetadata, PrimaryKey, Record, Registry, RegistryBuilder, install,
    lookup,
};
pub use sync::{DocumentStore, ReplayReport, SyncKind, SyncOperation, SyncWrite, Synchronizer};
pub use types::{Value, ValueKind};

// Re-export SQL utilities for advanced users
pub use sql::builder::{SqlBuilder, Statement};
pub use sql::dialect::{Dialect, MySql, Sqlite};
