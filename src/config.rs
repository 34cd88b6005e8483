//! Engine and manager configuration
//!
//! [`EngineConfig`] describes the named datasources and pool sizing, built with
//! a builder or read from the environment. [`ManagerOptions`] carries the
//! per-unit-of-work settings passed to [`Engine::acquire`](crate::Engine::acquire).

use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::id::MAX_NODE;

/// Datasource used when none is named
pub const DEFAULT_DATASOURCE: &str = "MASTER";

/// Statement timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// One named connection target
#[derive(Debug, Clone, PartialEq)]
pub struct DatasourceConfig {
    pub name: String,
    /// `mysql://...` or `sqlite:...`
    pub url: String,
}

/// Pool sizing shared by every datasource
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub datasources: Vec<DatasourceConfig>,
    pub pool: PoolSettings,
    /// Node id used for generated keys when a manager does not pick one
    pub node_id: u16,
    /// Statement timeout for managers that do not set one
    pub default_timeout: Duration,
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Read a single-datasource configuration from the environment
    ///
    /// - `RELSTORE_DATABASE_URL` (required): URL of the `MASTER` datasource
    /// - `RELSTORE_MAX_CONNECTIONS`: pool size (default 10)
    /// - `RELSTORE_NODE_ID`: node id for generated keys (default 0)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup("RELSTORE_DATABASE_URL")
            .ok_or_else(|| EngineError::connection("RELSTORE_DATABASE_URL is not set"))?;
        let mut builder = Self::builder().datasource(DEFAULT_DATASOURCE, url);

        if let Some(raw) = lookup("RELSTORE_MAX_CONNECTIONS") {
            let max = raw.parse::<u32>().map_err(|e| {
                EngineError::validation(format!("RELSTORE_MAX_CONNECTIONS '{}': {}", raw, e))
            })?;
            builder = builder.max_connections(max);
        }
        if let Some(raw) = lookup("RELSTORE_NODE_ID") {
            let node = raw.parse::<u16>().map_err(|e| {
                EngineError::validation(format!("RELSTORE_NODE_ID '{}': {}", raw, e))
            })?;
            builder = builder.node_id(node);
        }
        builder.build()
    }

    pub fn datasource(&self, name: &str) -> Option<&DatasourceConfig> {
        self.datasources.iter().find(|ds| ds.name == name)
    }
}

/// Builder for EngineConfig
#[derive(Debug)]
pub struct EngineConfigBuilder {
    datasources: Vec<DatasourceConfig>,
    pool: PoolSettings,
    node_id: u16,
    default_timeout: Duration,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self {
            datasources: Vec::new(),
            pool: PoolSettings::default(),
            node_id: 0,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl EngineConfigBuilder {
    /// Add a named datasource; a later entry with the same name replaces the earlier one
    pub fn datasource(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        self.datasources.retain(|ds| ds.name != name);
        self.datasources.push(DatasourceConfig {
            name,
            url: url.into(),
        });
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.pool.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.pool.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool.acquire_timeout = timeout;
        self
    }

    /// `None` keeps idle connections open indefinitely
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool.idle_timeout = timeout;
        self
    }

    pub fn node_id(mut self, node_id: u16) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig> {
        if self.datasources.is_empty() {
            return Err(EngineError::validation("at least one datasource is required"));
        }
        if self.pool.max_connections == 0 {
            return Err(EngineError::validation("max_connections must be at least 1"));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(EngineError::validation(
                "min_connections cannot exceed max_connections",
            ));
        }
        if self.node_id > MAX_NODE {
            return Err(EngineError::validation(format!(
                "node_id {} exceeds the maximum of {}",
                self.node_id, MAX_NODE
            )));
        }
        Ok(EngineConfig {
            datasources: self.datasources,
            pool: self.pool,
            node_id: self.node_id,
            default_timeout: self.default_timeout,
        })
    }
}

/// Settings for one unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    pub ds_name: String,
    /// Qualify tables as `database.table`
    pub database: Option<String>,
    pub open_tx: bool,
    /// Per-statement timeout; the engine default when unset
    pub timeout: Option<Duration>,
    pub mirror_to_secondary: bool,
    /// Node id for generated keys; the engine default when unset
    pub node: Option<u16>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            ds_name: DEFAULT_DATASOURCE.to_string(),
            database: None,
            open_tx: false,
            timeout: None,
            mirror_to_secondary: false,
            node: None,
        }
    }
}

impl ManagerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ds_name(mut self, name: impl Into<String>) -> Self {
        self.ds_name = name.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn open_tx(mut self, open: bool) -> Self {
        self.open_tx = open;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn mirror_to_secondary(mut self, mirror: bool) -> Self {
        self.mirror_to_secondary = mirror;
        self
    }

    pub fn node(mut self, node: u16) -> Self {
        self.node = Some(node);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // =========================================================================
    // EngineConfig Builder Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = EngineConfig::builder()
            .datasource("MASTER", "sqlite::memory:")
            .build()
            .unwrap();

        assert_eq!(config.datasources.len(), 1);
        assert_eq!(config.pool, PoolSettings::default());
        assert_eq!(config.node_id, 0);
        assert_eq!(config.default_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn test_full_custom_config() {
        let config = EngineConfig::builder()
            .datasource("MASTER", "mysql://localhost/app")
            .datasource("REPLICA", "mysql://replica/app")
            .max_connections(32)
            .min_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(None)
            .node_id(12)
            .default_timeout(Duration::from_secs(3))
            .build()
            .unwrap();

        assert_eq!(config.datasource("REPLICA").unwrap().url, "mysql://replica/app");
        assert_eq!(config.pool.max_connections, 32);
        assert_eq!(config.pool.min_connections, 4);
        assert_eq!(config.pool.idle_timeout, None);
        assert_eq!(config.node_id, 12);
        assert_eq!(config.default_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_duplicate_datasource_replaced() {
        let config = EngineConfig::builder()
            .datasource("MASTER", "sqlite:a.db")
            .datasource("MASTER", "sqlite:b.db")
            .build()
            .unwrap();
        assert_eq!(config.datasources.len(), 1);
        assert_eq!(config.datasource("MASTER").unwrap().url, "sqlite:b.db");
    }

    #[test]
    fn test_build_rejects_invalid() {
        assert!(EngineConfig::builder().build().is_err());
        assert!(
            EngineConfig::builder()
                .datasource("MASTER", "sqlite::memory:")
                .max_connections(0)
                .build()
                .is_err()
        );
        assert!(
            EngineConfig::builder()
                .datasource("MASTER", "sqlite::memory:")
                .max_connections(2)
                .min_connections(3)
                .build()
                .is_err()
        );
        assert!(
            EngineConfig::builder()
                .datasource("MASTER", "sqlite::memory:")
                .node_id(MAX_NODE + 1)
                .build()
                .is_err()
        );
    }

    // =========================================================================
    // Environment Tests
    // =========================================================================

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_env_values() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("RELSTORE_DATABASE_URL", "sqlite:app.db"),
            ("RELSTORE_MAX_CONNECTIONS", "4"),
            ("RELSTORE_NODE_ID", "9"),
        ]))
        .unwrap();

        assert_eq!(config.datasource(DEFAULT_DATASOURCE).unwrap().url, "sqlite:app.db");
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.node_id, 9);
    }

    #[test]
    fn test_from_env_missing_url() {
        let err = EngineConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("RELSTORE_DATABASE_URL"));
    }

    #[test]
    fn test_from_env_bad_number() {
        let err = EngineConfig::from_lookup(lookup(&[
            ("RELSTORE_DATABASE_URL", "sqlite:app.db"),
            ("RELSTORE_NODE_ID", "many"),
        ]))
        .unwrap_err();
        assert!(err.is_validation());
    }

    // =========================================================================
    // ManagerOptions Tests
    // =========================================================================

    #[test]
    fn test_manager_options_default() {
        let opts = ManagerOptions::default();
        assert_eq!(opts.ds_name, "MASTER");
        assert!(!opts.open_tx);
        assert!(!opts.mirror_to_secondary);
        assert_eq!(opts.timeout, None);
        assert_eq!(opts.database, None);
        assert_eq!(opts.node, None);
    }

    #[test]
    fn test_manager_options_builder() {
        let opts = ManagerOptions::new()
            .ds_name("REPLICA")
            .database("app")
            .open_tx(true)
            .timeout(Duration::from_millis(250))
            .mirror_to_secondary(true)
            .node(3);

        assert_eq!(opts.ds_name, "REPLICA");
        assert_eq!(opts.database.as_deref(), Some("app"));
        assert!(opts.open_tx);
        assert_eq!(opts.timeout, Some(Duration::from_millis(250)));
        assert!(opts.mirror_to_secondary);
        assert_eq!(opts.node, Some(3));
    }
}
