//! Error types for engine operations

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while registering models or executing statements
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Type not registered: {0}")]
    NotRegistered(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Batch of {len} objects exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Refusing {0} without a WHERE clause")]
    UnsafeWhere(&'static str),

    #[error("Upset has {keys} columns but {values} values")]
    UpsetMismatch { keys: usize, values: usize },

    #[error("Datasource not found: {0}")]
    DatasourceNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("Manager already closed")]
    Closed,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mirror error: {0}")]
    Mirror(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    pub fn not_registered(type_name: impl Into<String>) -> Self {
        Self::NotRegistered(type_name.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn mirror(msg: impl Into<String>) -> Self {
        Self::Mirror(msg.into())
    }

    /// True for failures detected before any SQL was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered(_)
                | Self::Validation(_)
                | Self::BatchTooLarge { .. }
                | Self::UnsafeWhere(_)
                | Self::UpsetMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(EngineError::validation("empty").is_validation());
        assert!(EngineError::BatchTooLarge { len: 2001, max: 2000 }.is_validation());
        assert!(EngineError::UnsafeWhere("DELETE").is_validation());
        assert!(!EngineError::Timeout(Duration::from_millis(5)).is_validation());
        assert!(!EngineError::Closed.is_validation());
    }

    #[test]
    fn test_messages() {
        let err = EngineError::BatchTooLarge { len: 2001, max: 2000 };
        assert_eq!(err.to_string(), "Batch of 2001 objects exceeds the limit of 2000");

        let err = EngineError::UpsetMismatch { keys: 2, values: 1 };
        assert_eq!(err.to_string(), "Upset has 2 columns but 1 values");
    }
}
