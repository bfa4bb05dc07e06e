//! Error types for the auth engine
//!
//! Business outcomes (bad credentials, no matching ACL rule) are never errors;
//! they are returned as a [`Decision`](crate::acl::Decision). The types here
//! cover infrastructure faults and configuration problems only.

use std::time::Duration;
use thiserror::Error;

/// Infrastructure errors raised while talking to the credential store
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pool could not be created or a connection could not be obtained
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store operation exceeded its deadline
    #[error("store operation timed out after {0:?}")]
    StoreTimeout(Duration),

    /// A single row could not be decoded
    #[error(transparent)]
    StoreProtocol(#[from] RowError),

    /// Unexpected fault in the evaluation path
    #[error("internal fault: {0}")]
    Fault(String),
}

impl EngineError {
    /// Whether the failure policy should apply fail-open/fail-closed to this error
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::StoreTimeout(_))
    }
}

/// A malformed or undecodable store row, scoped to that row only
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed {table} row #{index}: {reason}")]
pub struct RowError {
    pub table: &'static str,
    pub index: usize,
    pub reason: String,
}

impl RowError {
    pub fn new(table: &'static str, index: usize, reason: impl Into<String>) -> Self {
        Self {
            table,
            index,
            reason: reason.into(),
        }
    }
}

/// Missing or invalid settings; fatal at load time
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dsn must be set")]
    MissingDsn,

    #[error("invalid dsn: {0}")]
    InvalidDsn(String),

    #[error("timeout must be a positive number of milliseconds, got {0:?}")]
    InvalidTimeout(String),

    #[error("invalid boolean for {key}: {value:?}")]
    InvalidBool { key: String, value: String },

    #[error("invalid pool settings: {0}")]
    InvalidPool(String),

    #[error("invalid bypass network {0:?}")]
    InvalidNetwork(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
