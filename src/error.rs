//! Error types for sqldb.

use std::fmt;

use thiserror::Error;

/// Which side of a routed database an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Follower,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Follower => f.write_str("follower"),
        }
    }
}

/// The main error type for sqldb operations.
#[derive(Debug, Error)]
pub enum SqlDbError {
    /// Missing DSN, unknown driver, unreadable config file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every connection attempt to a target failed.
    ///
    /// `dsn` is already redacted.
    #[error("failed connect to database {dsn} after {attempts} attempt(s): {source}")]
    Connection {
        dsn: String,
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    /// Driver error from a read, write or prepare call, passed through as is.
    #[error(transparent)]
    Query(#[from] sqlx::Error),

    /// First failing probe of a routed ping.
    #[error("{role} health check failed: {source}")]
    HealthCheck {
        role: Role,
        #[source]
        source: sqlx::Error,
    },

    /// Named parameter compilation or lookup failed.
    #[error("Bind error: {0}")]
    Bind(String),

    /// A row could not be mapped onto the requested type.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The caller's context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The caller's context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqlDbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a bind error.
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind(message.into())
    }

    /// The underlying driver error, when there is one.
    pub fn driver_error(&self) -> Option<&sqlx::Error> {
        match self {
            Self::Connection { source, .. } | Self::HealthCheck { source, .. } => Some(source),
            Self::Query(source) => Some(source),
            _ => None,
        }
    }

    /// True when the error is the driver's "no rows" error.
    pub fn is_row_not_found(&self) -> bool {
        matches!(self, Self::Query(sqlx::Error::RowNotFound))
    }

    /// True when the caller's context ended the operation.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Result type alias for sqldb operations.
pub type SqlDbResult<T> = Result<T, SqlDbError>;
