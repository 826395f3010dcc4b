//! Table service error types and result alias.
//!
//! This module defines the errors that can occur while talking to a
//! partitioned table service. Every [`TableService`](crate::TableService)
//! implementation maps its internal failures onto these variants.
//!
//! # Error Classes
//!
//! - [`TableError::Conflict`] - A concurrent mutation raced the operation (e.g. the row was already
//!   deleted)
//! - [`TableError::Decode`] - A stored key or field could not be parsed into its typed form
//! - [`TableError::Connection`] - Network or connection-related failures
//! - [`TableError::Timeout`] - Operation exceeded the service's own time limit
//! - [`TableError::TableNotFound`] - The table was used before it was created
//! - [`TableError::Internal`] - Backend-specific internal errors
//!
//! Absence of a row is never an error: lookups return `Ok(None)`.
//!
//! Configuration problems are reported separately through [`ConfigError`],
//! and only at construction time.
//!
//! # Example
//!
//! ```
//! use idtable_storage::{TableError, TableResult};
//!
//! fn parse_sequence(raw: &str) -> TableResult<u32> {
//!     raw.parse().map_err(|e| TableError::decode_with_source(format!("bad sequence {raw:?}"), e))
//! }
//!
//! assert!(parse_sequence("0003").is_ok());
//! assert!(matches!(parse_sequence("x"), Err(TableError::Decode { .. })));
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors that can occur during table operations.
///
/// Errors preserve their source chain via the `#[source]` attribute, so
/// reporting tools can display the full context.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TableError {
    /// A concurrent actor changed or removed the row first.
    ///
    /// Returned by [`TableService::delete`](crate::TableService::delete) when
    /// the row is already absent. Callers that only care about the end state
    /// (row gone) may treat this as success.
    #[error("Conflict on {table} ({key})")]
    Conflict {
        /// Table the conflicting operation targeted.
        table: String,
        /// Display form of the row key.
        key: String,
    },

    /// A stored key or field could not be decoded.
    ///
    /// This indicates a programming error or corrupted data, never a
    /// transient condition.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
        /// The underlying parse error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Connection or network error.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The table has not been created.
    #[error("Table not found: {table}")]
    TableNotFound {
        /// Name of the missing table.
        table: String,
    },

    /// Internal table service error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation timed out.
    #[error("Operation timeout")]
    Timeout,
}

impl TableError {
    /// Creates a new `Conflict` error for a row of `table`.
    #[must_use]
    pub fn conflict(table: impl Into<String>, key: impl std::fmt::Display) -> Self {
        Self::Conflict { table: table.into(), key: key.to_string() }
    }

    /// Creates a new `Decode` error with the given message.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into(), source: None }
    }

    /// Creates a new `Decode` error with a message and source error.
    #[must_use]
    pub fn decode_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Decode { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `TableNotFound` error.
    #[must_use]
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound { table: table.into() }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` for the conflict/already-absent class.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` for failures a caller might reasonably retry later.
    ///
    /// The store itself never retries; this is a hint for schedulers.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}

/// Configuration errors, raised while building stores or validating options.
///
/// These are fatal at construction time and never produced by a running
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// No connection descriptor was configured for a table.
    #[error("no connection configured for table {table}")]
    MissingConnection {
        /// Logical table the connection is missing for.
        table: String,
    },

    /// A table name does not satisfy the service's naming rules.
    #[error("invalid table name {name:?}: {reason}")]
    InvalidTableName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A numeric or duration setting is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The connector could not resolve a connection descriptor.
    #[error("cannot connect using {descriptor:?}: {reason}")]
    Connect {
        /// The descriptor that failed to resolve.
        descriptor: String,
        /// Why it failed.
        reason: String,
    },
}
