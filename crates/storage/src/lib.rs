//! Partitioned table service abstraction for identity configuration stores.
//!
//! This crate provides the [`TableService`] trait and related types that
//! the entity stores in `idtable-store` are built on. A table service holds
//! named tables of rows; each row has a two-level key (partition, sort) and
//! a flat set of typed fields.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Aggregate Stores                          │
//! │  ApiResourceStore │ ClientStore │ PersistedGrantStore │ ... │
//! │      (decompose/compose, secondary indexes, cleanup)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  EntityStore<R>                             │
//! │       (typed rows, lazy table creation, scans)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  idtable-storage                            │
//! │                 TableService trait                          │
//! │     (create_table_if_absent, upsert, get, scan_page,        │
//! │      delete, health_check)                                  │
//! ├──────────────────────┬──────────────────────────────────────┤
//! │ MemoryTableService   │        remote table services         │
//! │      (testing)       │                                      │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use futures::TryStreamExt;
//! use idtable_storage::{Fields, Filter, MemoryTableService, Row, RowKey, TableService, scan};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Arc::new(MemoryTableService::new());
//!     service.create_table_if_absent("ClientGrantTypes").await?;
//!
//!     for grant_type in ["authorization_code", "client_credentials"] {
//!         let row = Row::new(RowKey::new("client1", grant_type), Fields::new());
//!         service.upsert("ClientGrantTypes", row).await?;
//!     }
//!
//!     let rows: Vec<Row> =
//!         scan(service, "ClientGrantTypes", Filter::new().partition_eq("client1"))
//!             .try_collect()
//!             .await?;
//!     assert_eq!(rows.len(), 2);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`TableResult<T>`]. Absence is never an error:
//! lookups return `Ok(None)`. Deleting an absent row returns
//! [`TableError::Conflict`], which callers that only care about the end
//! state may treat as success.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (seeded services, a fault-injecting wrapper,
//!   assertion macros) and the [`conformance`] suite. Enable this in `[dev-dependencies]` for
//!   integration tests.

#![deny(unsafe_code)]

#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod connector;
pub mod error;
pub mod filter;
pub mod health;
pub mod memory;
pub mod scan;
pub mod service;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use connector::{MemoryConnector, TableConnector};
pub use error::{BoxError, ConfigError, TableError, TableResult};
pub use filter::{Comparison, Field, Filter, Predicate};
pub use health::{HealthMetadata, HealthStatus};
pub use memory::{DEFAULT_PAGE_SIZE, MemoryTableService};
pub use scan::scan;
pub use service::TableService;
pub use types::{ContinuationToken, FieldValue, Fields, Page, Row, RowKey};
