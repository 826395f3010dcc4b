//! Identity configuration and grant stores over a partitioned table service.
//!
//! Aggregates such as API resources and clients are split into one primary
//! row plus child rows in sibling tables, and reassembled on read. Grants
//! live in a single table and are drained by a background cleanup task once
//! they expire.
//!
//! # Layout
//!
//! | Aggregate | Tables |
//! |-----------|--------|
//! | [`ApiResource`](model::ApiResource) | resources, claims, secrets, scopes, scope claims, scope index |
//! | [`IdentityResource`](model::IdentityResource) | resources, claims |
//! | [`Client`](model::Client) | clients plus eight child tables |
//! | [`PersistedGrant`](model::PersistedGrant) | grants |
//!
//! Table names come from [`ConfigurationStoreOptions`] and
//! [`OperationalStoreOptions`]; every table is created on first use.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use idtable_storage::MemoryTableService;
//! use idtable_store::{ConfigurationStoreOptions, ResourceStore, model::{ApiResource, ApiScope}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resources = ResourceStore::with_service(
//!         Arc::new(MemoryTableService::new()),
//!         &ConfigurationStoreOptions::default(),
//!     );
//!
//!     let api = ApiResource::builder()
//!         .name("api1")
//!         .scopes(vec![ApiScope::builder().name("api1.read").build()])
//!         .build();
//!     resources.api_resources().store(&api).await?;
//!
//!     let found = resources.find_api_resources_by_scope(&["api1.read"]).await?;
//!     assert_eq!(found, vec![api]);
//!     Ok(())
//! }
//! ```
//!
//! # Consistency
//!
//! Writes are row-at-a-time upserts with no cross-row transaction. A
//! failure part-way through storing an aggregate leaves the rows written so
//! far in place; storing the aggregate again converges. Removed children
//! and stale scope index rows are not pruned.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the [`testutil`] module (a controllable clock, grant factories, and
//!   resource fixtures).

#![deny(unsafe_code)]

pub mod api_resource;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod cors;
pub mod entity_store;
pub mod grants;
pub mod host;
pub mod identity_resource;
pub mod keys;
pub mod model;
pub mod record;
pub mod records;
pub mod resources;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use api_resource::ApiResourceStore;
pub use cleanup::{CleanupReport, GrantRemovalNotification, TokenCleanup};
pub use client::ClientStore;
pub use config::{ConfigurationStoreOptions, OperationalStoreOptions, TableConfig};
pub use cors::CorsPolicy;
pub use entity_store::EntityStore;
pub use grants::{Clock, PersistedGrantStore, SystemClock};
pub use host::CleanupHost;
pub use identity_resource::IdentityResourceStore;
pub use record::TableRecord;
pub use resources::ResourceStore;
