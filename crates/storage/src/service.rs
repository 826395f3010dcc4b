//! Table service trait definition.
//!
//! [`TableService`] is the abstraction every store in this workspace talks
//! to. It models a partitioned key-value table service: named tables hold
//! rows identified by `(partition, sort)` keys, each carrying a flat set of
//! typed fields.
//!
//! # Design Philosophy
//!
//! The trait is deliberately small:
//! - **Upserts only**: a write fully replaces whatever row held the key
//! - **Paged scans**: [`scan_page`](TableService::scan_page) returns one page and a continuation
//!   token; [`scan`](crate::scan) turns that into a stream
//! - **No transactions**: each call stands alone
//! - **No retries**: timeouts and retry policy belong to the implementation
//!
//! Domain logic (resources, clients, grants) lives in the stores built on
//! top of this trait, not in the services.
//!
//! # Implementing a Service
//!
//! 1. Implement [`TableService`]
//! 2. Map service-specific failures onto [`TableError`](crate::TableError)
//! 3. Run the [`conformance`](crate::conformance) suite against it
//!
//! See [`MemoryTableService`](crate::MemoryTableService) for a reference
//! implementation.

use async_trait::async_trait;

use crate::{
    error::TableResult,
    filter::Filter,
    health::HealthStatus,
    types::{ContinuationToken, Fields, Page, Row, RowKey},
};

/// Abstract partitioned table service.
///
/// Implementations must be thread-safe (`Send + Sync`) and object-safe so
/// stores can share one `Arc<dyn TableService>`.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`create_table_if_absent`](TableService::create_table_if_absent) | Idempotently create a table |
/// | [`upsert`](TableService::upsert) | Insert or fully replace a row |
/// | [`get`](TableService::get) | Point lookup by key |
/// | [`scan_page`](TableService::scan_page) | One page of filtered rows |
/// | [`delete`](TableService::delete) | Remove a row |
/// | [`health_check`](TableService::health_check) | Verify service availability |
///
/// # Example
///
/// ```
/// use idtable_storage::{Fields, MemoryTableService, Row, RowKey, TableService};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let service = MemoryTableService::new();
/// service.create_table_if_absent("Clients").await.unwrap();
///
/// let mut fields = Fields::new();
/// fields.set("ClientName", "Demo");
/// service.upsert("Clients", Row::new(RowKey::new("client", "demo"), fields)).await.unwrap();
///
/// let found = service.get("Clients", &RowKey::new("client", "demo")).await.unwrap();
/// assert!(found.is_some());
/// # });
/// ```
#[async_trait]
pub trait TableService: Send + Sync {
    /// Creates `table` if it does not exist yet.
    ///
    /// Calling this for an existing table is a no-op, so racing first uses
    /// are safe.
    #[must_use = "table operations may fail and errors must be handled"]
    async fn create_table_if_absent(&self, table: &str) -> TableResult<()>;

    /// Inserts `row`, replacing any row with the same key.
    #[must_use = "table operations may fail and errors must be handled"]
    async fn upsert(&self, table: &str, row: Row) -> TableResult<()>;

    /// Looks up a single row.
    ///
    /// Returns `Ok(None)` when no row holds `key`.
    #[must_use = "table operations may fail and errors must be handled"]
    async fn get(&self, table: &str, key: &RowKey) -> TableResult<Option<Fields>>;

    /// Returns one page of rows matching `filter`, in key order.
    ///
    /// Pass `None` to start a scan and the previous page's
    /// [`Page::continuation`] to resume it. A page may be empty while the
    /// continuation is still `Some`; callers keep going until it is `None`.
    ///
    /// The filter's `take` cap is a hint at this level; [`scan`](crate::scan)
    /// enforces it across pages.
    #[must_use = "table operations may fail and errors must be handled"]
    async fn scan_page(
        &self,
        table: &str,
        filter: &Filter,
        continuation: Option<ContinuationToken>,
    ) -> TableResult<Page>;

    /// Removes the row stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Conflict`](crate::TableError::Conflict) when the
    /// row does not exist, which is how a service reports that a concurrent
    /// actor removed it first.
    #[must_use = "table operations may fail and errors must be handled"]
    async fn delete(&self, table: &str, key: &RowKey) -> TableResult<()>;

    /// Checks that the service can serve requests.
    #[must_use = "health check results indicate service availability and must be inspected"]
    async fn health_check(&self) -> TableResult<HealthStatus>;
}
