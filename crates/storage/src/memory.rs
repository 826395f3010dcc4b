//! In-memory table service implementation.
//!
//! This module provides [`MemoryTableService`], an in-memory implementation
//! of [`TableService`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Rows live in a [`BTreeMap`] keyed by `(partition, sort)`, so scans follow
//!   key order and partition scans are range reads
//! - **Real paging**: Scans examine at most `page_size` rows per page and hand back a continuation
//!   token, so callers exercise the same paging path as against a remote service
//! - **Strict tables**: Operations on a table that was never created fail with
//!   [`TableError::TableNotFound`]
//!
//! # Example
//!
//! ```
//! use idtable_storage::{Fields, MemoryTableService, Row, RowKey, TableService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = MemoryTableService::new();
//!     service.create_table_if_absent("IdentityResources").await.unwrap();
//!
//!     let key = RowKey::new("identityresource", "openid");
//!     service.upsert("IdentityResources", Row::new(key.clone(), Fields::new())).await.unwrap();
//!
//!     assert!(service.get("IdentityResources", &key).await.unwrap().is_some());
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Filters are evaluated row by row; only partition equality narrows the range read

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::{TableError, TableResult},
    filter::Filter,
    health::{HealthMetadata, HealthStatus},
    service::TableService,
    types::{ContinuationToken, Fields, Page, Row, RowKey},
};

/// Default number of rows a single scan page examines.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

type TableData = BTreeMap<RowKey, Fields>;

/// In-memory table service.
///
/// # Cloning
///
/// `MemoryTableService` is cheaply cloneable via [`Arc`]. All clones share
/// the same tables.
#[derive(Clone)]
pub struct MemoryTableService {
    tables: Arc<RwLock<HashMap<String, TableData>>>,
    page_size: usize,
}

impl MemoryTableService {
    /// Creates an empty service with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty service whose scan pages examine at most
    /// `page_size` rows. A size of zero is treated as one.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self { tables: Arc::new(RwLock::new(HashMap::new())), page_size: page_size.max(1) }
    }

    /// Returns the configured page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns `true` if `table` has been created.
    #[must_use]
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }

    /// Returns the number of rows in `table`, or `None` if it does not exist.
    #[must_use]
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.read().get(table).map(BTreeMap::len)
    }
}

impl Default for MemoryTableService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableService for MemoryTableService {
    async fn create_table_if_absent(&self, table: &str) -> TableResult<()> {
        let mut tables = self.tables.write();
        tables.entry(table.to_owned()).or_default();
        Ok(())
    }

    async fn upsert(&self, table: &str, row: Row) -> TableResult<()> {
        let mut tables = self.tables.write();
        let data = tables.get_mut(table).ok_or_else(|| TableError::table_not_found(table))?;
        data.insert(row.key, row.fields);
        Ok(())
    }

    async fn get(&self, table: &str, key: &RowKey) -> TableResult<Option<Fields>> {
        let tables = self.tables.read();
        let data = tables.get(table).ok_or_else(|| TableError::table_not_found(table))?;
        Ok(data.get(key).cloned())
    }

    async fn scan_page(
        &self,
        table: &str,
        filter: &Filter,
        continuation: Option<ContinuationToken>,
    ) -> TableResult<Page> {
        let tables = self.tables.read();
        let data = tables.get(table).ok_or_else(|| TableError::table_not_found(table))?;

        let partition = filter.partition();
        let start = match (continuation, partition) {
            (Some(ContinuationToken(after)), _) => Bound::Excluded(after),
            (None, Some(p)) => Bound::Included(RowKey::new(p, "")),
            (None, None) => Bound::Unbounded,
        };

        let mut iter = data
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| partition.is_none_or(|p| key.partition == p))
            .peekable();

        let mut rows = Vec::new();
        let mut examined = 0;
        let mut last = None;
        while examined < self.page_size {
            let Some((key, fields)) = iter.next() else {
                break;
            };
            examined += 1;
            let row = Row::new(key.clone(), fields.clone());
            if filter.matches(&row) {
                rows.push(row);
            }
            last = Some(key);
        }

        let continuation = match (last, iter.peek()) {
            (Some(key), Some(_)) => Some(ContinuationToken(key.clone())),
            _ => None,
        };

        Ok(Page { rows, continuation })
    }

    async fn delete(&self, table: &str, key: &RowKey) -> TableResult<()> {
        let mut tables = self.tables.write();
        let data = tables.get_mut(table).ok_or_else(|| TableError::table_not_found(table))?;
        match data.remove(key) {
            Some(_) => Ok(()),
            None => Err(TableError::conflict(table, key)),
        }
    }

    async fn health_check(&self) -> TableResult<HealthStatus> {
        let start = Instant::now();
        let table_count = self.tables.read().len();
        Ok(HealthStatus::healthy(
            HealthMetadata::new(start.elapsed(), "memory")
                .with_detail("table_count", table_count.to_string()),
        ))
    }
}
