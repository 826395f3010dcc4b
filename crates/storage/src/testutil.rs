//! Shared test utilities for table service testing.
//!
//! This module provides helpers for building seeded services, a
//! fault-injecting service wrapper, and assertion macros over
//! [`TableResult`] values. It is feature-gated behind `testutil` to prevent
//! leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! idtable-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use idtable_storage::testutil::{FaultyTableService, memory_service};
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    error::{TableError, TableResult},
    filter::Filter,
    health::HealthStatus,
    memory::MemoryTableService,
    service::TableService,
    types::{ContinuationToken, FieldValue, Fields, Page, Row, RowKey},
};

/// Creates a [`MemoryTableService`] with `tables` already created.
///
/// # Panics
///
/// Panics if table creation fails (should not happen in memory).
pub async fn memory_service(tables: &[&str]) -> MemoryTableService {
    let service = MemoryTableService::new();
    for table in tables {
        service.create_table_if_absent(table).await.expect("create table failed");
    }
    service
}

/// Builds a row from a key and `(name, value)` pairs.
#[must_use]
pub fn make_row<V: Into<FieldValue> + Clone>(
    partition: &str,
    sort: &str,
    fields: &[(&str, V)],
) -> Row {
    let mut set = Fields::new();
    for (name, value) in fields {
        set.set(*name, value.clone());
    }
    Row::new(RowKey::new(partition, sort), set)
}

/// Table operation kinds seen by [`FaultyTableService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create_table_if_absent`
    CreateTable,
    /// `upsert`
    Upsert,
    /// `get`
    Get,
    /// `scan_page`
    Scan,
    /// `delete`
    Delete,
}

/// What [`FaultyTableService`] does instead of a normal call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Return this error without touching the inner service.
    Fail(TableError),
    /// Remove the row from the inner service, then report a conflict, the
    /// way a service answers when another actor deleted the row first.
    ///
    /// Only meaningful for deletes; other operations pass through.
    ConcurrentDelete,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation kind.
    pub op: Operation,
    /// Target table.
    pub table: String,
    /// Target row, for keyed operations.
    pub key: Option<RowKey>,
}

type Injector = Arc<dyn Fn(&Call) -> Option<Fault> + Send + Sync>;

/// A wrapper around [`MemoryTableService`] that records every call and
/// injects faults chosen by a caller-supplied closure.
///
/// The journal lets tests assert on write order; the injector lets them
/// simulate transport failures and concurrent deletes.
///
/// # Example
///
/// ```no_run
/// use idtable_storage::{TableError, testutil::{Fault, FaultyTableService, Operation}};
///
/// let service = FaultyTableService::default();
/// service.inject(|call| {
///     (call.op == Operation::Delete).then(|| Fault::Fail(TableError::timeout()))
/// });
/// ```
#[derive(Clone, Default)]
pub struct FaultyTableService {
    inner: MemoryTableService,
    injector: Arc<Mutex<Option<Injector>>>,
    journal: Arc<Mutex<Vec<Call>>>,
}

impl FaultyTableService {
    /// Wraps an existing in-memory service.
    #[must_use]
    pub fn new(inner: MemoryTableService) -> Self {
        Self { inner, injector: Arc::default(), journal: Arc::default() }
    }

    /// Returns the wrapped service for direct inspection.
    #[must_use]
    pub fn inner(&self) -> &MemoryTableService {
        &self.inner
    }

    /// Installs a fault injector, replacing any previous one.
    pub fn inject<F>(&self, injector: F)
    where
        F: Fn(&Call) -> Option<Fault> + Send + Sync + 'static,
    {
        *self.injector.lock() = Some(Arc::new(injector));
    }

    /// Removes the fault injector.
    pub fn clear_faults(&self) {
        *self.injector.lock() = None;
    }

    /// Returns every call seen so far, in order.
    #[must_use]
    pub fn journal(&self) -> Vec<Call> {
        self.journal.lock().clone()
    }

    /// Returns the recorded calls of one kind, in order.
    #[must_use]
    pub fn calls(&self, op: Operation) -> Vec<Call> {
        self.journal.lock().iter().filter(|c| c.op == op).cloned().collect()
    }

    /// Forgets all recorded calls.
    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    fn record(&self, op: Operation, table: &str, key: Option<&RowKey>) -> Option<Fault> {
        let call = Call { op, table: table.to_owned(), key: key.cloned() };
        let injector = self.injector.lock().clone();
        let fault = injector.and_then(|f| f(&call));
        self.journal.lock().push(call);
        fault
    }
}

#[async_trait]
impl TableService for FaultyTableService {
    async fn create_table_if_absent(&self, table: &str) -> TableResult<()> {
        if let Some(Fault::Fail(e)) = self.record(Operation::CreateTable, table, None) {
            return Err(e);
        }
        self.inner.create_table_if_absent(table).await
    }

    async fn upsert(&self, table: &str, row: Row) -> TableResult<()> {
        if let Some(Fault::Fail(e)) = self.record(Operation::Upsert, table, Some(&row.key)) {
            return Err(e);
        }
        self.inner.upsert(table, row).await
    }

    async fn get(&self, table: &str, key: &RowKey) -> TableResult<Option<Fields>> {
        if let Some(Fault::Fail(e)) = self.record(Operation::Get, table, Some(key)) {
            return Err(e);
        }
        self.inner.get(table, key).await
    }

    async fn scan_page(
        &self,
        table: &str,
        filter: &Filter,
        continuation: Option<ContinuationToken>,
    ) -> TableResult<Page> {
        if let Some(Fault::Fail(e)) = self.record(Operation::Scan, table, None) {
            return Err(e);
        }
        self.inner.scan_page(table, filter, continuation).await
    }

    async fn delete(&self, table: &str, key: &RowKey) -> TableResult<()> {
        match self.record(Operation::Delete, table, Some(key)) {
            Some(Fault::Fail(e)) => Err(e),
            Some(Fault::ConcurrentDelete) => {
                // The racing actor's delete succeeds or finds nothing; either way ours conflicts.
                let _ = self.inner.delete(table, key).await;
                Err(TableError::conflict(table, key))
            },
            None => self.inner.delete(table, key).await,
        }
    }

    async fn health_check(&self) -> TableResult<HealthStatus> {
        self.inner.health_check().await
    }
}

/// Assert that a [`TableResult`] is a [`TableError::Conflict`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use idtable_storage::{TableError, TableResult, assert_table_conflict};
///
/// let result: TableResult<()> = Err(TableError::conflict("Clients", "client/x"));
/// assert_table_conflict!(result);
/// ```
#[macro_export]
macro_rules! assert_table_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::TableError::Conflict { .. })),
            "expected TableError::Conflict, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::TableError::Conflict { .. })),
            "{}: expected TableError::Conflict, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`TableResult`] is a [`TableError::Decode`].
#[macro_export]
macro_rules! assert_decode_error {
    ($result:expr) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::error::TableError::Decode { .. })),
            "expected TableError::Decode, got: {:?}",
            result,
        );
    }};
}

/// Assert that a [`TableResult`] is `Ok`.
///
/// Returns the inner value on success, panics with a descriptive message on
/// failure.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use idtable_storage::{TableResult, assert_table_ok};
///
/// let result: TableResult<i32> = Ok(42);
/// let value = assert_table_ok!(result);
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_table_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got TableError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got TableError: {e:?}", $msg),
        }
    };
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_service_creates_tables() {
        let service = memory_service(&["A", "B"]).await;
        assert!(service.has_table("A"));
        assert!(service.has_table("B"));
        assert!(!service.has_table("C"));
    }

    #[test]
    fn test_make_row() {
        let row = make_row("p", "s", &[("Type", "SharedSecret"), ("Value", "secret")]);
        assert_eq!(row.key, RowKey::new("p", "s"));
        assert_eq!(row.fields.len(), 2);
    }

    #[tokio::test]
    async fn test_journal_records_in_order() {
        let service = FaultyTableService::new(memory_service(&["T"]).await);
        service.upsert("T", make_row::<&str>("p", "1", &[])).await.unwrap();
        service.get("T", &RowKey::new("p", "1")).await.unwrap();

        let ops: Vec<_> = service.journal().iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![Operation::Upsert, Operation::Get]);
    }

    #[tokio::test]
    async fn test_injected_failure_skips_inner() {
        let service = FaultyTableService::new(memory_service(&["T"]).await);
        service.inject(|call| {
            (call.op == Operation::Upsert).then(|| Fault::Fail(TableError::timeout()))
        });

        let result = service.upsert("T", make_row::<&str>("p", "1", &[])).await;
        assert!(matches!(result, Err(TableError::Timeout)));
        assert_eq!(service.inner().row_count("T"), Some(0));
    }

    #[tokio::test]
    async fn test_concurrent_delete_removes_then_conflicts() {
        let service = FaultyTableService::new(memory_service(&["T"]).await);
        service.upsert("T", make_row::<&str>("p", "1", &[])).await.unwrap();
        service.inject(|call| (call.op == Operation::Delete).then_some(Fault::ConcurrentDelete));

        let result = service.delete("T", &RowKey::new("p", "1")).await;
        assert_table_conflict!(result);
        assert_eq!(service.inner().row_count("T"), Some(0));
    }

    #[test]
    fn test_assert_table_ok_macro() {
        let result: TableResult<i32> = Ok(42);
        assert_eq!(assert_table_ok!(result), 42);
    }

    #[test]
    fn test_assert_decode_error_macro() {
        let result: TableResult<()> = Err(TableError::decode("bad"));
        assert_decode_error!(result);
    }
}
