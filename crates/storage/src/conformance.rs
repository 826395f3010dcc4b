//! Conformance test suite for [`TableService`] implementations.
//!
//! This module provides async test functions that validate whether a
//! [`TableService`] implementation satisfies the trait contract the stores
//! rely on. Every service, in-memory or remote, can run the same suite.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with a
//! fresh service instance:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use idtable_storage::{MemoryTableService, conformance};
//!
//! #[tokio::test]
//! async fn crud_get_returns_none_for_missing_row() {
//!     conformance::crud_get_returns_none_for_missing_row(Arc::new(MemoryTableService::new())).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Functions | Contract aspect |
//! |----------|-----------|-----------------|
//! | Tables | 2 tests | Create-if-absent idempotence, strict table existence |
//! | CRUD | 6 tests | Upsert/get/delete semantics, conflict on absent delete |
//! | Scan | 7 tests | Ordering, partition restriction, predicates, take, paging |
//! | Concurrent | 2 tests | Thread-safety under parallel access |
//! | Health | 1 test | Health check answers |

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use futures::{StreamExt, TryStreamExt};

use crate::{
    assert_table_conflict,
    error::TableError,
    filter::Filter,
    scan::scan,
    service::TableService,
    types::{Fields, Row, RowKey},
};

const TABLE: &str = "Conformance";

fn row(partition: &str, sort: &str) -> Row {
    let mut fields = Fields::new();
    fields.set("Tag", format!("{partition}:{sort}"));
    Row::new(RowKey::new(partition, sort), fields)
}

async fn prepared<S: TableService>(service: &S) {
    service.create_table_if_absent(TABLE).await.expect("create table");
}

async fn collect<S: TableService + 'static>(service: &Arc<S>, filter: Filter) -> Vec<Row> {
    let service: Arc<dyn TableService> = service.clone();
    scan(service, TABLE, filter).try_collect().await.expect("scan should succeed")
}

fn sorts(rows: &[Row]) -> Vec<&str> {
    rows.iter().map(|r| r.key.sort.as_str()).collect()
}

// ============================================================================
// Tables (2 tests)
// ============================================================================

/// Creating an existing table keeps its rows.
pub async fn tables_create_is_idempotent<S: TableService>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    service.upsert(TABLE, row("p", "s")).await.expect("upsert");
    service.create_table_if_absent(TABLE).await.expect("second create");
    let found = service.get(TABLE, &RowKey::new("p", "s")).await.expect("get");
    assert!(found.is_some(), "re-creating a table must not drop its rows");
}

/// Every operation on a table that was never created fails with `TableNotFound`.
pub async fn tables_missing_table_is_error<S: TableService>(service: Arc<S>) {
    let key = RowKey::new("p", "s");
    let get = service.get("NeverCreated", &key).await;
    assert!(matches!(get, Err(TableError::TableNotFound { .. })), "get: {get:?}");

    let upsert = service.upsert("NeverCreated", row("p", "s")).await;
    assert!(matches!(upsert, Err(TableError::TableNotFound { .. })), "upsert: {upsert:?}");

    let delete = service.delete("NeverCreated", &key).await;
    assert!(matches!(delete, Err(TableError::TableNotFound { .. })), "delete: {delete:?}");
}

// ============================================================================
// CRUD (6 tests)
// ============================================================================

/// `get` on a missing row returns `Ok(None)`.
pub async fn crud_get_returns_none_for_missing_row<S: TableService>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    let result = service.get(TABLE, &RowKey::new("p", "missing")).await;
    assert!(result.is_ok(), "get should not error on missing row: {result:?}");
    assert_eq!(result.expect("checked above"), None);
}

/// `upsert` then `get` returns the stored fields.
pub async fn crud_upsert_then_get_returns_fields<S: TableService>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    let stored = row("p", "s");
    service.upsert(TABLE, stored.clone()).await.expect("upsert");
    let fields = service.get(TABLE, &stored.key).await.expect("get");
    assert_eq!(fields, Some(stored.fields));
}

/// A second `upsert` fully replaces the first; fields it omits disappear.
pub async fn crud_upsert_replaces_whole_row<S: TableService>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    let key = RowKey::new("p", "s");

    let mut first = Fields::new();
    first.set("A", "1").set("B", "2");
    service.upsert(TABLE, Row::new(key.clone(), first)).await.expect("first upsert");

    let mut second = Fields::new();
    second.set("A", "3");
    service.upsert(TABLE, Row::new(key.clone(), second.clone())).await.expect("second upsert");

    let fields = service.get(TABLE, &key).await.expect("get");
    assert_eq!(fields, Some(second), "upsert must replace, not merge");
}

/// `delete` removes a previously stored row.
pub async fn crud_delete_removes_row<S: TableService>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    let stored = row("p", "s");
    service.upsert(TABLE, stored.clone()).await.expect("upsert");
    service.delete(TABLE, &stored.key).await.expect("delete");
    assert_eq!(service.get(TABLE, &stored.key).await.expect("get"), None);
}

/// `delete` of an absent row reports a conflict.
pub async fn crud_delete_absent_is_conflict<S: TableService>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    let result = service.delete(TABLE, &RowKey::new("p", "ghost")).await;
    assert_table_conflict!(result);
}

/// The same sort key under different partitions names different rows.
pub async fn crud_partitions_are_isolated<S: TableService>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    service.upsert(TABLE, row("a", "x")).await.expect("upsert a");
    service.upsert(TABLE, row("b", "x")).await.expect("upsert b");
    service.delete(TABLE, &RowKey::new("a", "x")).await.expect("delete a");

    assert_eq!(service.get(TABLE, &RowKey::new("a", "x")).await.expect("get a"), None);
    assert!(service.get(TABLE, &RowKey::new("b", "x")).await.expect("get b").is_some());
}

// ============================================================================
// Scan (7 tests)
// ============================================================================

/// A partition scan returns only that partition, ordered by sort key.
pub async fn scan_partition_is_ordered_and_isolated<S: TableService + 'static>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    for (p, s) in [("b", "c"), ("a", "z"), ("b", "a"), ("c", "a"), ("b", "b")] {
        service.upsert(TABLE, row(p, s)).await.expect("upsert");
    }

    let rows = collect(&service, Filter::new().partition_eq("b")).await;
    assert_eq!(sorts(&rows), vec!["a", "b", "c"]);
    assert!(rows.iter().all(|r| r.key.partition == "b"));
}

/// A whole-table scan returns every row ordered by partition then sort key.
pub async fn scan_whole_table_is_ordered<S: TableService + 'static>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    for (p, s) in [("b", "1"), ("a", "2"), ("a", "1")] {
        service.upsert(TABLE, row(p, s)).await.expect("upsert");
    }

    let rows = collect(&service, Filter::new()).await;
    let keys: Vec<String> = rows.iter().map(|r| r.key.to_string()).collect();
    assert_eq!(keys, vec!["a/1", "a/2", "b/1"]);
}

/// A scan of an empty partition yields nothing.
pub async fn scan_empty_partition_yields_nothing<S: TableService + 'static>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    service.upsert(TABLE, row("a", "1")).await.expect("upsert");
    let rows = collect(&service, Filter::new().partition_eq("zz")).await;
    assert!(rows.is_empty());
}

/// Named-field equality filters rows.
pub async fn scan_field_equality<S: TableService + 'static>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    for (sort, client) in [("1", "c1"), ("2", "c2"), ("3", "c1")] {
        let mut fields = Fields::new();
        fields.set("ClientId", client);
        service.upsert(TABLE, Row::new(RowKey::new("p", sort), fields)).await.expect("upsert");
    }

    let rows = collect(&service, Filter::new().field_eq("ClientId", "c1")).await;
    assert_eq!(sorts(&rows), vec!["1", "3"]);
}

/// `<=` includes the boundary and rows without the field never match.
pub async fn scan_field_le_includes_boundary<S: TableService + 'static>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    let now = Utc.with_ymd_and_hms(2016, 8, 1, 0, 0, 0).single().expect("valid timestamp");
    let cases = [
        ("before", Some(now - Duration::seconds(1))),
        ("equal", Some(now)),
        ("after", Some(now + Duration::seconds(1))),
        ("never", None),
    ];
    for (sort, expiration) in cases {
        let mut fields = Fields::new();
        fields.set_opt("Expiration", expiration);
        service.upsert(TABLE, Row::new(RowKey::new("p", sort), fields)).await.expect("upsert");
    }

    let rows = collect(&service, Filter::new().field_le("Expiration", now)).await;
    assert_eq!(sorts(&rows), vec!["before", "equal"]);
}

/// `take` caps the number of rows a scan yields.
pub async fn scan_take_caps_results<S: TableService + 'static>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    for i in 0..10 {
        service.upsert(TABLE, row("p", &format!("{i:04}"))).await.expect("upsert");
    }

    let rows = collect(&service, Filter::new().take(3)).await;
    assert_eq!(sorts(&rows), vec!["0000", "0001", "0002"]);
}

/// Scans transparently cross page boundaries without losing or repeating rows.
pub async fn scan_crosses_pages<S: TableService + 'static>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    let count = 2_500;
    for i in 0..count {
        service.upsert(TABLE, row("p", &format!("{i:05}"))).await.expect("upsert");
    }

    let rows = collect(&service, Filter::new().partition_eq("p")).await;
    assert_eq!(rows.len(), count);
    assert!(rows.windows(2).all(|w| w[0].key < w[1].key), "rows must be strictly ordered");
}

// ============================================================================
// Concurrent (2 tests)
// ============================================================================

/// Parallel upserts to distinct keys all land.
pub async fn concurrent_upserts_to_different_rows<S: TableService + 'static>(service: Arc<S>) {
    prepared(service.as_ref()).await;
    let mut handles = Vec::new();
    for task in 0..10 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                let sort = format!("{task:02}-{i:02}");
                service.upsert(TABLE, row("p", &sort)).await.expect("concurrent upsert");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    let rows = collect(&service, Filter::new()).await;
    assert_eq!(rows.len(), 100);
}

/// Racing `create_table_if_absent` calls all succeed.
pub async fn concurrent_create_table_races_are_safe<S: TableService + 'static>(service: Arc<S>) {
    let results: Vec<_> = futures::stream::iter(0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            async move { service.create_table_if_absent(TABLE).await }
        })
        .buffer_unordered(8)
        .collect()
        .await;
    assert!(results.iter().all(Result::is_ok), "all creates should succeed: {results:?}");
    service.upsert(TABLE, row("p", "s")).await.expect("table usable after racing creates");
}

// ============================================================================
// Health (1 test)
// ============================================================================

/// A working service reports healthy.
pub async fn health_check_reports_healthy<S: TableService>(service: Arc<S>) {
    let status = service.health_check().await.expect("health check");
    assert!(status.is_healthy(), "expected healthy, got {status}");
}

/// Runs every conformance check, each against a fresh service from `factory`.
pub async fn run_all<S, F>(factory: F)
where
    S: TableService + 'static,
    F: Fn() -> S,
{
    let fresh = || Arc::new(factory());

    tables_create_is_idempotent(fresh()).await;
    tables_missing_table_is_error(fresh()).await;

    crud_get_returns_none_for_missing_row(fresh()).await;
    crud_upsert_then_get_returns_fields(fresh()).await;
    crud_upsert_replaces_whole_row(fresh()).await;
    crud_delete_removes_row(fresh()).await;
    crud_delete_absent_is_conflict(fresh()).await;
    crud_partitions_are_isolated(fresh()).await;

    scan_partition_is_ordered_and_isolated(fresh()).await;
    scan_whole_table_is_ordered(fresh()).await;
    scan_empty_partition_yields_nothing(fresh()).await;
    scan_field_equality(fresh()).await;
    scan_field_le_includes_boundary(fresh()).await;
    scan_take_caps_results(fresh()).await;
    scan_crosses_pages(fresh()).await;

    concurrent_upserts_to_different_rows(fresh()).await;
    concurrent_create_table_races_are_safe(fresh()).await;

    health_check_reports_healthy(fresh()).await;
}
