//! Paged scans as a lazy stream.
//!
//! [`scan`] drives [`TableService::scan_page`] page by page and yields rows
//! one at a time, so callers never see continuation tokens. Pages are
//! fetched on demand: dropping the stream early stops fetching.

use std::{collections::VecDeque, sync::Arc};

use futures::stream::{self, BoxStream, StreamExt};

use crate::{
    error::TableResult,
    filter::Filter,
    service::TableService,
    types::{ContinuationToken, Row},
};

struct ScanState {
    service: Arc<dyn TableService>,
    table: String,
    filter: Filter,
    buffer: VecDeque<Row>,
    continuation: Option<ContinuationToken>,
    exhausted: bool,
    remaining: Option<usize>,
}

/// Streams every row of `table` matching `filter`, in key order.
///
/// The stream ends after the filter's `take` cap is reached, after the last
/// page, or right after yielding the first error.
///
/// Each call starts a fresh scan from the beginning of the table.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use futures::TryStreamExt;
/// use idtable_storage::{Fields, Filter, MemoryTableService, Row, RowKey, TableService, scan};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let service = Arc::new(MemoryTableService::with_page_size(2));
/// service.create_table_if_absent("ClientScopes").await.unwrap();
/// for scope in ["api1", "api2", "openid"] {
///     let row = Row::new(RowKey::new("client1", scope), Fields::new());
///     service.upsert("ClientScopes", row).await.unwrap();
/// }
///
/// let rows: Vec<Row> =
///     scan(service, "ClientScopes", Filter::new().partition_eq("client1")).try_collect().await.unwrap();
/// assert_eq!(rows.len(), 3);
/// # });
/// ```
pub fn scan(
    service: Arc<dyn TableService>,
    table: impl Into<String>,
    filter: Filter,
) -> BoxStream<'static, TableResult<Row>> {
    let remaining = filter.take_limit();
    let state = ScanState {
        service,
        table: table.into(),
        filter,
        buffer: VecDeque::new(),
        continuation: None,
        exhausted: false,
        remaining,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.remaining == Some(0) {
                return None;
            }

            if let Some(row) = state.buffer.pop_front() {
                if let Some(n) = state.remaining.as_mut() {
                    *n -= 1;
                }
                return Some((Ok(row), state));
            }

            if state.exhausted {
                return None;
            }

            let continuation = state.continuation.take();
            match state.service.scan_page(&state.table, &state.filter, continuation).await {
                Ok(page) => {
                    state.exhausted = page.continuation.is_none();
                    state.continuation = page.continuation;
                    state.buffer.extend(page.rows);
                },
                Err(e) => {
                    state.exhausted = true;
                    return Some((Err(e), state));
                },
            }
        }
    })
    .boxed()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::{
        memory::MemoryTableService,
        types::{Fields, RowKey},
    };

    async fn seeded(page_size: usize, rows: usize) -> Arc<MemoryTableService> {
        let service = Arc::new(MemoryTableService::with_page_size(page_size));
        service.create_table_if_absent("Rows").await.unwrap();
        for i in 0..rows {
            let row = Row::new(RowKey::new("p", format!("{i:04}")), Fields::new());
            service.upsert("Rows", row).await.unwrap();
        }
        service
    }

    #[tokio::test]
    async fn test_scan_crosses_pages_in_order() {
        let service = seeded(3, 10).await;
        let rows: Vec<Row> = scan(service, "Rows", Filter::new()).try_collect().await.unwrap();

        let sorts: Vec<_> = rows.iter().map(|r| r.key.sort.clone()).collect();
        let expected: Vec<_> = (0..10).map(|i| format!("{i:04}")).collect();
        assert_eq!(sorts, expected);
    }

    #[tokio::test]
    async fn test_scan_take_spans_pages() {
        let service = seeded(2, 10).await;
        let rows: Vec<Row> =
            scan(service, "Rows", Filter::new().take(5)).try_collect().await.unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4].key.sort, "0004");
    }

    #[tokio::test]
    async fn test_scan_take_zero_yields_nothing() {
        let service = seeded(2, 4).await;
        let rows: Vec<Row> =
            scan(service, "Rows", Filter::new().take(0)).try_collect().await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_scan_missing_table_yields_single_error() {
        let service = Arc::new(MemoryTableService::new());
        let results: Vec<TableResult<Row>> =
            scan(service, "Missing", Filter::new()).collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(crate::TableError::TableNotFound { .. })));
    }
}
