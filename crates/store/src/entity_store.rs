//! Generic typed store over one table.

use std::{fmt, marker::PhantomData, sync::Arc};

use futures::{
    future,
    stream::{self, BoxStream, StreamExt, TryStreamExt},
};
use idtable_storage::{Filter, HealthStatus, Row, RowKey, TableResult, TableService, scan};
use tokio::sync::OnceCell;

use crate::record::TableRecord;

/// CRUD and scan access to one table holding records of shape `R`.
///
/// The table is created on first use; creation runs at most once per store
/// instance and is idempotent on the service, so racing first calls from
/// several instances are safe.
///
/// Lookups never fail for missing rows. Transport failures propagate
/// unchanged and are never retried here.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use futures::TryStreamExt;
/// use idtable_storage::MemoryTableService;
/// use idtable_store::{entity_store::EntityStore, records::ClientScopeRecord};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store: EntityStore<ClientScopeRecord> =
///     EntityStore::new(Arc::new(MemoryTableService::new()), "ClientScopes");
///
/// store.upsert(&ClientScopeRecord::new("client1", "openid")).await.unwrap();
/// store.upsert(&ClientScopeRecord::new("client1", "api1")).await.unwrap();
///
/// let scopes: Vec<_> = store.enumerate(Some("client1")).try_collect().await.unwrap();
/// assert_eq!(scopes[0].scope, "api1");
/// assert_eq!(scopes[1].scope, "openid");
/// # });
/// ```
pub struct EntityStore<R> {
    service: Arc<dyn TableService>,
    table: String,
    ready: OnceCell<()>,
    _record: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for EntityStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("table", &self.table)
            .field("ready", &self.ready.initialized())
            .finish_non_exhaustive()
    }
}

impl<R: TableRecord> EntityStore<R> {
    /// Creates a store over `table`. No I/O happens until first use.
    pub fn new(service: Arc<dyn TableService>, table: impl Into<String>) -> Self {
        Self { service, table: table.into(), ready: OnceCell::new(), _record: PhantomData }
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Returns the backing service.
    #[must_use]
    pub fn service(&self) -> &Arc<dyn TableService> {
        &self.service
    }

    async fn ensure_table(&self) -> TableResult<()> {
        self.ready
            .get_or_try_init(|| async {
                tracing::debug!(table = %self.table, "creating table if absent");
                self.service.create_table_if_absent(&self.table).await
            })
            .await
            .map(|_| ())
    }

    /// Inserts or fully replaces the record's row.
    #[tracing::instrument(skip(self, record), fields(table = %self.table))]
    pub async fn upsert(&self, record: &R) -> TableResult<()> {
        self.ensure_table().await?;
        let row = record.to_row();
        tracing::debug!(key = %row.key, "upserting row");
        self.service.upsert(&self.table, row).await
    }

    /// Point lookup by full key.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn find(&self, partition: &str, sort: &str) -> TableResult<Option<R>> {
        self.ensure_table().await?;
        let key = RowKey::new(partition, sort);
        match self.service.get(&self.table, &key).await? {
            Some(fields) => R::from_row(Row::new(key, fields)).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the first record of a partition in sort-key order.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn first_in_partition(&self, partition: &str) -> TableResult<Option<R>> {
        self.query(Filter::new().partition_eq(partition).take(1)).try_next().await
    }

    /// Streams every record of `partition`, or of the whole table when
    /// `partition` is `None`, in key order.
    ///
    /// The stream is lazy and forward-only. Each call scans from the start.
    pub fn enumerate(&self, partition: Option<&str>) -> BoxStream<'_, TableResult<R>> {
        let filter = match partition {
            Some(p) => Filter::new().partition_eq(p),
            None => Filter::new(),
        };
        self.query(filter)
    }

    /// Streams every record matching `filter`, in key order.
    pub fn query(&self, filter: Filter) -> BoxStream<'_, TableResult<R>> {
        let service = Arc::clone(&self.service);
        let table = self.table.clone();
        stream::once(self.ensure_table())
            .map_ok(move |()| scan(service.clone(), table.clone(), filter.clone()))
            .try_flatten()
            .and_then(|row| future::ready(R::from_row(row)))
            .boxed()
    }

    /// Deletes the row at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Conflict`](idtable_storage::TableError::Conflict)
    /// when the row is already gone.
    #[tracing::instrument(skip(self, key), fields(table = %self.table, key = %key))]
    pub async fn delete(&self, key: &RowKey) -> TableResult<()> {
        self.ensure_table().await?;
        self.service.delete(&self.table, key).await
    }

    /// Asks the backing service whether it can serve requests.
    ///
    /// Does not create the table.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn health_check(&self) -> TableResult<HealthStatus> {
        self.service.health_check().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use idtable_storage::{
        MemoryTableService, TableError, assert_table_conflict,
        testutil::{Fault, FaultyTableService, Operation},
    };

    use super::*;
    use crate::records::{ApiResourceClaimRecord, ClientRedirectUriRecord};

    fn store(service: FaultyTableService) -> EntityStore<ApiResourceClaimRecord> {
        EntityStore::new(Arc::new(service), "ApiClaims")
    }

    #[tokio::test]
    async fn test_table_created_once() {
        let service = FaultyTableService::default();
        let claims = store(service.clone());

        claims.upsert(&ApiResourceClaimRecord::new("api1", "name")).await.unwrap();
        claims.upsert(&ApiResourceClaimRecord::new("api1", "email")).await.unwrap();
        let _ = claims.find("api1", "name").await.unwrap();

        assert_eq!(service.calls(Operation::CreateTable).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_creation_is_retried() {
        let service = FaultyTableService::default();
        service.inject(|call| {
            (call.op == Operation::CreateTable).then(|| Fault::Fail(TableError::timeout()))
        });
        let claims = store(service.clone());

        let first = claims.upsert(&ApiResourceClaimRecord::new("api1", "name")).await;
        assert!(matches!(first, Err(TableError::Timeout)));

        service.clear_faults();
        claims.upsert(&ApiResourceClaimRecord::new("api1", "name")).await.unwrap();
        assert_eq!(service.calls(Operation::CreateTable).len(), 2);
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let claims = store(FaultyTableService::default());
        assert!(claims.find("api1", "name").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let service = FaultyTableService::default();
        let claims = store(service.clone());
        let record = ApiResourceClaimRecord::new("api1", "name");

        claims.upsert(&record).await.unwrap();
        claims.upsert(&record).await.unwrap();

        assert_eq!(service.inner().row_count("ApiClaims"), Some(1));
        assert_eq!(claims.find("api1", "name").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_enumerate_is_partition_isolated() {
        let claims = store(FaultyTableService::default());
        for (resource, claim) in [("api1", "b"), ("api2", "a"), ("api1", "a")] {
            claims.upsert(&ApiResourceClaimRecord::new(resource, claim)).await.unwrap();
        }

        let api1: Vec<_> = claims.enumerate(Some("api1")).try_collect().await.unwrap();
        let names: Vec<_> = api1.iter().map(|r| r.claim_type.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        let all: Vec<_> = claims.enumerate(None).try_collect().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_enumerate_restarts_each_call() {
        let claims = store(FaultyTableService::new(MemoryTableService::with_page_size(1)));
        for claim in ["a", "b", "c"] {
            claims.upsert(&ApiResourceClaimRecord::new("api1", claim)).await.unwrap();
        }

        let first = claims.enumerate(Some("api1")).try_next().await.unwrap().unwrap();
        let again: Vec<_> = claims.enumerate(Some("api1")).try_collect().await.unwrap();
        assert_eq!(first.claim_type, "a");
        assert_eq!(again.len(), 3);
    }

    #[tokio::test]
    async fn test_first_in_partition() {
        let claims = store(FaultyTableService::default());
        assert!(claims.first_in_partition("api1").await.unwrap().is_none());

        claims.upsert(&ApiResourceClaimRecord::new("api1", "z")).await.unwrap();
        claims.upsert(&ApiResourceClaimRecord::new("api1", "m")).await.unwrap();

        let first = claims.first_in_partition("api1").await.unwrap().unwrap();
        assert_eq!(first.claim_type, "m");
    }

    #[tokio::test]
    async fn test_scan_error_propagates() {
        let service = FaultyTableService::default();
        let claims = store(service.clone());
        claims.upsert(&ApiResourceClaimRecord::new("api1", "name")).await.unwrap();
        service.inject(|call| {
            (call.op == Operation::Scan).then(|| Fault::Fail(TableError::connection("reset")))
        });

        let result: TableResult<Vec<_>> = claims.enumerate(Some("api1")).try_collect().await;
        assert!(matches!(result, Err(TableError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_delete_absent_is_conflict() {
        let claims = store(FaultyTableService::default());
        let result = claims.delete(&RowKey::new("api1", "name")).await;
        assert_table_conflict!(result);
    }

    #[tokio::test]
    async fn test_escaped_keys_round_trip_through_service() {
        let uris: EntityStore<ClientRedirectUriRecord> =
            EntityStore::new(Arc::new(MemoryTableService::new()), "ClientRedirectUris");
        let record = ClientRedirectUriRecord::new("client1", "https://app.example.com/signin-oidc");
        uris.upsert(&record).await.unwrap();

        let all: Vec<_> = uris.enumerate(Some("client1")).try_collect().await.unwrap();
        assert_eq!(all, vec![record]);
    }
}
