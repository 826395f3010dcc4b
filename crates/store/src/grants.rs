//! Persisted grant storage.
//!
//! Grants live in one table keyed by `(escaped grant key, subject id)`.
//! There is no storage-level expiry: expired grants stay readable until the
//! cleanup loop removes them.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use idtable_storage::{
    ConfigError, Filter, HealthStatus, RowKey, TableConnector, TableResult, TableService,
};

use crate::{
    config::OperationalStoreOptions,
    entity_store::EntityStore,
    keys::encode_key_part,
    model::PersistedGrant,
    record::TableRecord,
    records::PersistedGrantRecord,
};

/// Source of the current time for expiration checks.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl From<&PersistedGrant> for PersistedGrantRecord {
    fn from(grant: &PersistedGrant) -> Self {
        Self {
            key: grant.key.clone(),
            subject_id: grant.subject_id.clone(),
            grant_type: grant.grant_type.clone(),
            client_id: grant.client_id.clone(),
            creation_time: grant.creation_time,
            expiration: grant.expiration,
            data: grant.data.clone(),
        }
    }
}

impl From<PersistedGrantRecord> for PersistedGrant {
    fn from(record: PersistedGrantRecord) -> Self {
        Self {
            key: record.key,
            grant_type: record.grant_type,
            subject_id: record.subject_id,
            client_id: record.client_id,
            creation_time: record.creation_time,
            expiration: record.expiration,
            data: record.data,
        }
    }
}

/// Stores, queries and removes grants.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use idtable_storage::MemoryTableService;
/// use idtable_store::{config::OperationalStoreOptions, grants::PersistedGrantStore, model::PersistedGrant};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let grants = PersistedGrantStore::with_service(
///     Arc::new(MemoryTableService::new()),
///     &OperationalStoreOptions::default(),
/// );
///
/// let grant = PersistedGrant::builder()
///     .key("h/8dF+x==")
///     .grant_type("refresh_token")
///     .subject_id("alice")
///     .client_id("client1")
///     .data("{}")
///     .build();
/// grants.store(&grant).await.unwrap();
///
/// assert_eq!(grants.get("h/8dF+x==").await.unwrap(), Some(grant));
/// # });
/// ```
#[derive(Debug)]
pub struct PersistedGrantStore {
    grants: EntityStore<PersistedGrantRecord>,
    clock: Arc<dyn Clock>,
}

impl PersistedGrantStore {
    /// Opens the grant table through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the options are invalid or the connection
    /// cannot be resolved.
    pub fn from_options(
        options: &OperationalStoreOptions,
        connector: &dyn TableConnector,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let grants = options.persisted_grants.open(options.connection.as_deref(), connector)?;
        Ok(Self { grants, clock: Arc::new(SystemClock) })
    }

    /// Uses `service` for the grant table.
    pub fn with_service(service: Arc<dyn TableService>, options: &OperationalStoreOptions) -> Self {
        Self { grants: options.persisted_grants.bind(&service), clock: Arc::new(SystemClock) }
    }

    /// Replaces the clock used by [`get_expired`](Self::get_expired).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Inserts or replaces a grant.
    #[tracing::instrument(skip(self, grant), fields(grant_type = %grant.grant_type, client_id = %grant.client_id))]
    pub async fn store(&self, grant: &PersistedGrant) -> TableResult<()> {
        self.grants.upsert(&PersistedGrantRecord::from(grant)).await?;
        tracing::debug!("stored persisted grant");
        Ok(())
    }

    /// Returns the grant stored under `key`.
    ///
    /// Grant keys are unique, so the first row of the key's partition is
    /// the grant.
    #[tracing::instrument(skip(self, key))]
    pub async fn get(&self, key: &str) -> TableResult<Option<PersistedGrant>> {
        let record = self.grants.first_in_partition(&encode_key_part(key)).await?;
        tracing::debug!(found = record.is_some(), "persisted grant lookup");
        Ok(record.map(PersistedGrant::from))
    }

    /// Returns every grant of `subject_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_all(&self, subject_id: &str) -> TableResult<Vec<PersistedGrant>> {
        let grants = self.matching(subject_id, None, None).await?;
        tracing::debug!(count = grants.len(), "persisted grants found for subject");
        Ok(grants.into_iter().map(PersistedGrant::from).collect())
    }

    /// Removes the grant stored under `key`; does nothing when absent.
    #[tracing::instrument(skip(self, key))]
    pub async fn remove(&self, key: &str) -> TableResult<()> {
        match self.grants.first_in_partition(&encode_key_part(key)).await? {
            Some(record) => {
                self.grants.delete(&record.key()).await?;
                tracing::debug!("removed persisted grant");
            },
            None => tracing::debug!("no persisted grant found to remove"),
        }
        Ok(())
    }

    /// Removes every grant of `subject_id`, optionally narrowed to one
    /// client and one grant type. Returns the number removed.
    ///
    /// Matches are collected first, then deleted one at a time. A failure
    /// stops the removal and leaves earlier deletes in place.
    #[tracing::instrument(skip(self))]
    pub async fn remove_all(
        &self,
        subject_id: &str,
        client_id: Option<&str>,
        grant_type: Option<&str>,
    ) -> TableResult<usize> {
        let matches = self.matching(subject_id, client_id, grant_type).await?;
        tracing::debug!(count = matches.len(), "removing persisted grants");
        for record in &matches {
            self.grants.delete(&record.key()).await?;
        }
        Ok(matches.len())
    }

    /// Returns up to `batch_size` grants whose expiration is at or before
    /// now. Grants without an expiration never match.
    #[tracing::instrument(skip(self))]
    pub async fn get_expired(&self, batch_size: usize) -> TableResult<Vec<PersistedGrant>> {
        let now = self.clock.now();
        let filter = Filter::new().field_le("Expiration", now).take(batch_size);
        self.grants.query(filter).map_ok(PersistedGrant::from).try_collect().await
    }

    /// Deletes exactly this grant.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Conflict`](idtable_storage::TableError::Conflict)
    /// when the grant is already gone.
    pub async fn delete(&self, grant: &PersistedGrant) -> TableResult<()> {
        self.grants.delete(&RowKey::new(encode_key_part(&grant.key), &grant.subject_id)).await
    }

    /// Health of the service holding the grant table.
    pub async fn health_check(&self) -> TableResult<HealthStatus> {
        self.grants.health_check().await
    }

    async fn matching(
        &self,
        subject_id: &str,
        client_id: Option<&str>,
        grant_type: Option<&str>,
    ) -> TableResult<Vec<PersistedGrantRecord>> {
        let mut filter = Filter::new().sort_eq(subject_id);
        if let Some(client_id) = client_id {
            filter = filter.field_eq("ClientId", client_id);
        }
        if let Some(grant_type) = grant_type {
            filter = filter.field_eq("Type", grant_type);
        }
        self.grants.query(filter).try_collect().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use idtable_storage::MemoryTableService;

    use super::*;

    #[derive(Debug)]
    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 8, 15, 12, 0, 0).unwrap()
    }

    fn store() -> PersistedGrantStore {
        PersistedGrantStore::with_service(
            Arc::new(MemoryTableService::new()),
            &OperationalStoreOptions::default(),
        )
        .with_clock(Arc::new(FixedClock(now())))
    }

    fn grant(key: &str, subject: &str, client: &str, grant_type: &str) -> PersistedGrant {
        PersistedGrant::builder()
            .key(key)
            .grant_type(grant_type)
            .subject_id(subject)
            .client_id(client)
            .creation_time(now() - Duration::hours(1))
            .data("{}")
            .build()
    }

    #[tokio::test]
    async fn test_health_check_reports_without_creating_table() {
        let service = Arc::new(MemoryTableService::new());
        let grants = PersistedGrantStore::with_service(
            Arc::clone(&service) as Arc<dyn TableService>,
            &OperationalStoreOptions::default(),
        );

        assert!(grants.health_check().await.unwrap().is_healthy());
        assert!(!service.has_table("PersistedGrants"));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        assert!(store().get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_is_upsert() {
        let grants = store();
        let mut g = grant("k1", "alice", "c1", "refresh_token");
        grants.store(&g).await.unwrap();
        g.data = "{\"v\":2}".to_owned();
        grants.store(&g).await.unwrap();

        assert_eq!(grants.get("k1").await.unwrap().unwrap().data, "{\"v\":2}");
        assert_eq!(grants.get_all("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_all_filters_conjunctively() {
        let grants = store();
        grants.store(&grant("k1", "alice", "c1", "refresh_token")).await.unwrap();
        grants.store(&grant("k2", "alice", "c1", "reference_token")).await.unwrap();
        grants.store(&grant("k3", "alice", "c2", "refresh_token")).await.unwrap();
        grants.store(&grant("k4", "bob", "c1", "refresh_token")).await.unwrap();

        let removed = grants.remove_all("alice", Some("c1"), Some("refresh_token")).await.unwrap();
        assert_eq!(removed, 1);
        assert!(grants.get("k1").await.unwrap().is_none());

        let removed = grants.remove_all("alice", Some("c1"), None).await.unwrap();
        assert_eq!(removed, 1);

        let removed = grants.remove_all("alice", None, None).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(grants.get_all("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let grants = store();
        grants.remove("nope").await.unwrap();
        grants.store(&grant("k1", "alice", "c1", "refresh_token")).await.unwrap();
        grants.remove("k1").await.unwrap();
        assert!(grants.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiration_boundary() {
        let grants = store();
        let mut at_now = grant("at-now", "alice", "c1", "authorization_code");
        at_now.expiration = Some(now());
        let mut later = grant("later", "alice", "c1", "authorization_code");
        later.expiration = Some(now() + Duration::seconds(1));
        let never = grant("never", "alice", "c1", "user_consent");
        for g in [&at_now, &later, &never] {
            grants.store(g).await.unwrap();
        }

        let expired = grants.get_expired(10).await.unwrap();
        assert_eq!(expired, vec![at_now]);
    }

    #[tokio::test]
    async fn test_get_expired_respects_batch_size() {
        let grants = store();
        for i in 0..5 {
            let mut g = grant(&format!("k{i}"), "alice", "c1", "authorization_code");
            g.expiration = Some(now() - Duration::minutes(i));
            grants.store(&g).await.unwrap();
        }
        assert_eq!(grants.get_expired(2).await.unwrap().len(), 2);
    }
}
