//! Removal of expired grants in bounded batches.

use std::sync::Arc;

use async_trait::async_trait;
use idtable_storage::{BoxError, ConfigError, TableResult};

use crate::{config::OperationalStoreOptions, grants::PersistedGrantStore, model::PersistedGrant};

/// Hook told about each batch of expired grants before they are deleted.
///
/// A failing hook is logged and does not stop the deletes.
#[async_trait]
pub trait GrantRemovalNotification: Send + Sync {
    /// Called with the batch about to be removed.
    async fn grants_removed(&self, grants: &[PersistedGrant]) -> Result<(), BoxError>;
}

/// What one cleanup pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Non-empty batches processed.
    pub batches: usize,
    /// Grants removed by this pass. Grants that were already gone when
    /// their delete ran are not counted.
    pub grants_removed: usize,
}

/// Drains expired grants batch by batch until none remain.
pub struct TokenCleanup {
    grants: Arc<PersistedGrantStore>,
    batch_size: usize,
    notification: Option<Arc<dyn GrantRemovalNotification>>,
}

impl std::fmt::Debug for TokenCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCleanup")
            .field("batch_size", &self.batch_size)
            .field("notification", &self.notification.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenCleanup {
    /// Creates a cleanup over `grants` removing up to `batch_size` grants per
    /// batch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `batch_size` is zero.
    pub fn new(grants: Arc<PersistedGrantStore>, batch_size: usize) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "token_cleanup_batch_size",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(Self { grants, batch_size, notification: None })
    }

    /// Creates a cleanup using the batch size from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the configured batch size
    /// is zero.
    pub fn from_options(
        grants: Arc<PersistedGrantStore>,
        options: &OperationalStoreOptions,
    ) -> Result<Self, ConfigError> {
        Self::new(grants, options.token_cleanup_batch_size)
    }

    /// Installs a hook called before each batch is deleted.
    #[must_use]
    pub fn with_notification(mut self, notification: Arc<dyn GrantRemovalNotification>) -> Self {
        self.notification = Some(notification);
        self
    }

    /// Returns the configured batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs one pass: fetch a batch of expired grants, notify, delete each,
    /// and repeat until a fetch comes back empty.
    ///
    /// A grant deleted concurrently by someone else is skipped. Any other
    /// storage error ends the pass; grants already removed stay removed.
    #[tracing::instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn run_pass(&self) -> TableResult<CleanupReport> {
        let mut report = CleanupReport::default();
        loop {
            let expired = self.grants.get_expired(self.batch_size).await?;
            if expired.is_empty() {
                break;
            }
            tracing::info!(count = expired.len(), "removing expired grants");
            report.batches += 1;

            if let Some(notification) = &self.notification {
                if let Err(e) = notification.grants_removed(&expired).await {
                    tracing::warn!(error = %e, "grant removal notification failed");
                }
            }

            for grant in &expired {
                match self.grants.delete(grant).await {
                    Ok(()) => report.grants_removed += 1,
                    Err(e) if e.is_conflict() => {
                        tracing::debug!(error = %e, "expired grant already removed");
                    },
                    Err(e) => return Err(e),
                }
            }
        }
        tracing::debug!(
            batches = report.batches,
            removed = report.grants_removed,
            "cleanup pass finished"
        );
        Ok(report)
    }
}
