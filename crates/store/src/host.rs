//! Background task that runs [`TokenCleanup`] on a fixed interval.

use std::{sync::Arc, time::Duration};

use idtable_storage::ConfigError;
use tokio::{select, sync::watch, task::JoinHandle, time::sleep};

use crate::{cleanup::TokenCleanup, config::OperationalStoreOptions};

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the cleanup task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Handle to a running cleanup task.
///
/// The task sleeps for the interval, runs one pass, and repeats. A failed
/// pass is logged and the task waits for the next interval.
///
/// # Shutdown
///
/// The task stops when the handle is dropped or
/// [`shutdown`](Self::shutdown) is called. A pass already in progress is
/// abandoned at its next await point.
pub struct CleanupHost {
    shutdown_guard: ShutdownGuard,
    task: JoinHandle<()>,
    interval: Duration,
}

impl std::fmt::Debug for CleanupHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupHost")
            .field("interval", &self.interval)
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl CleanupHost {
    /// Spawns the cleanup task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `interval` is zero.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn(cleanup: Arc<TokenCleanup>, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "token_cleanup_interval",
                reason: "must be greater than zero".to_owned(),
            });
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let task = tokio::spawn(run(cleanup, interval, shutdown_rx));
        tracing::info!(interval = ?interval, "token cleanup started");
        Ok(Self { shutdown_guard: ShutdownGuard { shutdown_tx }, task, interval })
    }

    /// Spawns the task when `options` enable token cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when cleanup is enabled with a
    /// zero interval.
    pub fn from_options(
        cleanup: Arc<TokenCleanup>,
        options: &OperationalStoreOptions,
    ) -> Result<Option<Self>, ConfigError> {
        if !options.enable_token_cleanup {
            tracing::debug!("token cleanup disabled");
            return Ok(None);
        }
        Self::spawn(cleanup, options.token_cleanup_interval).map(Some)
    }

    /// Returns the interval between passes.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the task to stop. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }
}

async fn run(cleanup: Arc<TokenCleanup>, interval: Duration, mut shutdown_rx: watch::Receiver<()>) {
    loop {
        select! {
            _ = sleep(interval) => {}
            _ = shutdown_rx.changed() => {
                tracing::info!("token cleanup stopped");
                return;
            }
        }

        select! {
            result = cleanup.run_pass() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "token cleanup pass failed");
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::info!("token cleanup stopped during pass");
                return;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use idtable_storage::{
        MemoryTableService,
        testutil::{FaultyTableService, Operation},
    };

    use super::*;
    use crate::grants::PersistedGrantStore;

    fn cleanup_over(service: FaultyTableService) -> Arc<TokenCleanup> {
        let grants = Arc::new(PersistedGrantStore::with_service(
            Arc::new(service),
            &OperationalStoreOptions::default(),
        ));
        Arc::new(TokenCleanup::new(grants, 10).unwrap())
    }

    fn cleanup() -> Arc<TokenCleanup> {
        let grants = Arc::new(PersistedGrantStore::with_service(
            Arc::new(MemoryTableService::new()),
            &OperationalStoreOptions::default(),
        ));
        Arc::new(TokenCleanup::new(grants, 10).unwrap())
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let err = CleanupHost::spawn(cleanup(), Duration::ZERO).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "token_cleanup_interval", .. }));
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let host = CleanupHost::spawn(cleanup(), Duration::from_millis(20)).unwrap();
        host.shutdown();
        sleep(Duration::from_millis(50)).await;
        assert!(host.is_finished());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let host = CleanupHost::spawn(cleanup(), Duration::from_secs(3600)).unwrap();
        host.shutdown();
        host.shutdown();
        sleep(Duration::from_millis(50)).await;
        assert!(host.is_finished());
    }

    #[tokio::test]
    async fn test_drop_stops_task() {
        let service = FaultyTableService::default();
        let cleanup = cleanup_over(service.clone());
        let task_cleanup = Arc::downgrade(&cleanup);
        let host = CleanupHost::spawn(cleanup, Duration::from_millis(10)).unwrap();

        sleep(Duration::from_millis(60)).await;
        assert!(!service.calls(Operation::Scan).is_empty(), "passes run while the handle lives");

        drop(host);
        sleep(Duration::from_millis(30)).await;
        let scans_after_drop = service.calls(Operation::Scan).len();

        // The task owned the only strong reference; it is gone once the task exits.
        assert!(task_cleanup.upgrade().is_none());
        sleep(Duration::from_millis(60)).await;
        assert_eq!(service.calls(Operation::Scan).len(), scans_after_drop);
    }

    #[tokio::test]
    async fn test_disabled_options_spawn_nothing() {
        let options = OperationalStoreOptions::default();
        assert!(!options.enable_token_cleanup);
        assert!(CleanupHost::from_options(cleanup(), &options).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enabled_options_with_zero_interval_rejected() {
        let options = OperationalStoreOptions {
            enable_token_cleanup: true,
            token_cleanup_interval: Duration::ZERO,
            ..OperationalStoreOptions::default()
        };
        assert!(CleanupHost::from_options(cleanup(), &options).is_err());
    }
}
