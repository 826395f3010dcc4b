//! Grant expiration and cleanup scenarios.
//!
//! Uses a [`FixedClock`] so expiration is deterministic, and a
//! [`FaultyTableService`] to simulate concurrent deletes and transport
//! failures during a drain pass.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::Duration;
use idtable_storage::{
    BoxError, MemoryTableService, TableError, TableService,
    testutil::{Fault, FaultyTableService, Operation},
};
use idtable_store::{
    CleanupHost, CleanupReport, GrantRemovalNotification, OperationalStoreOptions,
    PersistedGrantStore, TokenCleanup,
    model::PersistedGrant,
    testutil::{FixedClock, epoch, expired_grants, grant},
};
use parking_lot::Mutex;
use rstest::rstest;

fn grants_over(service: Arc<dyn TableService>, clock: &FixedClock) -> Arc<PersistedGrantStore> {
    Arc::new(
        PersistedGrantStore::with_service(service, &OperationalStoreOptions::default())
            .with_clock(Arc::new(clock.clone())),
    )
}

// ---------------------------------------------------------------------------
// Recording notification
// ---------------------------------------------------------------------------

/// Records each batch it is told about, along with how many grants were
/// still stored at that moment.
struct RecordingNotification {
    grants: Arc<PersistedGrantStore>,
    seen: Mutex<Vec<(Vec<String>, usize)>>,
    fail: bool,
}

#[async_trait]
impl GrantRemovalNotification for RecordingNotification {
    async fn grants_removed(&self, batch: &[PersistedGrant]) -> Result<(), BoxError> {
        let mut still_stored = 0;
        for grant in batch {
            if self.grants.get(&grant.key).await.map_err(|e| Arc::new(e) as BoxError)?.is_some() {
                still_stored += 1;
            }
        }
        self.seen.lock().push((batch.iter().map(|g| g.key.clone()).collect(), still_stored));
        if self.fail {
            return Err(Arc::new(std::io::Error::other("notification sink unavailable")) as BoxError);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_grant_is_drained() {
    let clock = FixedClock::new(epoch());
    let grants = grants_over(Arc::new(MemoryTableService::new()), &clock);
    let expiry = epoch() + Duration::minutes(5);
    grants.store(&grant("K", "sub1", "client1", "refresh_token", Some(expiry))).await.unwrap();

    assert!(grants.get_expired(10).await.unwrap().is_empty());

    clock.set(expiry + Duration::seconds(1));
    let expired = grants.get_expired(10).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].key, "K");

    let cleanup = TokenCleanup::new(Arc::clone(&grants), 10).unwrap();
    let report = cleanup.run_pass().await.unwrap();

    assert_eq!(report, CleanupReport { batches: 1, grants_removed: 1 });
    assert!(grants.get("K").await.unwrap().is_none());
}

#[rstest]
#[case::exactly_now(Duration::zero(), true)]
#[case::one_second_later(Duration::seconds(1), false)]
#[case::one_second_earlier(Duration::seconds(-1), true)]
#[tokio::test]
async fn expiration_boundary(#[case] offset: Duration, #[case] expired: bool) {
    let clock = FixedClock::new(epoch());
    let grants = grants_over(Arc::new(MemoryTableService::new()), &clock);
    grants.store(&grant("K", "sub1", "client1", "authorization_code", Some(epoch() + offset))).await.unwrap();

    assert_eq!(!grants.get_expired(10).await.unwrap().is_empty(), expired);
}

#[tokio::test]
async fn drain_runs_until_empty_in_batches() {
    let clock = FixedClock::new(epoch());
    let service = Arc::new(MemoryTableService::new());
    let grants = grants_over(service.clone(), &clock);
    for g in expired_grants("old", "sub1", 7, epoch()) {
        grants.store(&g).await.unwrap();
    }
    let live = grant("live", "sub1", "client1", "refresh_token", Some(epoch() + Duration::days(1)));
    grants.store(&live).await.unwrap();

    let report = TokenCleanup::new(Arc::clone(&grants), 3).unwrap().run_pass().await.unwrap();

    assert_eq!(report, CleanupReport { batches: 3, grants_removed: 7 });
    assert_eq!(service.row_count("PersistedGrants"), Some(1));
    assert_eq!(grants.get("live").await.unwrap(), Some(live));
}

#[tokio::test]
async fn concurrent_delete_is_tolerated() {
    let clock = FixedClock::new(epoch());
    let service = FaultyTableService::default();
    let grants = grants_over(Arc::new(service.clone()), &clock);
    for g in expired_grants("old", "sub1", 4, epoch()) {
        grants.store(&g).await.unwrap();
    }

    service.inject(|call| {
        let raced = call.key.as_ref().is_some_and(|k| k.partition == "old-1" || k.partition == "old-3");
        (call.op == Operation::Delete && raced).then_some(Fault::ConcurrentDelete)
    });

    let report = TokenCleanup::new(Arc::clone(&grants), 10).unwrap().run_pass().await.unwrap();

    assert_eq!(report, CleanupReport { batches: 1, grants_removed: 2 });
    assert!(grants.get_expired(10).await.unwrap().is_empty());
    assert_eq!(service.inner().row_count("PersistedGrants"), Some(0));
}

#[tokio::test]
async fn transport_failure_aborts_pass() {
    let clock = FixedClock::new(epoch());
    let service = FaultyTableService::default();
    let grants = grants_over(Arc::new(service.clone()), &clock);
    for g in expired_grants("old", "sub1", 3, epoch()) {
        grants.store(&g).await.unwrap();
    }

    service.inject(|call| {
        let failing = call.key.as_ref().is_some_and(|k| k.partition == "old-1");
        (call.op == Operation::Delete && failing).then(|| Fault::Fail(TableError::connection("reset")))
    });

    let err = TokenCleanup::new(Arc::clone(&grants), 10).unwrap().run_pass().await.unwrap_err();
    assert!(matches!(err, TableError::Connection { .. }));

    // old-0 was deleted before the failure; old-1 and old-2 remain.
    assert_eq!(service.inner().row_count("PersistedGrants"), Some(2));
    assert_eq!(service.calls(Operation::Delete).len(), 2);

    service.clear_faults();
    let report = TokenCleanup::new(Arc::clone(&grants), 10).unwrap().run_pass().await.unwrap();
    assert_eq!(report.grants_removed, 2);
}

#[tokio::test]
async fn notification_sees_batch_before_deletes() {
    let clock = FixedClock::new(epoch());
    let grants = grants_over(Arc::new(MemoryTableService::new()), &clock);
    for g in expired_grants("old", "sub1", 3, epoch()) {
        grants.store(&g).await.unwrap();
    }

    let notification = Arc::new(RecordingNotification {
        grants: Arc::clone(&grants),
        seen: Mutex::new(Vec::new()),
        fail: false,
    });
    let cleanup = TokenCleanup::new(Arc::clone(&grants), 2)
        .unwrap()
        .with_notification(notification.clone());

    let report = cleanup.run_pass().await.unwrap();

    assert_eq!(report, CleanupReport { batches: 2, grants_removed: 3 });
    let seen = notification.seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (vec!["old-0".to_owned(), "old-1".to_owned()], 2));
    assert_eq!(seen[1], (vec!["old-2".to_owned()], 1));
}

#[tokio::test]
async fn failing_notification_does_not_block_deletes() {
    let clock = FixedClock::new(epoch());
    let grants = grants_over(Arc::new(MemoryTableService::new()), &clock);
    for g in expired_grants("old", "sub1", 2, epoch()) {
        grants.store(&g).await.unwrap();
    }

    let notification = Arc::new(RecordingNotification {
        grants: Arc::clone(&grants),
        seen: Mutex::new(Vec::new()),
        fail: true,
    });
    let cleanup =
        TokenCleanup::new(Arc::clone(&grants), 10).unwrap().with_notification(notification.clone());

    let report = cleanup.run_pass().await.unwrap();

    assert_eq!(report.grants_removed, 2);
    assert_eq!(notification.seen.lock().len(), 1);
}

#[tokio::test]
async fn grants_partitioned_by_key_and_subject() {
    let clock = FixedClock::new(epoch());
    let grants = grants_over(Arc::new(MemoryTableService::new()), &clock);
    grants.store(&grant("a/b+c==", "alice", "client1", "refresh_token", None)).await.unwrap();
    grants.store(&grant("a/b+c", "bob", "client1", "refresh_token", None)).await.unwrap();

    assert_eq!(grants.get("a/b+c==").await.unwrap().unwrap().subject_id, "alice");
    assert_eq!(grants.get("a/b+c").await.unwrap().unwrap().subject_id, "bob");
    assert_eq!(grants.get_all("alice").await.unwrap().len(), 1);

    assert_eq!(grants.remove_all("alice", Some("client1"), None).await.unwrap(), 1);
    assert!(grants.get("a/b+c").await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Periodic host
// ---------------------------------------------------------------------------

#[tokio::test]
async fn host_drains_on_interval() {
    let clock = FixedClock::new(epoch());
    let service = Arc::new(MemoryTableService::new());
    let grants = grants_over(service.clone(), &clock);
    for g in expired_grants("old", "sub1", 3, epoch()) {
        grants.store(&g).await.unwrap();
    }

    let cleanup = Arc::new(TokenCleanup::new(Arc::clone(&grants), 10).unwrap());
    let host = CleanupHost::spawn(cleanup, StdDuration::from_millis(20)).unwrap();

    tokio::time::sleep(StdDuration::from_millis(200)).await;
    assert_eq!(service.row_count("PersistedGrants"), Some(0));
    assert!(!host.is_finished());

    host.shutdown();
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(host.is_finished());
}

#[tokio::test]
async fn host_survives_failed_pass() {
    let clock = FixedClock::new(epoch());
    let service = FaultyTableService::default();
    let grants = grants_over(Arc::new(service.clone()), &clock);
    grants.store(&grant("K", "sub1", "client1", "refresh_token", Some(epoch()))).await.unwrap();

    service.inject(|call| (call.op == Operation::Scan).then(|| Fault::Fail(TableError::timeout())));
    let cleanup = Arc::new(TokenCleanup::new(Arc::clone(&grants), 10).unwrap());
    let host = CleanupHost::spawn(cleanup, StdDuration::from_millis(20)).unwrap();

    tokio::time::sleep(StdDuration::from_millis(100)).await;
    assert!(!host.is_finished());
    assert!(service.calls(Operation::Scan).len() >= 2);

    service.clear_faults();
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    assert_eq!(service.inner().row_count("PersistedGrants"), Some(0));

    drop(host);
    tokio::time::sleep(StdDuration::from_millis(40)).await;
    let scans_after_drop = service.calls(Operation::Scan).len();
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    assert_eq!(service.calls(Operation::Scan).len(), scans_after_drop, "no pass after drop");
}

#[tokio::test]
async fn host_from_options_respects_enable_flag() {
    let clock = FixedClock::default();
    let grants = grants_over(Arc::new(MemoryTableService::new()), &clock);
    let cleanup = Arc::new(TokenCleanup::new(Arc::clone(&grants), 10).unwrap());

    let options = OperationalStoreOptions::builder()
        .enable_token_cleanup(true)
        .token_cleanup_interval(StdDuration::from_secs(60))
        .build()
        .unwrap();
    let host = CleanupHost::from_options(Arc::clone(&cleanup), &options)
        .unwrap()
        .expect("cleanup enabled");
    assert_eq!(host.interval(), StdDuration::from_secs(60));

    assert!(CleanupHost::from_options(cleanup, &OperationalStoreOptions::default()).unwrap().is_none());
}
