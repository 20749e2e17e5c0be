use std::sync::Arc;
use std::time::Duration;

use keeper_core::AppError;
use keeper_domain::LockId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::singleton_ports::LeaseOutcome;
use crate::test_support::FakeLeaseStore;

use super::{AcquisitionWait, LockManager, LockManagerOptions, LockRequest};

fn lock_id(value: &str) -> LockId {
    match LockId::new(value) {
        Ok(lock_id) => lock_id,
        Err(error) => panic!("lock id should be valid: {error}"),
    }
}

fn manager(store: Arc<FakeLeaseStore>) -> LockManager {
    LockManager::new(store, LockManagerOptions::default())
}

#[tokio::test(start_paused = true)]
async fn concurrent_acquirers_without_wait_yield_single_holder() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store);
    let lock_id = lock_id("Jobs.Reports.Nightly");

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let manager = manager.clone();
        let lock_id = lock_id.clone();
        tasks.push(tokio::spawn(async move {
            manager
                .try_acquire(&lock_id, LockRequest::default(), &CancellationToken::new())
                .await
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        match task.await {
            Ok(Ok(Some(handle))) => handles.push(handle),
            Ok(Ok(None)) => {}
            Ok(Err(error)) => panic!("acquisition should not fail: {error}"),
            Err(error) => panic!("acquisition task panicked: {error}"),
        }
    }

    assert_eq!(handles.len(), 1);
    for mut handle in handles {
        assert!(manager.release(&mut handle).await.is_ok());
    }
}

#[tokio::test(start_paused = true)]
async fn acquire_release_acquire_reuses_lock() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store);
    let lock_id = lock_id("Jobs.Reports.Nightly");
    let cancel = CancellationToken::new();

    let mut first = match manager.acquire(&lock_id, LockRequest::default(), &cancel).await {
        Ok(handle) => handle,
        Err(error) => panic!("first acquisition should succeed: {error}"),
    };
    let contended = manager
        .try_acquire(&lock_id, LockRequest::default(), &cancel)
        .await;
    assert!(matches!(contended, Ok(None)));

    assert!(manager.release(&mut first).await.is_ok());

    let second = manager
        .try_acquire(&lock_id, LockRequest::default(), &cancel)
        .await;
    assert!(matches!(second, Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn acquire_reports_conflict_when_lock_is_held() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store);
    let lock_id = lock_id("Jobs.Reports.Nightly");
    let cancel = CancellationToken::new();

    let _held = manager.acquire(&lock_id, LockRequest::default(), &cancel).await;
    let result = manager
        .acquire(&lock_id, LockRequest::default(), &cancel)
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test(start_paused = true)]
async fn bounded_wait_shorter_than_competitor_hold_returns_none() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store);
    let lock_id = lock_id("Jobs.Reports.Nightly");
    let cancel = CancellationToken::new();

    let mut held = match manager.acquire(&lock_id, LockRequest::default(), &cancel).await {
        Ok(handle) => handle,
        Err(error) => panic!("acquisition should succeed: {error}"),
    };

    let releaser = {
        let manager = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            manager.release(&mut held).await
        })
    };

    let started_at = Instant::now();
    let short = manager
        .try_acquire(
            &lock_id,
            LockRequest::default().with_wait(AcquisitionWait::Bounded(Duration::from_secs(1))),
            &cancel,
        )
        .await;
    assert!(matches!(short, Ok(None)));
    assert!(started_at.elapsed() >= Duration::from_secs(1));

    let long = manager
        .try_acquire(
            &lock_id,
            LockRequest::default().with_wait(AcquisitionWait::Bounded(Duration::from_secs(10))),
            &cancel,
        )
        .await;
    assert!(matches!(long, Ok(Some(_))));
    assert!(started_at.elapsed() >= Duration::from_secs(3));
    assert!(matches!(releaser.await, Ok(Ok(()))));
}

#[tokio::test(start_paused = true)]
async fn scope_suffixes_do_not_block_each_other() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store);
    let cancel = CancellationToken::new();

    let west = manager
        .try_acquire(
            &lock_id("Jobs.Orders.Process.west"),
            LockRequest::default(),
            &cancel,
        )
        .await;
    let east = manager
        .try_acquire(
            &lock_id("Jobs.Orders.Process.east"),
            LockRequest::default(),
            &cancel,
        )
        .await;

    assert!(matches!(west, Ok(Some(_))));
    assert!(matches!(east, Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn double_release_makes_single_remote_call() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store.clone());
    let lock_id = lock_id("Jobs.Reports.Nightly");

    let mut handle = match manager
        .acquire(&lock_id, LockRequest::default(), &CancellationToken::new())
        .await
    {
        Ok(handle) => handle,
        Err(error) => panic!("acquisition should succeed: {error}"),
    };

    assert!(manager.release(&mut handle).await.is_ok());
    assert!(manager.release(&mut handle).await.is_ok());
    assert!(handle.is_released());
    assert_eq!(FakeLeaseStore::count(&store.releases), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_namespace_is_created_once() {
    let store = FakeLeaseStore::without_namespace();
    let manager = manager(store.clone());

    let handle = manager
        .try_acquire(
            &lock_id("Jobs.Reports.Nightly"),
            LockRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(handle, Ok(Some(_))));
    assert_eq!(FakeLeaseStore::count(&store.namespace_creations), 1);
}

#[tokio::test(start_paused = true)]
async fn release_tolerates_deleted_object_and_lease_mismatch() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store.clone());
    let cancel = CancellationToken::new();

    let deleted_id = lock_id("Jobs.Reports.Deleted");
    let mut deleted = match manager.acquire(&deleted_id, LockRequest::default(), &cancel).await {
        Ok(handle) => handle,
        Err(error) => panic!("acquisition should succeed: {error}"),
    };
    store.delete_object(&deleted_id).await;
    assert!(manager.release(&mut deleted).await.is_ok());

    let mut mismatched = match manager
        .acquire(
            &lock_id("Jobs.Reports.Mismatch"),
            LockRequest::default(),
            &cancel,
        )
        .await
    {
        Ok(handle) => handle,
        Err(error) => panic!("acquisition should succeed: {error}"),
    };
    store
        .override_release(LeaseOutcome::PreconditionFailed)
        .await;
    assert!(manager.release(&mut mismatched).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn release_propagates_fatal_store_outcome() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store.clone());

    let mut handle = match manager
        .acquire(
            &lock_id("Jobs.Reports.Nightly"),
            LockRequest::default(),
            &CancellationToken::new(),
        )
        .await
    {
        Ok(handle) => handle,
        Err(error) => panic!("acquisition should succeed: {error}"),
    };
    store
        .override_release(LeaseOutcome::Fatal("storage account unavailable".to_owned()))
        .await;

    let result = manager.release(&mut handle).await;
    assert!(matches!(result, Err(AppError::Internal(_))));
}

#[tokio::test(start_paused = true)]
async fn renewal_keeps_lease_alive_past_original_expiry() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store.clone());
    let lock_id = lock_id("Jobs.Reports.Nightly");
    let cancel = CancellationToken::new();
    let request = LockRequest::default().with_lease_period(Duration::from_secs(2));

    let mut handle = match manager.acquire(&lock_id, request, &cancel).await {
        Ok(handle) => handle,
        Err(error) => panic!("acquisition should succeed: {error}"),
    };

    tokio::time::sleep(Duration::from_secs(10)).await;

    let competitor = manager.try_acquire(&lock_id, request, &cancel).await;
    assert!(matches!(competitor, Ok(None)));
    assert!(FakeLeaseStore::count(&store.renewals) >= 9);
    assert!(manager.release(&mut handle).await.is_ok());

    let renewals_at_release = FakeLeaseStore::count(&store.renewals);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(FakeLeaseStore::count(&store.renewals), renewals_at_release);
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_lets_lease_lapse() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store);
    let lock_id = lock_id("Jobs.Reports.Nightly");
    let cancel = CancellationToken::new();
    let request = LockRequest::default().with_lease_period(Duration::from_secs(2));

    let handle = manager.acquire(&lock_id, request, &cancel).await;
    assert!(handle.is_ok());
    drop(handle);

    tokio::time::sleep(Duration::from_secs(3)).await;

    let next = manager.try_acquire(&lock_id, request, &cancel).await;
    assert!(matches!(next, Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn cancelling_unbounded_wait_reports_cancellation() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store);
    let lock_id = lock_id("Jobs.Reports.Nightly");

    let _held = manager
        .acquire(&lock_id, LockRequest::default(), &CancellationToken::new())
        .await;

    let cancel = CancellationToken::new();
    let waiter = {
        let manager = manager.clone();
        let lock_id = lock_id.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            manager
                .try_acquire(
                    &lock_id,
                    LockRequest::default().with_wait(AcquisitionWait::Unbounded),
                    &cancel,
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!waiter.is_finished());

    cancel.cancel();
    let result = waiter.await;
    assert!(matches!(result, Ok(Err(AppError::Cancelled(_)))));
}

#[tokio::test(start_paused = true)]
async fn vanished_lock_object_counts_as_contention() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store.clone());
    let lock_id = lock_id("Jobs.Reports.Nightly");
    let cancel = CancellationToken::new();

    store.override_acquire(LeaseOutcome::NotFound).await;
    let immediate = manager
        .try_acquire(&lock_id, LockRequest::default(), &cancel)
        .await;
    assert!(matches!(immediate, Ok(None)));

    store.override_acquire(LeaseOutcome::NotFound).await;
    let waiting = manager
        .try_acquire(
            &lock_id,
            LockRequest::default().with_wait(AcquisitionWait::Bounded(Duration::from_secs(2))),
            &cancel,
        )
        .await;
    assert!(matches!(waiting, Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn fatal_acquire_outcome_is_internal_error() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store.clone());

    store
        .override_acquire(LeaseOutcome::Fatal("throttled".to_owned()))
        .await;
    let result = manager
        .try_acquire(
            &lock_id("Jobs.Reports.Nightly"),
            LockRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
}

#[tokio::test(start_paused = true)]
async fn leased_object_precondition_failure_still_allows_acquire() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store.clone());
    let lock_id = lock_id("Jobs.Reports.Nightly");
    let cancel = CancellationToken::new();

    let mut first = match manager.acquire(&lock_id, LockRequest::default(), &cancel).await {
        Ok(handle) => handle,
        Err(error) => panic!("acquisition should succeed: {error}"),
    };
    assert!(manager.release(&mut first).await.is_ok());

    store.override_create(LeaseOutcome::PreconditionFailed).await;
    let second = manager
        .try_acquire(&lock_id, LockRequest::default(), &cancel)
        .await;
    assert!(matches!(second, Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn fatal_create_outcome_is_internal_error() {
    let store = FakeLeaseStore::with_namespace();
    let manager = manager(store.clone());

    store
        .override_create(LeaseOutcome::Fatal("forbidden".to_owned()))
        .await;
    let result = manager
        .try_acquire(
            &lock_id("Jobs.Reports.Nightly"),
            LockRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
}

#[tokio::test(start_paused = true)]
async fn namespace_creation_failure_is_propagated() {
    let store = FakeLeaseStore::without_namespace();
    let manager = manager(store.clone());

    store
        .override_namespace(LeaseOutcome::Fatal("quota exceeded".to_owned()))
        .await;
    let result = manager
        .try_acquire(
            &lock_id("Jobs.Reports.Nightly"),
            LockRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    assert_eq!(FakeLeaseStore::count(&store.namespace_creations), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_renewals_are_logged_not_surfaced() {
    for outcome in [
        LeaseOutcome::PreconditionFailed,
        LeaseOutcome::Fatal("connection reset".to_owned()),
    ] {
        let store = FakeLeaseStore::with_namespace();
        let manager = manager(store.clone());
        let request = LockRequest::default().with_lease_period(Duration::from_secs(2));

        let mut handle = match manager
            .acquire(&lock_id("Jobs.Reports.Nightly"), request, &CancellationToken::new())
            .await
        {
            Ok(handle) => handle,
            Err(error) => panic!("acquisition should succeed: {error}"),
        };
        store.override_renew(outcome).await;

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(FakeLeaseStore::count(&store.renewals) >= 3);
        assert!(!handle.is_released());
        assert!(manager.release(&mut handle).await.is_ok());
        assert!(handle.is_released());
    }
}

#[test]
fn options_reject_zero_intervals() {
    assert!(LockManagerOptions::new(Duration::ZERO, Duration::from_millis(500)).is_err());
    assert!(LockManagerOptions::new(Duration::from_secs(15), Duration::ZERO).is_err());
    assert!(LockManagerOptions::new(Duration::from_secs(15), Duration::from_millis(500)).is_ok());
}
