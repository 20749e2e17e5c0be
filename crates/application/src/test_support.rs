use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keeper_core::AppResult;
use keeper_domain::LockId;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::singleton_ports::{LeaseOutcome, LeaseStore, LeaseToken, Listener};

#[derive(Debug, Clone)]
struct ActiveLease {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
struct FakeState {
    namespace_exists: bool,
    objects: HashMap<String, Option<ActiveLease>>,
    issued: usize,
}

/// Lease store fake with tokio-clock expiry and call counters.
#[derive(Default)]
pub(crate) struct FakeLeaseStore {
    state: Mutex<FakeState>,
    pub(crate) namespace_creations: AtomicUsize,
    pub(crate) renewals: AtomicUsize,
    pub(crate) releases: AtomicUsize,
    create_override: Mutex<Option<LeaseOutcome>>,
    namespace_override: Mutex<Option<LeaseOutcome>>,
    acquire_override: Mutex<Option<LeaseOutcome<LeaseToken>>>,
    renew_override: Mutex<Option<LeaseOutcome>>,
    release_override: Mutex<Option<LeaseOutcome>>,
}

impl FakeLeaseStore {
    pub(crate) fn with_namespace() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                namespace_exists: true,
                ..FakeState::default()
            }),
            ..Self::default()
        })
    }

    pub(crate) fn without_namespace() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn delete_object(&self, lock_id: &LockId) {
        self.state.lock().await.objects.remove(lock_id.as_str());
    }

    /// Answers the next `create_if_absent` call with `outcome`.
    pub(crate) async fn override_create(&self, outcome: LeaseOutcome) {
        *self.create_override.lock().await = Some(outcome);
    }

    /// Answers the next `create_namespace` call with `outcome`.
    pub(crate) async fn override_namespace(&self, outcome: LeaseOutcome) {
        *self.namespace_override.lock().await = Some(outcome);
    }

    /// Answers the next `acquire_lease` call with `outcome`.
    pub(crate) async fn override_acquire(&self, outcome: LeaseOutcome<LeaseToken>) {
        *self.acquire_override.lock().await = Some(outcome);
    }

    /// Answers every later `renew_lease` call with `outcome`.
    pub(crate) async fn override_renew(&self, outcome: LeaseOutcome) {
        *self.renew_override.lock().await = Some(outcome);
    }

    /// Answers the next `release_lease` call with `outcome`.
    pub(crate) async fn override_release(&self, outcome: LeaseOutcome) {
        *self.release_override.lock().await = Some(outcome);
    }

    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeaseStore for FakeLeaseStore {
    async fn create_if_absent(&self, lock_id: &LockId) -> LeaseOutcome {
        if let Some(outcome) = self.create_override.lock().await.take() {
            return outcome;
        }

        let mut state = self.state.lock().await;
        if !state.namespace_exists {
            return LeaseOutcome::NotFound;
        }

        if state.objects.contains_key(lock_id.as_str()) {
            return LeaseOutcome::Conflict;
        }

        state.objects.insert(lock_id.as_str().to_owned(), None);
        LeaseOutcome::Success(())
    }

    async fn create_namespace(&self) -> LeaseOutcome {
        self.namespace_creations.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.namespace_override.lock().await.take() {
            return outcome;
        }

        self.state.lock().await.namespace_exists = true;
        LeaseOutcome::Success(())
    }

    async fn acquire_lease(
        &self,
        lock_id: &LockId,
        lease_period: Duration,
    ) -> LeaseOutcome<LeaseToken> {
        if let Some(outcome) = self.acquire_override.lock().await.take() {
            return outcome;
        }

        let mut state = self.state.lock().await;
        state.issued += 1;
        let token = format!("lease-{}", state.issued);

        let Some(slot) = state.objects.get_mut(lock_id.as_str()) else {
            return LeaseOutcome::NotFound;
        };

        let now = Instant::now();
        if slot.as_ref().is_some_and(|lease| lease.expires_at > now) {
            return LeaseOutcome::Conflict;
        }

        *slot = Some(ActiveLease {
            token: token.clone(),
            expires_at: now + lease_period,
        });
        LeaseOutcome::Success(LeaseToken::new(token))
    }

    async fn renew_lease(
        &self,
        lock_id: &LockId,
        token: &LeaseToken,
        lease_period: Duration,
    ) -> LeaseOutcome {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.renew_override.lock().await.clone() {
            return outcome;
        }

        let mut state = self.state.lock().await;
        let Some(slot) = state.objects.get_mut(lock_id.as_str()) else {
            return LeaseOutcome::NotFound;
        };

        let now = Instant::now();
        match slot {
            Some(lease) if lease.token == token.as_str() && lease.expires_at > now => {
                lease.expires_at = now + lease_period;
                LeaseOutcome::Success(())
            }
            _ => LeaseOutcome::PreconditionFailed,
        }
    }

    async fn release_lease(&self, lock_id: &LockId, token: &LeaseToken) -> LeaseOutcome {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.release_override.lock().await.take() {
            return outcome;
        }

        let mut state = self.state.lock().await;
        let Some(slot) = state.objects.get_mut(lock_id.as_str()) else {
            return LeaseOutcome::NotFound;
        };

        match slot {
            Some(lease) if lease.token == token.as_str() => {
                *slot = None;
                LeaseOutcome::Success(())
            }
            Some(_) => LeaseOutcome::PreconditionFailed,
            None => LeaseOutcome::Success(()),
        }
    }
}

/// Listener fake that records lifecycle transitions.
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub(crate) starts: AtomicUsize,
    pub(crate) stops: AtomicUsize,
    pub(crate) cancels: AtomicUsize,
    fail_start: bool,
}

impl RecordingListener {
    pub(crate) fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.starts.load(Ordering::SeqCst) > self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Listener for RecordingListener {
    async fn start(&self, _cancel: CancellationToken) -> AppResult<()> {
        if self.fail_start {
            return Err(keeper_core::AppError::Internal(
                "listener failed to start".to_owned(),
            ));
        }

        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
