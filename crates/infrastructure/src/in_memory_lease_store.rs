use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use keeper_application::{LeaseOutcome, LeaseStore, LeaseToken};
use keeper_domain::LockId;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct ActiveLease {
    token: String,
    expires_at: Instant,
}

impl ActiveLease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct LeaseTable {
    namespace_exists: bool,
    locks: HashMap<LockId, Option<ActiveLease>>,
}

/// Process-local lease store for single-host deployments and tests.
///
/// Leases expire on the tokio clock, so paused-time tests observe expiry
/// deterministically.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    table: Mutex<LeaseTable>,
}

impl InMemoryLeaseStore {
    /// Creates an empty store whose namespace has not been created yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn create_if_absent(&self, lock_id: &LockId) -> LeaseOutcome {
        let mut table = self.table.lock().await;
        if !table.namespace_exists {
            return LeaseOutcome::NotFound;
        }

        if table.locks.contains_key(lock_id) {
            return LeaseOutcome::Conflict;
        }

        table.locks.insert(lock_id.clone(), None);
        LeaseOutcome::Success(())
    }

    async fn create_namespace(&self) -> LeaseOutcome {
        let mut table = self.table.lock().await;
        if table.namespace_exists {
            return LeaseOutcome::Conflict;
        }

        table.namespace_exists = true;
        LeaseOutcome::Success(())
    }

    async fn acquire_lease(
        &self,
        lock_id: &LockId,
        lease_period: Duration,
    ) -> LeaseOutcome<LeaseToken> {
        let mut table = self.table.lock().await;
        let Some(slot) = table.locks.get_mut(lock_id) else {
            return LeaseOutcome::NotFound;
        };

        let now = Instant::now();
        if slot.as_ref().is_some_and(|lease| lease.is_live(now)) {
            return LeaseOutcome::Conflict;
        }

        let token = uuid::Uuid::new_v4().to_string();
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
        let mut table = self.table.lock().await;
        let Some(slot) = table.locks.get_mut(lock_id) else {
            return LeaseOutcome::NotFound;
        };

        let now = Instant::now();
        match slot {
            Some(lease) if lease.token == token.as_str() && lease.is_live(now) => {
                lease.expires_at = now + lease_period;
                LeaseOutcome::Success(())
            }
            _ => LeaseOutcome::PreconditionFailed,
        }
    }

    async fn release_lease(&self, lock_id: &LockId, token: &LeaseToken) -> LeaseOutcome {
        let mut table = self.table.lock().await;
        let Some(slot) = table.locks.get_mut(lock_id) else {
            return LeaseOutcome::NotFound;
        };

        let now = Instant::now();
        match slot {
            Some(lease) if lease.token == token.as_str() => {
                *slot = None;
                LeaseOutcome::Success(())
            }
            Some(lease) if lease.is_live(now) => LeaseOutcome::PreconditionFailed,
            _ => {
                *slot = None;
                LeaseOutcome::Success(())
            }
        }
    }
}
