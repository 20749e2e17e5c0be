use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::*;

/// Proof of current ownership of one lock id.
///
/// The handle owns the background task that keeps the lease alive. It must be
/// given back to [`LockManager::release`]; dropping an unreleased handle stops
/// renewal and lets the lease lapse at the store.
#[derive(Debug)]
pub struct LockHandle {
    lock_id: LockId,
    token: LeaseToken,
    lease_period: Duration,
    acquired_at: DateTime<Utc>,
    renewal: Option<RenewalTask>,
    released: bool,
}

#[derive(Debug)]
pub(super) struct RenewalTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl LockHandle {
    pub(super) fn new(lock_id: LockId, token: LeaseToken, lease_period: Duration) -> Self {
        Self {
            lock_id,
            token,
            lease_period,
            acquired_at: Utc::now(),
            renewal: None,
            released: false,
        }
    }

    /// Returns the lock id this handle owns.
    #[must_use]
    pub fn lock_id(&self) -> &LockId {
        &self.lock_id
    }

    /// Returns the store-issued lease token.
    #[must_use]
    pub fn token(&self) -> &LeaseToken {
        &self.token
    }

    /// Returns the lease period requested at acquisition.
    #[must_use]
    pub fn lease_period(&self) -> Duration {
        self.lease_period
    }

    /// Returns when the lease was acquired.
    #[must_use]
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Returns true once the handle has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(super) fn start_renewal(&mut self, store: Arc<dyn LeaseStore>) {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(renew_until_cancelled(
            store,
            self.lock_id.clone(),
            self.token.clone(),
            self.lease_period,
            cancel.clone(),
        ));

        self.renewal = Some(RenewalTask { cancel, join });
    }

    /// Cancels the renewal task and waits for any in-flight renewal to finish.
    pub(super) async fn stop_renewal(&mut self) {
        let Some(renewal) = self.renewal.take() else {
            return;
        };

        renewal.cancel.cancel();
        if let Err(error) = renewal.join.await {
            warn!(
                lock_id = %self.lock_id,
                error = %error,
                "singleton lease renewal task ended abnormally"
            );
        }
    }

    pub(super) fn mark_released(&mut self) {
        self.released = true;
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Some(renewal) = self.renewal.take() {
            renewal.cancel.cancel();
            renewal.join.abort();
            warn!(
                lock_id = %self.lock_id,
                "singleton lock handle dropped without release; lease will lapse"
            );
        }
    }
}

async fn renew_until_cancelled(
    store: Arc<dyn LeaseStore>,
    lock_id: LockId,
    token: LeaseToken,
    lease_period: Duration,
    cancel: CancellationToken,
) {
    let renewal_interval = lease_period / 2;
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + renewal_interval,
        renewal_interval,
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match store.renew_lease(&lock_id, &token, lease_period).await {
            LeaseOutcome::Success(()) => {
                debug!(lock_id = %lock_id, "renewed singleton lease");
            }
            outcome => {
                warn!(
                    lock_id = %lock_id,
                    outcome = outcome.kind(),
                    "failed to renew singleton lease"
                );
            }
        }
    }
}
