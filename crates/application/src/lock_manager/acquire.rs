use tokio::time::Instant;

use super::*;

impl LockManager {
    /// Attempts to acquire the lease for `lock_id`.
    ///
    /// Returns `Ok(None)` when another holder keeps the lease for the whole
    /// wait window. Cancelling `cancel` while waiting returns
    /// [`AppError::Cancelled`].
    pub async fn try_acquire(
        &self,
        lock_id: &LockId,
        request: LockRequest,
        cancel: &CancellationToken,
    ) -> AppResult<Option<LockHandle>> {
        let lease_period = self.lease_period_for(request)?;

        self.ensure_lock_object(lock_id).await?;

        let started_at = Instant::now();
        let mut token = self.try_acquire_lease(lock_id, lease_period).await?;

        while token.is_none() {
            let wait_budget = match request.wait {
                AcquisitionWait::Immediate => break,
                AcquisitionWait::Bounded(timeout) => {
                    let elapsed = started_at.elapsed();
                    if elapsed >= timeout {
                        break;
                    }
                    Some(timeout - elapsed)
                }
                AcquisitionWait::Unbounded => None,
            };

            let delay = wait_budget.map_or(self.options.poll_interval, |remaining| {
                remaining.min(self.options.poll_interval)
            });

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(AppError::Cancelled(format!(
                        "acquisition of singleton lock '{lock_id}' was cancelled"
                    )));
                }
                () = tokio::time::sleep(delay) => {}
            }

            token = self.try_acquire_lease(lock_id, lease_period).await?;
        }

        let Some(token) = token else {
            debug!(lock_id = %lock_id, "singleton lock is held by another owner");
            return Ok(None);
        };

        let mut handle = LockHandle::new(lock_id.clone(), token, lease_period);
        handle.start_renewal(self.store.clone());

        info!(
            lock_id = %lock_id,
            lease_period_ms = lease_period.as_millis(),
            "acquired singleton lock"
        );

        Ok(Some(handle))
    }

    /// Acquires the lease for `lock_id` or fails with [`AppError::Conflict`].
    pub async fn acquire(
        &self,
        lock_id: &LockId,
        request: LockRequest,
        cancel: &CancellationToken,
    ) -> AppResult<LockHandle> {
        self.try_acquire(lock_id, request, cancel)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "unable to acquire singleton lock lease for '{lock_id}'"
                ))
            })
    }

    async fn ensure_lock_object(&self, lock_id: &LockId) -> AppResult<()> {
        match self.store.create_if_absent(lock_id).await {
            LeaseOutcome::NotFound => {}
            outcome => return classify_create(lock_id, outcome),
        }

        debug!(lock_id = %lock_id, "creating missing singleton lock namespace");
        match self.store.create_namespace().await {
            LeaseOutcome::Success(()) | LeaseOutcome::Conflict => {}
            outcome => {
                return Err(AppError::Internal(format!(
                    "failed to create singleton lock namespace for '{lock_id}': {}",
                    describe(&outcome)
                )));
            }
        }

        classify_create(lock_id, self.store.create_if_absent(lock_id).await)
    }

    async fn try_acquire_lease(
        &self,
        lock_id: &LockId,
        lease_period: Duration,
    ) -> AppResult<Option<LeaseToken>> {
        match self.store.acquire_lease(lock_id, lease_period).await {
            LeaseOutcome::Success(token) => Ok(Some(token)),
            // NotFound means the lock object vanished; nothing to lease until it is recreated.
            LeaseOutcome::Conflict | LeaseOutcome::NotFound => Ok(None),
            outcome => Err(AppError::Internal(format!(
                "failed to acquire singleton lease for '{lock_id}': {}",
                describe(&outcome)
            ))),
        }
    }
}

fn classify_create(lock_id: &LockId, outcome: LeaseOutcome) -> AppResult<()> {
    match outcome {
        LeaseOutcome::Success(()) => {
            debug!(lock_id = %lock_id, "created singleton lock object");
            Ok(())
        }
        LeaseOutcome::Conflict | LeaseOutcome::PreconditionFailed => Ok(()),
        outcome => Err(AppError::Internal(format!(
            "failed to create singleton lock object '{lock_id}': {}",
            describe(&outcome)
        ))),
    }
}

pub(super) fn describe<T>(outcome: &LeaseOutcome<T>) -> String {
    match outcome {
        LeaseOutcome::Fatal(message) => message.clone(),
        outcome => format!("unexpected store outcome '{}'", outcome.kind()),
    }
}
