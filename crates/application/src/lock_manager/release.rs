use super::acquire::describe;
use super::*;

impl LockManager {
    /// Releases a held lock.
    ///
    /// Renewal is stopped and joined before the remote release so the two can
    /// never race. A lease that already expired, was taken by another holder,
    /// or whose object was deleted counts as released. Releasing an already
    /// released handle does nothing.
    pub async fn release(&self, handle: &mut LockHandle) -> AppResult<()> {
        if handle.is_released() {
            return Ok(());
        }

        handle.stop_renewal().await;
        handle.mark_released();

        let lock_id = handle.lock_id();
        match self.store.release_lease(lock_id, handle.token()).await {
            LeaseOutcome::Success(()) => {
                info!(lock_id = %lock_id, "released singleton lock");
                Ok(())
            }
            outcome @ (LeaseOutcome::NotFound
            | LeaseOutcome::PreconditionFailed
            | LeaseOutcome::Conflict) => {
                debug!(
                    lock_id = %lock_id,
                    outcome = outcome.kind(),
                    "singleton lease was already released"
                );
                Ok(())
            }
            outcome @ LeaseOutcome::Fatal(_) => Err(AppError::Internal(format!(
                "failed to release singleton lease for '{lock_id}': {}",
                describe(&outcome)
            ))),
        }
    }
}
