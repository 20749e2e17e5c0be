use super::*;

/// Serializes invocations of a job body fleet-wide.
///
/// Each invocation acquires the lock before the body runs and releases it on
/// every exit path. With the default [`AcquisitionWait::Immediate`] a
/// contended invocation fails fast instead of queueing.
#[derive(Clone)]
pub struct FunctionSingletonGuard {
    lock_manager: LockManager,
    wait: AcquisitionWait,
}

impl FunctionSingletonGuard {
    /// Creates a fail-fast invocation guard.
    #[must_use]
    pub fn new(lock_manager: LockManager) -> Self {
        Self {
            lock_manager,
            wait: AcquisitionWait::Immediate,
        }
    }

    /// Sets how long an invocation waits for a contended lock.
    #[must_use]
    pub fn with_acquisition_wait(mut self, wait: AcquisitionWait) -> Self {
        self.wait = wait;
        self
    }

    /// Runs `body` while holding the lock for `lock_id`.
    ///
    /// The body does not run when the lock cannot be acquired. A body error
    /// is reported in preference to a release error.
    pub async fn invoke<F, Fut, T>(
        &self,
        lock_id: &LockId,
        cancel: &CancellationToken,
        body: F,
    ) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let request = LockRequest::default().with_wait(self.wait);
        let handle = self.lock_manager.acquire(lock_id, request, cancel).await?;
        let mut held = HeldLock {
            lock_manager: self.lock_manager.clone(),
            handle: Some(handle),
        };

        let outcome = body().await;
        let released = held.release().await;

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_error)) => Err(release_error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(release_error)) => {
                warn!(
                    lock_id = %lock_id,
                    error = %release_error,
                    "failed to release singleton lock after failed invocation"
                );
                Err(error)
            }
        }
    }

    /// Runs one invocation of `definition`, guarding it when its policy is Function mode.
    ///
    /// Route values resolve late-bound scope parameters for this invocation.
    pub async fn invoke_job<F, Fut, T>(
        &self,
        definition: &JobDefinition,
        route_values: &RouteValues,
        cancel: &CancellationToken,
        body: F,
    ) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match definition.singleton() {
            Some(policy) if policy.mode() == SingletonMode::Function => {
                let lock_id = policy.lock_id(definition.owner(), route_values)?;
                self.invoke(&lock_id, cancel, body).await
            }
            _ => body().await,
        }
    }
}

/// Lock held for one invocation.
///
/// If the invocation unwinds or its future is dropped before the lock is
/// released, the release is handed to the current runtime instead of letting
/// the lease lapse.
struct HeldLock {
    lock_manager: LockManager,
    handle: Option<LockHandle>,
}

impl HeldLock {
    async fn release(&mut self) -> AppResult<()> {
        match self.handle.as_mut() {
            Some(handle) => self.lock_manager.release(handle).await,
            None => Ok(()),
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        if handle.is_released() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                lock_id = %handle.lock_id(),
                "no runtime to release abandoned singleton lock; lease will lapse"
            );
            return;
        };

        warn!(
            lock_id = %handle.lock_id(),
            "singleton invocation ended before release; releasing in background"
        );
        let lock_manager = self.lock_manager.clone();
        runtime.spawn(async move {
            if let Err(error) = lock_manager.release(&mut handle).await {
                warn!(
                    lock_id = %handle.lock_id(),
                    error = %error,
                    "failed to release abandoned singleton lock"
                );
            }
        });
    }
}
