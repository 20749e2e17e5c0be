use std::sync::atomic::{AtomicBool, Ordering};

use super::*;

/// Listener wrapper that only runs its inner listener while holding the lock.
///
/// Starting waits for the lock according to the configured wait policy, so at
/// most one instance across the fleet runs the inner listener for a lock id.
pub struct SingletonListener {
    lock_id: LockId,
    lock_manager: LockManager,
    wait: AcquisitionWait,
    inner: Arc<dyn Listener>,
    shutdown: CancellationToken,
    handle: Mutex<Option<LockHandle>>,
    active: AtomicBool,
}

impl SingletonListener {
    /// Wraps `inner` behind the lock for `lock_id`.
    #[must_use]
    pub fn new(
        lock_id: LockId,
        lock_manager: LockManager,
        wait: AcquisitionWait,
        inner: Arc<dyn Listener>,
    ) -> Self {
        Self {
            lock_id,
            lock_manager,
            wait,
            inner,
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Returns the guarded lock id.
    #[must_use]
    pub fn lock_id(&self) -> &LockId {
        &self.lock_id
    }

    /// Returns true while this instance holds the lock and runs the inner listener.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn stopped_error(&self) -> AppError {
        AppError::Cancelled(format!(
            "singleton listener for '{}' was stopped before it became active",
            self.lock_id
        ))
    }
}

#[async_trait]
impl Listener for SingletonListener {
    async fn start(&self, cancel: CancellationToken) -> AppResult<()> {
        // Held for the whole start so a concurrent stop observes either no
        // handle or a fully started inner listener.
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        if self.shutdown.is_cancelled() {
            return Err(self.stopped_error());
        }

        let request = LockRequest::default().with_wait(self.wait);
        let acquisition = self.lock_manager.acquire(&self.lock_id, request, &self.shutdown);
        let mut handle = tokio::select! {
            result = acquisition => result?,
            () = cancel.cancelled() => {
                return Err(AppError::Cancelled(format!(
                    "start of singleton listener for '{}' was cancelled",
                    self.lock_id
                )));
            }
        };

        if self.shutdown.is_cancelled() {
            self.lock_manager.release(&mut handle).await?;
            return Err(self.stopped_error());
        }

        if let Err(error) = self.inner.start(cancel).await {
            if let Err(release_error) = self.lock_manager.release(&mut handle).await {
                warn!(
                    lock_id = %self.lock_id,
                    error = %release_error,
                    "failed to release singleton lock after listener start failure"
                );
            }
            return Err(error);
        }

        info!(lock_id = %self.lock_id, "singleton listener is active");
        *slot = Some(handle);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        self.shutdown.cancel();

        let Some(mut handle) = self.handle.lock().await.take() else {
            return Ok(());
        };
        self.active.store(false, Ordering::SeqCst);

        let stopped = self.inner.stop().await;
        let released = self.lock_manager.release(&mut handle).await;
        info!(lock_id = %self.lock_id, "singleton listener stopped");

        stopped.and(released)
    }

    fn cancel(&self) {
        self.shutdown.cancel();
        self.inner.cancel();
    }
}
