use std::sync::Arc;

use async_trait::async_trait;
use keeper_core::AppResult;
use tokio_util::sync::CancellationToken;

/// Long-running trigger listener hosted by a job host.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Starts listening. Implementations should return promptly once `cancel` fires.
    async fn start(&self, cancel: CancellationToken) -> AppResult<()>;

    /// Stops listening and waits for in-flight work to settle.
    async fn stop(&self) -> AppResult<()>;

    /// Aborts any pending start without waiting.
    fn cancel(&self);
}

/// Builds the raw listener for one job definition.
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    /// Creates one listener instance.
    async fn create(&self) -> AppResult<Arc<dyn Listener>>;
}
