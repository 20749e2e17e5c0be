use super::*;

/// Listener that starts and stops a set of child listeners together.
pub struct CompositeListener {
    listeners: Vec<Arc<dyn Listener>>,
}

impl CompositeListener {
    /// Creates a composite over `listeners`.
    #[must_use]
    pub fn new(listeners: Vec<Arc<dyn Listener>>) -> Self {
        Self { listeners }
    }

    /// Returns the number of child listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true when there are no child listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[async_trait]
impl Listener for CompositeListener {
    async fn start(&self, cancel: CancellationToken) -> AppResult<()> {
        for (index, listener) in self.listeners.iter().enumerate() {
            if let Err(error) = listener.start(cancel.clone()).await {
                for started in self.listeners[..index].iter().rev() {
                    if let Err(stop_error) = started.stop().await {
                        warn!(
                            error = %stop_error,
                            "failed to stop listener after sibling start failure"
                        );
                    }
                }
                return Err(error);
            }
        }

        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        let mut first_error = None;
        for listener in &self.listeners {
            if let Err(error) = listener.stop().await {
                warn!(error = %error, "failed to stop listener");
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn cancel(&self) {
        for listener in &self.listeners {
            listener.cancel();
        }
    }
}
