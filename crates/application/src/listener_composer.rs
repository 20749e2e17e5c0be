use std::sync::Arc;

use async_trait::async_trait;
use keeper_core::{AppError, AppResult};
use keeper_domain::{RouteValues, SingletonMode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::job_definition::JobDefinition;
use crate::lock_manager::{AcquisitionWait, LockManager};
use crate::singleton_guard::SingletonListener;
use crate::singleton_ports::Listener;

mod composite;

pub use composite::CompositeListener;

/// Builds the host's aggregate listener from job definitions.
#[derive(Clone)]
pub struct ListenerComposer {
    lock_manager: LockManager,
    trigger_wait: AcquisitionWait,
}

impl ListenerComposer {
    /// Creates a composer.
    ///
    /// `trigger_wait` governs how long Trigger-mode listeners wait for their lock.
    #[must_use]
    pub fn new(lock_manager: LockManager, trigger_wait: AcquisitionWait) -> Self {
        Self {
            lock_manager,
            trigger_wait,
        }
    }

    /// Creates one listener per definition that has a trigger.
    ///
    /// Trigger-mode singleton definitions are wrapped in a [`SingletonListener`];
    /// all others are added unguarded.
    pub async fn compose(&self, definitions: &[JobDefinition]) -> AppResult<CompositeListener> {
        let mut listeners: Vec<Arc<dyn Listener>> = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let Some(listener_factory) = definition.listener_factory() else {
                continue;
            };

            let listener = listener_factory.create().await?;
            let listener = match definition.singleton() {
                Some(policy) if policy.mode() == SingletonMode::Trigger => {
                    if policy.scope().has_parameters() {
                        return Err(AppError::Validation(format!(
                            "trigger singleton scope '{}' for '{}' cannot use route parameters",
                            policy.scope().as_str(),
                            definition.owner()
                        )));
                    }

                    let lock_id = policy.lock_id(definition.owner(), &RouteValues::new())?;
                    debug!(lock_id = %lock_id, "wrapping trigger listener in singleton guard");
                    Arc::new(SingletonListener::new(
                        lock_id,
                        self.lock_manager.clone(),
                        self.trigger_wait,
                        listener,
                    )) as Arc<dyn Listener>
                }
                _ => listener,
            };

            listeners.push(listener);
        }

        Ok(CompositeListener::new(listeners))
    }
}
