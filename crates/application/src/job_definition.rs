use std::sync::Arc;

use keeper_domain::{OwnerIdentity, SingletonPolicy};

use crate::singleton_ports::ListenerFactory;

/// One indexed job: its owner, optional singleton policy and optional trigger listener.
///
/// The policy is resolved once when the definition is built and never
/// re-inspected per invocation.
#[derive(Clone)]
pub struct JobDefinition {
    owner: OwnerIdentity,
    singleton: Option<SingletonPolicy>,
    listener_factory: Option<Arc<dyn ListenerFactory>>,
}

impl JobDefinition {
    /// Creates a job definition without singleton policy or listener.
    #[must_use]
    pub fn new(owner: OwnerIdentity) -> Self {
        Self {
            owner,
            singleton: None,
            listener_factory: None,
        }
    }

    /// Attaches a singleton policy.
    #[must_use]
    pub fn with_singleton(mut self, policy: SingletonPolicy) -> Self {
        self.singleton = Some(policy);
        self
    }

    /// Attaches the factory that builds this job's trigger listener.
    #[must_use]
    pub fn with_listener_factory(mut self, listener_factory: Arc<dyn ListenerFactory>) -> Self {
        self.listener_factory = Some(listener_factory);
        self
    }

    /// Returns the job owner identity.
    #[must_use]
    pub fn owner(&self) -> &OwnerIdentity {
        &self.owner
    }

    /// Returns the singleton policy, if any.
    #[must_use]
    pub fn singleton(&self) -> Option<&SingletonPolicy> {
        self.singleton.as_ref()
    }

    /// Returns the listener factory, if the job has a trigger.
    #[must_use]
    pub fn listener_factory(&self) -> Option<&Arc<dyn ListenerFactory>> {
        self.listener_factory.as_ref()
    }
}
