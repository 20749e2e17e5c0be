//! Application services and ports.

#![forbid(unsafe_code)]

mod job_definition;
mod listener_composer;
mod lock_manager;
mod singleton_guard;
mod singleton_ports;

#[cfg(test)]
mod test_support;

pub use job_definition::JobDefinition;
pub use listener_composer::{CompositeListener, ListenerComposer};
pub use lock_manager::{
    AcquisitionWait, DEFAULT_LEASE_PERIOD, DEFAULT_POLL_INTERVAL, LockHandle, LockManager,
    LockManagerOptions, LockRequest,
};
pub use singleton_guard::{FunctionSingletonGuard, SingletonListener};
pub use singleton_ports::{LeaseOutcome, LeaseStore, LeaseToken, Listener, ListenerFactory};
