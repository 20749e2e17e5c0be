use std::sync::Arc;
use std::time::Duration;

use keeper_core::{AppError, AppResult};
use keeper_domain::LockId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::singleton_ports::{LeaseOutcome, LeaseStore, LeaseToken};

mod acquire;
mod handle;
mod release;

pub use handle::LockHandle;

/// Lease validity used when a request does not specify one.
pub const DEFAULT_LEASE_PERIOD: Duration = Duration::from_secs(15);

/// Delay between acquisition attempts while waiting for a contended lock.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long an acquisition keeps retrying when another holder owns the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionWait {
    /// Single attempt; contention yields no lock.
    Immediate,
    /// Poll until the lease is acquired or the duration elapses.
    Bounded(Duration),
    /// Poll until the lease is acquired or the wait is cancelled.
    Unbounded,
}

impl AcquisitionWait {
    /// Maps an optional timeout onto a wait policy, treating `None` as `fallback`.
    #[must_use]
    pub fn from_timeout(timeout: Option<Duration>, fallback: Self) -> Self {
        timeout.map_or(fallback, Self::Bounded)
    }
}

/// Per-call acquisition parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    lease_period: Option<Duration>,
    wait: AcquisitionWait,
}

impl Default for LockRequest {
    fn default() -> Self {
        Self {
            lease_period: None,
            wait: AcquisitionWait::Immediate,
        }
    }
}

impl LockRequest {
    /// Overrides the manager's default lease period.
    #[must_use]
    pub fn with_lease_period(mut self, lease_period: Duration) -> Self {
        self.lease_period = Some(lease_period);
        self
    }

    /// Sets how long acquisition keeps polling under contention.
    #[must_use]
    pub fn with_wait(mut self, wait: AcquisitionWait) -> Self {
        self.wait = wait;
        self
    }

    /// Returns the configured wait policy.
    #[must_use]
    pub fn wait(&self) -> AcquisitionWait {
        self.wait
    }
}

/// Validated lock manager tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockManagerOptions {
    default_lease_period: Duration,
    poll_interval: Duration,
}

impl Default for LockManagerOptions {
    fn default() -> Self {
        Self {
            default_lease_period: DEFAULT_LEASE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl LockManagerOptions {
    /// Creates validated options.
    pub fn new(default_lease_period: Duration, poll_interval: Duration) -> AppResult<Self> {
        validate_lease_period(default_lease_period)?;

        if poll_interval.is_zero() {
            return Err(AppError::Validation(
                "lock poll interval must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            default_lease_period,
            poll_interval,
        })
    }

    /// Returns the default lease period.
    #[must_use]
    pub fn default_lease_period(&self) -> Duration {
        self.default_lease_period
    }

    /// Returns the acquisition poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Distributed lock manager built on a remote lease store.
///
/// The store is the only source of truth: there is no local lock table and
/// no in-process shortcut, so two callers in the same process contend
/// through the store exactly like callers on different hosts.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LeaseStore>,
    options: LockManagerOptions,
}

impl LockManager {
    /// Creates a lock manager.
    #[must_use]
    pub fn new(store: Arc<dyn LeaseStore>, options: LockManagerOptions) -> Self {
        Self { store, options }
    }

    /// Returns the configured options.
    #[must_use]
    pub fn options(&self) -> LockManagerOptions {
        self.options
    }

    fn lease_period_for(&self, request: LockRequest) -> AppResult<Duration> {
        let lease_period = request
            .lease_period
            .unwrap_or(self.options.default_lease_period);
        validate_lease_period(lease_period)?;
        Ok(lease_period)
    }
}

fn validate_lease_period(lease_period: Duration) -> AppResult<()> {
    if lease_period < Duration::from_millis(2) {
        return Err(AppError::Validation(
            "lock lease period must be at least two milliseconds".to_owned(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests;
