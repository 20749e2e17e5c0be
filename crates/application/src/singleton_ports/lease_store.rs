use std::fmt::{Display, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use keeper_domain::LockId;

/// Opaque lease token issued by a lease store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseToken(String);

impl LeaseToken {
    /// Wraps a store-issued token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the underlying token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for LeaseToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Classified result of one remote lease store operation.
///
/// Adapters map provider-specific failures into this set once, at the
/// storage boundary. Lock logic only ever branches on these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome<T = ()> {
    /// Operation applied.
    Success(T),
    /// Object already exists, or another holder currently owns the lease.
    Conflict,
    /// Object or its enclosing namespace does not exist.
    NotFound,
    /// Supplied lease token does not match the active lease.
    PreconditionFailed,
    /// Any other store failure.
    Fatal(String),
}

impl<T> LeaseOutcome<T> {
    /// Returns stable outcome name for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::PreconditionFailed => "precondition_failed",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Returns true for the success variant.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Remote lease-capable object store that arbitrates lock ownership.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Creates the lock object with "no owner" content unless it already exists.
    ///
    /// Returns `Conflict` when the object exists and `NotFound` when the
    /// enclosing namespace is missing.
    async fn create_if_absent(&self, lock_id: &LockId) -> LeaseOutcome;

    /// Creates the enclosing namespace when it does not exist yet.
    async fn create_namespace(&self) -> LeaseOutcome;

    /// Acquires a new lease for the given duration.
    async fn acquire_lease(
        &self,
        lock_id: &LockId,
        lease_period: Duration,
    ) -> LeaseOutcome<LeaseToken>;

    /// Extends the lease identified by `token` by another `lease_period`.
    async fn renew_lease(
        &self,
        lock_id: &LockId,
        token: &LeaseToken,
        lease_period: Duration,
    ) -> LeaseOutcome;

    /// Releases the lease identified by `token`.
    async fn release_lease(&self, lock_id: &LockId, token: &LeaseToken) -> LeaseOutcome;
}
