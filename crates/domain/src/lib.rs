//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod lock_id;
mod singleton;

pub use lock_id::{LockId, OwnerIdentity};
pub use singleton::{RouteValues, ScopeTemplate, SingletonMode, SingletonPolicy};
