//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_lease_store;
mod postgres_lease_store;
mod redis_lease_store;

pub use in_memory_lease_store::InMemoryLeaseStore;
pub use postgres_lease_store::{PostgresLeaseStore, SINGLETON_MIGRATOR};
pub use redis_lease_store::RedisLeaseStore;
