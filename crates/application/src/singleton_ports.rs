mod lease_store;
mod listener;

pub use lease_store::{LeaseOutcome, LeaseStore, LeaseToken};
pub use listener::{Listener, ListenerFactory};
