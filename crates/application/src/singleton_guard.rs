use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use keeper_core::{AppError, AppResult};
use keeper_domain::{LockId, RouteValues, SingletonMode};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::job_definition::JobDefinition;
use crate::lock_manager::{AcquisitionWait, LockHandle, LockManager, LockRequest};
use crate::singleton_ports::Listener;

mod function;
mod listener;

pub use function::FunctionSingletonGuard;
pub use listener::SingletonListener;
