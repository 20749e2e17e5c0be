use std::sync::Arc;
use std::time::Duration;

use keeper_application::{FunctionSingletonGuard, JobDefinition};
use keeper_core::{AppError, AppResult};
use keeper_domain::{OwnerIdentity, RouteValues, ScopeTemplate, SingletonMode, SingletonPolicy};
use serde::Deserialize;

use crate::job_listener::{TickingJob, TickingListenerFactory};

const DEFAULT_TICK_INTERVAL_MS: u64 = 60_000;

/// JSON document listing the jobs this host indexes.
#[derive(Debug, Clone, Deserialize)]
pub struct JobManifest {
    pub jobs: Vec<JobManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobManifestEntry {
    pub owner_type: String,
    pub member: String,
    #[serde(default)]
    pub mode: Option<SingletonMode>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub route_values: RouteValues,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

impl JobManifest {
    pub fn load(path: &str) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|error| {
            AppError::Internal(format!("failed to read job manifest '{path}': {error}"))
        })?;
        Self::parse(contents.as_str())
    }

    pub fn parse(contents: &str) -> AppResult<Self> {
        serde_json::from_str(contents)
            .map_err(|error| AppError::Validation(format!("invalid job manifest: {error}")))
    }

    pub fn into_definitions(self, guard: &FunctionSingletonGuard) -> AppResult<Vec<JobDefinition>> {
        self.jobs
            .into_iter()
            .map(|entry| entry.into_definition(guard))
            .collect()
    }
}

impl JobManifestEntry {
    fn into_definition(self, guard: &FunctionSingletonGuard) -> AppResult<JobDefinition> {
        if self.tick_interval_ms == 0 {
            return Err(AppError::Validation(format!(
                "tick_interval_ms for '{}.{}' must be greater than zero",
                self.owner_type, self.member
            )));
        }

        let owner = OwnerIdentity::new(self.owner_type, self.member)?;
        let mut definition = JobDefinition::new(owner);
        if let Some(mode) = self.mode {
            let policy = match self.scope {
                Some(scope) => SingletonPolicy::scoped(mode, ScopeTemplate::new(scope)?),
                None => SingletonPolicy::new(mode),
            };
            definition = definition.with_singleton(policy);
        } else if self.scope.is_some() {
            return Err(AppError::Validation(format!(
                "scope for '{}' requires a singleton mode",
                definition.owner()
            )));
        }

        let factory = TickingListenerFactory::new(TickingJob {
            definition: definition.clone(),
            route_values: self.route_values,
            guard: guard.clone(),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
        });

        Ok(definition.with_listener_factory(Arc::new(factory)))
    }
}
