use std::env;
use std::time::Duration;

use keeper_application::{
    AcquisitionWait, DEFAULT_LEASE_PERIOD, DEFAULT_POLL_INTERVAL, LockManagerOptions,
};
use keeper_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

const DEFAULT_NAMESPACE: &str = "singleton-locks";
const DEFAULT_REDIS_KEY_PREFIX: &str = "keeper:singleton";

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory,
    Redis {
        redis_url: String,
        key_prefix: String,
    },
    Postgres {
        database_url: String,
    },
}

impl StoreConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis { .. } => "redis",
            Self::Postgres { .. } => "postgres",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub store: StoreConfig,
    pub namespace: String,
    pub jobs_file: String,
    pub lease_period_ms: u64,
    pub poll_interval_ms: u64,
    pub function_acquisition_timeout_ms: Option<u64>,
    pub trigger_acquisition_timeout_ms: Option<u64>,
}

impl HostConfig {
    pub fn load() -> AppResult<Self> {
        let store = match env::var("KEEPER_STORE")
            .unwrap_or_else(|_| "memory".to_owned())
            .as_str()
        {
            "memory" => StoreConfig::Memory,
            "redis" => StoreConfig::Redis {
                redis_url: required_non_empty_env("REDIS_URL")?,
                key_prefix: env::var("KEEPER_REDIS_KEY_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_REDIS_KEY_PREFIX.to_owned()),
            },
            "postgres" => StoreConfig::Postgres {
                database_url: required_non_empty_env("DATABASE_URL")?,
            },
            other => {
                return Err(AppError::Validation(format!(
                    "KEEPER_STORE must be 'memory', 'redis' or 'postgres', got '{other}'"
                )));
            }
        };

        let namespace = env::var("KEEPER_NAMESPACE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned());

        Ok(Self {
            store,
            namespace,
            jobs_file: required_non_empty_env("KEEPER_JOBS_FILE")?,
            lease_period_ms: parse_env_u64(
                "KEEPER_LEASE_PERIOD_MS",
                millis(DEFAULT_LEASE_PERIOD),
            )?,
            poll_interval_ms: parse_env_u64(
                "KEEPER_POLL_INTERVAL_MS",
                millis(DEFAULT_POLL_INTERVAL),
            )?,
            function_acquisition_timeout_ms: parse_optional_env_u64(
                "KEEPER_FUNCTION_ACQUISITION_TIMEOUT_MS",
            )?,
            trigger_acquisition_timeout_ms: parse_optional_env_u64(
                "KEEPER_TRIGGER_ACQUISITION_TIMEOUT_MS",
            )?,
        })
    }

    pub fn lock_manager_options(&self) -> AppResult<LockManagerOptions> {
        LockManagerOptions::new(
            Duration::from_millis(self.lease_period_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    /// Function invocations fail fast unless a timeout is configured.
    pub fn function_wait(&self) -> AcquisitionWait {
        AcquisitionWait::from_timeout(
            self.function_acquisition_timeout_ms.map(Duration::from_millis),
            AcquisitionWait::Immediate,
        )
    }

    /// Trigger listeners wait until shutdown unless a timeout is configured.
    pub fn trigger_wait(&self) -> AcquisitionWait {
        AcquisitionWait::from_timeout(
            self.trigger_acquisition_timeout_ms.map(Duration::from_millis),
            AcquisitionWait::Unbounded,
        )
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> AppResult<String> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    Ok(parse_optional_env_u64(name)?.unwrap_or(default))
}

fn parse_optional_env_u64(name: &str) -> AppResult<Option<u64>> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value.parse::<u64>().map(Some).map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(None),
    }
}
