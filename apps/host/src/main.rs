//! Keeper host runtime: runs indexed jobs with fleet-wide singleton guards.

#![forbid(unsafe_code)]

mod host_config;
mod job_listener;
mod job_manifest;

use std::sync::Arc;

use keeper_application::{
    FunctionSingletonGuard, LeaseStore, Listener, ListenerComposer, LockManager,
};
use keeper_core::{AppError, AppResult};
use keeper_infrastructure::{
    InMemoryLeaseStore, PostgresLeaseStore, RedisLeaseStore, SINGLETON_MIGRATOR,
};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::host_config::{HostConfig, StoreConfig, init_tracing};
use crate::job_manifest::JobManifest;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = HostConfig::load()?;
    let store = build_store(&config).await?;
    let lock_manager = LockManager::new(store, config.lock_manager_options()?);
    let function_guard = FunctionSingletonGuard::new(lock_manager.clone())
        .with_acquisition_wait(config.function_wait());

    let definitions =
        JobManifest::load(config.jobs_file.as_str())?.into_definitions(&function_guard)?;
    let composite = Arc::new(
        ListenerComposer::new(lock_manager, config.trigger_wait())
            .compose(&definitions)
            .await?,
    );

    info!(
        store = config.store.as_str(),
        namespace = %config.namespace,
        jobs = definitions.len(),
        listeners = composite.len(),
        lease_period_ms = config.lease_period_ms,
        poll_interval_ms = config.poll_interval_ms,
        "keeper-host started"
    );

    let startup_cancel = CancellationToken::new();
    let mut starting = {
        let composite = composite.clone();
        let cancel = startup_cancel.clone();
        tokio::spawn(async move { composite.start(cancel).await })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(shutdown_signal_error)?;
            info!("shutdown requested while listeners were starting");
            startup_cancel.cancel();
            composite.cancel();
            match flatten_startup(starting.await) {
                Ok(()) => {}
                Err(error) if error.is_cancelled() => {}
                Err(error) => warn!(error = %error, "listener startup failed during shutdown"),
            }
        }
        joined = &mut starting => {
            flatten_startup(joined)?;
            info!("all job listeners started");
            tokio::signal::ctrl_c().await.map_err(shutdown_signal_error)?;
            info!("shutdown requested");
            composite.cancel();
        }
    }

    composite.stop().await?;
    info!("keeper-host stopped");
    Ok(())
}

async fn build_store(config: &HostConfig) -> AppResult<Arc<dyn LeaseStore>> {
    match &config.store {
        StoreConfig::Memory => Ok(Arc::new(InMemoryLeaseStore::new())),
        StoreConfig::Redis {
            redis_url,
            key_prefix,
        } => {
            let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                AppError::Internal(format!("failed to create redis client: {error}"))
            })?;
            Ok(Arc::new(RedisLeaseStore::new(
                client,
                key_prefix.as_str(),
                config.namespace.as_str(),
            )))
        }
        StoreConfig::Postgres { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url.as_str())
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to connect to database: {error}"))
                })?;
            SINGLETON_MIGRATOR.run(&pool).await.map_err(|error| {
                AppError::Internal(format!("failed to run singleton lock migrations: {error}"))
            })?;
            Ok(Arc::new(PostgresLeaseStore::new(
                pool,
                config.namespace.as_str(),
            )))
        }
    }
}

fn flatten_startup(joined: Result<AppResult<()>, tokio::task::JoinError>) -> AppResult<()> {
    joined.map_err(|error| AppError::Internal(format!("listener startup task failed: {error}")))?
}

fn shutdown_signal_error(error: std::io::Error) -> AppError {
    AppError::Internal(format!("failed to listen for shutdown signal: {error}"))
}
