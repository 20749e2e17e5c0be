//! Postgres-backed singleton lease store.

use std::time::Duration;

use async_trait::async_trait;
use keeper_application::{LeaseOutcome, LeaseStore, LeaseToken};
use keeper_domain::LockId;
use sqlx::migrate::Migrator;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

/// Embedded migrations creating the singleton lock tables.
pub static SINGLETON_MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Postgres implementation of the singleton lease store port.
///
/// Lease expiry is evaluated with the database clock, so hosts never compare
/// their own clocks against each other.
#[derive(Clone)]
pub struct PostgresLeaseStore {
    pool: PgPool,
    namespace: String,
}

#[derive(Debug)]
enum LockRowState {
    Missing,
    Free,
    Leased { token: Uuid, live: bool },
}

impl PostgresLeaseStore {
    /// Creates a store adapter bound to one namespace.
    #[must_use]
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    async fn lock_row_state(&self, lock_id: &LockId) -> Result<LockRowState, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT lease_token, lease_expires_at > now() AS live
            FROM singleton_locks
            WHERE namespace = $1 AND lock_id = $2
            "#,
        )
        .bind(self.namespace.as_str())
        .bind(lock_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(LockRowState::Missing);
        };

        let token: Option<Uuid> = row.try_get("lease_token")?;
        let live: Option<bool> = row.try_get("live")?;
        Ok(match token {
            Some(token) => LockRowState::Leased {
                token,
                live: live.unwrap_or(false),
            },
            None => LockRowState::Free,
        })
    }

    async fn classify_miss<T: Send>(
        &self,
        lock_id: &LockId,
        on_present: LeaseOutcome<T>,
    ) -> LeaseOutcome<T> {
        match self.lock_row_state(lock_id).await {
            Ok(LockRowState::Missing) => LeaseOutcome::NotFound,
            Ok(_) => on_present,
            Err(error) => fatal("inspect singleton lock", &error),
        }
    }
}

fn fatal<T>(operation: &str, error: &sqlx::Error) -> LeaseOutcome<T> {
    warn!(operation, error = %error, "postgres lease operation failed");
    LeaseOutcome::Fatal(format!("failed to {operation}: {error}"))
}

fn lease_millis(lease_period: Duration) -> i64 {
    i64::try_from(lease_period.as_millis()).unwrap_or(i64::MAX)
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|database_error| database_error.code())
        .is_some_and(|code| code == FOREIGN_KEY_VIOLATION)
}

#[async_trait]
impl LeaseStore for PostgresLeaseStore {
    async fn create_if_absent(&self, lock_id: &LockId) -> LeaseOutcome {
        let result = sqlx::query(
            r#"
            INSERT INTO singleton_locks (namespace, lock_id)
            VALUES ($1, $2)
            ON CONFLICT (namespace, lock_id) DO NOTHING
            "#,
        )
        .bind(self.namespace.as_str())
        .bind(lock_id.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => LeaseOutcome::Success(()),
            Ok(_) => LeaseOutcome::Conflict,
            Err(error) if is_foreign_key_violation(&error) => LeaseOutcome::NotFound,
            Err(error) => fatal("create singleton lock object", &error),
        }
    }

    async fn create_namespace(&self) -> LeaseOutcome {
        let result = sqlx::query(
            r#"
            INSERT INTO singleton_lock_namespaces (name)
            VALUES ($1)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(self.namespace.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => LeaseOutcome::Success(()),
            Ok(_) => LeaseOutcome::Conflict,
            Err(error) => fatal("create singleton lock namespace", &error),
        }
    }

    async fn acquire_lease(
        &self,
        lock_id: &LockId,
        lease_period: Duration,
    ) -> LeaseOutcome<LeaseToken> {
        let token = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            UPDATE singleton_locks
            SET lease_token = $3,
                lease_expires_at = now() + ($4::BIGINT * INTERVAL '1 millisecond')
            WHERE namespace = $1
              AND lock_id = $2
              AND (lease_token IS NULL OR lease_expires_at <= now())
            "#,
        )
        .bind(self.namespace.as_str())
        .bind(lock_id.as_str())
        .bind(token)
        .bind(lease_millis(lease_period))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {
                LeaseOutcome::Success(LeaseToken::new(token.to_string()))
            }
            Ok(_) => self.classify_miss(lock_id, LeaseOutcome::Conflict).await,
            Err(error) => fatal("acquire singleton lease", &error),
        }
    }

    async fn renew_lease(
        &self,
        lock_id: &LockId,
        token: &LeaseToken,
        lease_period: Duration,
    ) -> LeaseOutcome {
        let Ok(token) = Uuid::parse_str(token.as_str()) else {
            return LeaseOutcome::PreconditionFailed;
        };

        let result = sqlx::query(
            r#"
            UPDATE singleton_locks
            SET lease_expires_at = now() + ($4::BIGINT * INTERVAL '1 millisecond')
            WHERE namespace = $1
              AND lock_id = $2
              AND lease_token = $3
              AND lease_expires_at > now()
            "#,
        )
        .bind(self.namespace.as_str())
        .bind(lock_id.as_str())
        .bind(token)
        .bind(lease_millis(lease_period))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => LeaseOutcome::Success(()),
            Ok(_) => {
                self.classify_miss(lock_id, LeaseOutcome::PreconditionFailed)
                    .await
            }
            Err(error) => fatal("renew singleton lease", &error),
        }
    }

    async fn release_lease(&self, lock_id: &LockId, token: &LeaseToken) -> LeaseOutcome {
        let Ok(token) = Uuid::parse_str(token.as_str()) else {
            return LeaseOutcome::PreconditionFailed;
        };

        let result = sqlx::query(
            r#"
            UPDATE singleton_locks
            SET lease_token = NULL,
                lease_expires_at = NULL
            WHERE namespace = $1
              AND lock_id = $2
              AND lease_token = $3
            "#,
        )
        .bind(self.namespace.as_str())
        .bind(lock_id.as_str())
        .bind(token)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => LeaseOutcome::Success(()),
            Ok(_) => match self.lock_row_state(lock_id).await {
                Ok(LockRowState::Missing) => LeaseOutcome::NotFound,
                Ok(LockRowState::Leased { token: current, live: true }) if current != token => {
                    LeaseOutcome::PreconditionFailed
                }
                Ok(_) => LeaseOutcome::Success(()),
                Err(error) => fatal("inspect singleton lock", &error),
            },
            Err(error) => fatal("release singleton lease", &error),
        }
    }
}
