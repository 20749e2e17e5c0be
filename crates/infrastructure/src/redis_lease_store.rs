//! Redis-backed singleton lease store.

use std::time::Duration;

use async_trait::async_trait;
use keeper_application::{LeaseOutcome, LeaseStore, LeaseToken};
use keeper_domain::LockId;
use redis::Script;
use tracing::warn;

// Scripts answer with HTTP-like status codes so every adapter classifies the same way.
const STATUS_OK: i64 = 200;
const STATUS_CREATED: i64 = 201;
const STATUS_NOT_FOUND: i64 = 404;
const STATUS_CONFLICT: i64 = 409;
const STATUS_PRECONDITION_FAILED: i64 = 412;

const CREATE_NAMESPACE_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], '1', 'NX') then
  return 201
else
  return 409
end
"#;

const CREATE_LOCK_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 404
end
if redis.call('SETNX', KEYS[2], '') == 1 then
  return 201
else
  return 409
end
"#;

const ACQUIRE_LEASE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 404
end
if redis.call('SET', KEYS[2], ARGV[1], 'NX', 'PX', ARGV[2]) then
  return 200
else
  return 409
end
"#;

const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 404
end
if redis.call('GET', KEYS[2]) == ARGV[1] then
  redis.call('PEXPIRE', KEYS[2], ARGV[2])
  return 200
else
  return 412
end
"#;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 404
end
local current = redis.call('GET', KEYS[2])
if not current then
  return 200
end
if current == ARGV[1] then
  redis.call('DEL', KEYS[2])
  return 200
else
  return 412
end
"#;

/// Redis implementation of the singleton lease store port.
///
/// The namespace is a marker key, each lock object is a key under it, and the
/// active lease is a separate key whose TTL is the lease period.
#[derive(Clone)]
pub struct RedisLeaseStore {
    client: redis::Client,
    key_prefix: String,
    namespace: String,
}

impl RedisLeaseStore {
    /// Creates one store adapter.
    #[must_use]
    pub fn new(
        client: redis::Client,
        key_prefix: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            namespace: namespace.into(),
        }
    }

    fn namespace_key(&self) -> String {
        format!("{}:{}", self.key_prefix, self.namespace)
    }

    fn lock_key(&self, lock_id: &LockId) -> String {
        format!("{}:{}:lock:{lock_id}", self.key_prefix, self.namespace)
    }

    fn lease_key(&self, lock_id: &LockId) -> String {
        format!("{}:{}:lease:{lock_id}", self.key_prefix, self.namespace)
    }

    async fn run_script(
        &self,
        operation: &str,
        source: &str,
        keys: &[String],
        args: &[String],
    ) -> LeaseOutcome {
        let mut connection = match self.client.get_multiplexed_async_connection().await {
            Ok(connection) => connection,
            Err(error) => {
                return LeaseOutcome::Fatal(format!("failed to connect to redis: {error}"));
            }
        };

        let script = Script::new(source);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }

        match invocation.invoke_async::<i64>(&mut connection).await {
            Ok(status) => classify_status(status),
            Err(error) => {
                warn!(operation, error = %error, "redis lease script failed");
                LeaseOutcome::Fatal(format!("failed to {operation}: {error}"))
            }
        }
    }
}

fn classify_status(status: i64) -> LeaseOutcome {
    match status {
        STATUS_OK | STATUS_CREATED => LeaseOutcome::Success(()),
        STATUS_NOT_FOUND => LeaseOutcome::NotFound,
        STATUS_CONFLICT => LeaseOutcome::Conflict,
        STATUS_PRECONDITION_FAILED => LeaseOutcome::PreconditionFailed,
        other => LeaseOutcome::Fatal(format!("unexpected redis lease status {other}")),
    }
}

fn lease_millis(lease_period: Duration) -> String {
    lease_period.as_millis().max(1).to_string()
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn create_if_absent(&self, lock_id: &LockId) -> LeaseOutcome {
        self.run_script(
            "create singleton lock object",
            CREATE_LOCK_SCRIPT,
            &[self.namespace_key(), self.lock_key(lock_id)],
            &[],
        )
        .await
    }

    async fn create_namespace(&self) -> LeaseOutcome {
        self.run_script(
            "create singleton lock namespace",
            CREATE_NAMESPACE_SCRIPT,
            &[self.namespace_key()],
            &[],
        )
        .await
    }

    async fn acquire_lease(
        &self,
        lock_id: &LockId,
        lease_period: Duration,
    ) -> LeaseOutcome<LeaseToken> {
        let token = uuid::Uuid::new_v4().to_string();
        let outcome = self
            .run_script(
                "acquire singleton lease",
                ACQUIRE_LEASE_SCRIPT,
                &[self.lock_key(lock_id), self.lease_key(lock_id)],
                &[token.clone(), lease_millis(lease_period)],
            )
            .await;

        match outcome {
            LeaseOutcome::Success(()) => LeaseOutcome::Success(LeaseToken::new(token)),
            LeaseOutcome::Conflict => LeaseOutcome::Conflict,
            LeaseOutcome::NotFound => LeaseOutcome::NotFound,
            LeaseOutcome::PreconditionFailed => LeaseOutcome::PreconditionFailed,
            LeaseOutcome::Fatal(message) => LeaseOutcome::Fatal(message),
        }
    }

    async fn renew_lease(
        &self,
        lock_id: &LockId,
        token: &LeaseToken,
        lease_period: Duration,
    ) -> LeaseOutcome {
        self.run_script(
            "renew singleton lease",
            RENEW_LEASE_SCRIPT,
            &[self.lock_key(lock_id), self.lease_key(lock_id)],
            &[token.as_str().to_owned(), lease_millis(lease_period)],
        )
        .await
    }

    async fn release_lease(&self, lock_id: &LockId, token: &LeaseToken) -> LeaseOutcome {
        self.run_script(
            "release singleton lease",
            RELEASE_LEASE_SCRIPT,
            &[self.lock_key(lock_id), self.lease_key(lock_id)],
            &[token.as_str().to_owned()],
        )
        .await
    }
}
