//! Run-overlap guards for scheduled jobs
//!
//! A job holds its lock for the length of one pass. `try_acquire` never waits: if the
//! name is already held the caller skips the run.
//!
//! - [`LocalJobLock`]: in-process "in progress" flag per job name
//! - [`RedisJobLock`]: lease shared by every worker instance on the same Redis

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::warn;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Lock name used by the recurring invoice pass
pub const RECURRING_INVOICES_JOB: &str = "recurring-invoices";

#[async_trait]
pub trait JobLock: Send + Sync {
    /// Take the lock for `job`. Returns `false` if someone else holds it.
    async fn try_acquire(&self, job: &str) -> BillingResult<bool>;

    /// Give the lock back. Releasing a lock this holder does not own is a no-op.
    async fn release(&self, job: &str) -> BillingResult<()>;
}

/// In-process lock
#[derive(Debug, Default)]
pub struct LocalJobLock {
    held: Mutex<HashSet<String>>,
}

impl LocalJobLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, job: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(job)
    }
}

#[async_trait]
impl JobLock for LocalJobLock {
    async fn try_acquire(&self, job: &str) -> BillingResult<bool> {
        Ok(self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job.to_string()))
    }

    async fn release(&self, job: &str) -> BillingResult<()> {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(job);
        Ok(())
    }
}

/// Delete the key only if it still carries our token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis lease lock. The TTL bounds how long a crashed holder can block other
/// instances.
#[derive(Clone)]
pub struct RedisJobLock {
    conn: ConnectionManager,
    token: String,
    ttl: Duration,
    key_prefix: String,
}

impl RedisJobLock {
    pub async fn connect(redis_url: &str, ttl: Duration) -> BillingResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BillingError::Config(format!("Invalid REDIS_URL: {}", e)))?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            token: Uuid::new_v4().to_string(),
            ttl,
            key_prefix: "recurbill:job-lock:".to_string(),
        })
    }

    fn key(&self, job: &str) -> String {
        format!("{}{}", self.key_prefix, job)
    }
}

#[async_trait]
impl JobLock for RedisJobLock {
    async fn try_acquire(&self, job: &str) -> BillingResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(job))
            .arg(&self.token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn release(&self, job: &str) -> BillingResult<()> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.key(job))
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await?;

        if deleted == 0 {
            warn!(job = %job, "Job lock had already expired or changed hands before release");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_lock_is_exclusive_per_job() {
        let lock = LocalJobLock::new();

        assert!(lock.try_acquire(RECURRING_INVOICES_JOB).await.unwrap());
        assert!(!lock.try_acquire(RECURRING_INVOICES_JOB).await.unwrap());
        assert!(lock.try_acquire("other-job").await.unwrap());
        assert!(lock.is_held(RECURRING_INVOICES_JOB));

        lock.release(RECURRING_INVOICES_JOB).await.unwrap();
        assert!(!lock.is_held(RECURRING_INVOICES_JOB));
        assert!(lock.try_acquire(RECURRING_INVOICES_JOB).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_lock_excludes_second_holder() {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL required");
        let first = RedisJobLock::connect(&url, Duration::from_secs(30)).await.unwrap();
        let second = RedisJobLock::connect(&url, Duration::from_secs(30)).await.unwrap();
        let job = format!("test-{}", Uuid::new_v4());

        assert!(first.try_acquire(&job).await.unwrap());
        assert!(!second.try_acquire(&job).await.unwrap());

        // A non-holder's release leaves the lock in place
        second.release(&job).await.unwrap();
        assert!(!second.try_acquire(&job).await.unwrap());

        first.release(&job).await.unwrap();
        assert!(second.try_acquire(&job).await.unwrap());
        second.release(&job).await.unwrap();
    }
}
