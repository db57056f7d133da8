//! Retry decorator for KV clients.
//!
//! Wraps any [`KvClient`] and absorbs [`KvError::Transient`] faults with
//! jittered exponential backoff. Once the attempt budget is spent the
//! caller sees [`KvError::RetryTimeout`], the single error of the public
//! contract.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::error::KvError;
use crate::error::Result;
use crate::error::RetryTimeoutSnafu;
use crate::kv::Cas;
use crate::kv::CounterResult;
use crate::kv::GetResult;
use crate::kv::InsertResult;
use crate::kv::RemoveResult;
use crate::kv::ReplaceResult;
use crate::traits::KvClient;

/// Retry policy for a wrapped client.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts before giving up, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on the backoff delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 1_000,
        }
    }
}

/// A [`KvClient`] that retries transient faults of an inner client.
#[derive(Debug)]
pub struct Retrying<C> {
    inner: C,
    config: RetryConfig,
}

impl<C: KvClient> Retrying<C> {
    /// Wrap `inner` with the given retry policy.
    pub fn new(inner: C, config: RetryConfig) -> Self {
        assert!(config.max_attempts > 0, "retry budget must allow at least one attempt");
        Self { inner, config }
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff_ms = self.config.initial_backoff_ms;
        for attempt in 1..=self.config.max_attempts {
            match op().await {
                Err(KvError::Transient { reason, .. }) => {
                    debug!(operation, attempt, %reason, "retrying transient kv failure");
                    if attempt == self.config.max_attempts {
                        break;
                    }
                    // Rng is not Send; compute the delay before suspending.
                    let jitter = rand::rng().random_range(0..=backoff_ms / 2);
                    tokio::time::sleep(Duration::from_millis(backoff_ms + jitter)).await;
                    backoff_ms = (backoff_ms * 2).min(self.config.max_backoff_ms);
                }
                other => return other,
            }
        }
        RetryTimeoutSnafu {
            operation,
            attempts: self.config.max_attempts,
        }
        .fail()
    }
}

#[async_trait]
impl<C: KvClient> KvClient for Retrying<C> {
    async fn counter(&self, bucket: &str, key: &str, delta: i64, init: i64, expiry_secs: u32) -> Result<CounterResult> {
        self.run("counter", || self.inner.counter(bucket, key, delta, init, expiry_secs)).await
    }

    async fn upsert(&self, bucket: &str, key: &str, value: String, expiry_secs: u32) -> Result<Cas> {
        self.run("upsert", || self.inner.upsert(bucket, key, value.clone(), expiry_secs)).await
    }

    async fn insert(&self, bucket: &str, key: &str, value: String, expiry_secs: u32) -> Result<InsertResult> {
        self.run("insert", || self.inner.insert(bucket, key, value.clone(), expiry_secs)).await
    }

    async fn replace(
        &self,
        bucket: &str,
        key: &str,
        value: String,
        cas: Cas,
        expiry_secs: u32,
    ) -> Result<ReplaceResult> {
        self.run("replace", || self.inner.replace(bucket, key, value.clone(), cas, expiry_secs)).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<GetResult> {
        self.run("get", || self.inner.get(bucket, key)).await
    }

    async fn remove(&self, bucket: &str, key: &str, cas: Cas) -> Result<RemoveResult> {
        self.run("remove", || self.inner.remove(bucket, key, cas)).await
    }
}
