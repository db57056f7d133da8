//! The KV client trait consumed by the timer store.

use async_trait::async_trait;

use crate::error::Result;
use crate::kv::Cas;
use crate::kv::CounterResult;
use crate::kv::GetResult;
use crate::kv::InsertResult;
use crate::kv::RemoveResult;
use crate::kv::ReplaceResult;

/// Client for a distributed key-value bucket with CAS support.
///
/// Document bodies cross this seam as JSON text; interpretation is the
/// caller's business. `expiry_secs` of zero means no expiry.
///
/// Implementations obtained from [`crate::pool`] are wrapped in
/// [`crate::Retrying`], so every method here either succeeds or fails with
/// [`crate::KvError::RetryTimeout`]; `absent` and `mismatch` outcomes are
/// reported in the result structs rather than as errors.
#[async_trait]
pub trait KvClient: Send + Sync + std::fmt::Debug {
    /// Atomically add `delta` to the integer document at `key`, creating it
    /// with value `init` when absent. Returns the post-operation value.
    async fn counter(&self, bucket: &str, key: &str, delta: i64, init: i64, expiry_secs: u32) -> Result<CounterResult>;

    /// Unconditionally create or overwrite the document at `key`.
    async fn upsert(&self, bucket: &str, key: &str, value: String, expiry_secs: u32) -> Result<Cas>;

    /// Create the document at `key`; `mismatch` when it already exists.
    async fn insert(&self, bucket: &str, key: &str, value: String, expiry_secs: u32) -> Result<InsertResult>;

    /// Overwrite the document at `key` iff its CAS matches `cas`.
    async fn replace(&self, bucket: &str, key: &str, value: String, cas: Cas, expiry_secs: u32)
    -> Result<ReplaceResult>;

    /// Read the document at `key` along with its CAS.
    async fn get(&self, bucket: &str, key: &str) -> Result<GetResult>;

    /// Remove the document at `key`. A non-[`Cas::NONE`] `cas` makes the
    /// removal conditional on the document's current CAS.
    async fn remove(&self, bucket: &str, key: &str, cas: Cas) -> Result<RemoveResult>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: KvClient + ?Sized> KvClient for std::sync::Arc<T> {
    async fn counter(&self, bucket: &str, key: &str, delta: i64, init: i64, expiry_secs: u32) -> Result<CounterResult> {
        (**self).counter(bucket, key, delta, init, expiry_secs).await
    }

    async fn upsert(&self, bucket: &str, key: &str, value: String, expiry_secs: u32) -> Result<Cas> {
        (**self).upsert(bucket, key, value, expiry_secs).await
    }

    async fn insert(&self, bucket: &str, key: &str, value: String, expiry_secs: u32) -> Result<InsertResult> {
        (**self).insert(bucket, key, value, expiry_secs).await
    }

    async fn replace(
        &self,
        bucket: &str,
        key: &str,
        value: String,
        cas: Cas,
        expiry_secs: u32,
    ) -> Result<ReplaceResult> {
        (**self).replace(bucket, key, value, cas, expiry_secs).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<GetResult> {
        (**self).get(bucket, key).await
    }

    async fn remove(&self, bucket: &str, key: &str, cas: Cas) -> Result<RemoveResult> {
        (**self).remove(bucket, key, cas).await
    }
}
