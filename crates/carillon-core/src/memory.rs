//! Deterministic in-memory KV backend.
//!
//! Implements the full [`KvClient`] contract over process memory. Used by
//! the test suites and by single-process embedders; the pool provisions one
//! instance per distinct `memory://` connection string.
//!
//! Expiry values are accepted and ignored: documents live until removed.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use snafu::OptionExt;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::error::TransientSnafu;
use crate::kv::Cas;
use crate::kv::CounterResult;
use crate::kv::GetResult;
use crate::kv::InsertResult;
use crate::kv::RemoveResult;
use crate::kv::ReplaceResult;
use crate::traits::KvClient;

/// A stored document: JSON body plus its current CAS.
#[derive(Debug, Clone)]
struct Doc {
    value: String,
    cas: u64,
}

/// In-memory [`KvClient`] with per-document CAS semantics.
#[derive(Debug, Default)]
pub struct MemoryKvClient {
    /// bucket name -> key -> document
    buckets: RwLock<HashMap<String, BTreeMap<String, Doc>>>,
    /// Monotonic CAS source shared by all buckets.
    revision: AtomicU64,
}

impl MemoryKvClient {
    /// Create a new empty backend wrapped in `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_cas(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of documents currently stored in `bucket`.
    pub async fn doc_count(&self, bucket: &str) -> usize {
        let buckets = self.buckets.read().await;
        buckets.get(bucket).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn counter(&self, bucket: &str, key: &str, delta: i64, init: i64, _expiry_secs: u32) -> Result<CounterResult> {
        let mut buckets = self.buckets.write().await;
        let docs = buckets.entry(bucket.to_string()).or_default();
        let cas = self.next_cas();
        let value = match docs.get(key) {
            Some(doc) => {
                let current: i64 = doc.value.trim().parse().ok().context(TransientSnafu {
                    operation: "counter",
                    reason: format!("document at '{key}' is not an integer"),
                })?;
                current + delta
            }
            None => init,
        };
        docs.insert(key.to_string(), Doc {
            value: value.to_string(),
            cas,
        });
        Ok(CounterResult { value, cas: Cas(cas) })
    }

    async fn upsert(&self, bucket: &str, key: &str, value: String, _expiry_secs: u32) -> Result<Cas> {
        let mut buckets = self.buckets.write().await;
        let docs = buckets.entry(bucket.to_string()).or_default();
        let cas = self.next_cas();
        docs.insert(key.to_string(), Doc { value, cas });
        Ok(Cas(cas))
    }

    async fn insert(&self, bucket: &str, key: &str, value: String, _expiry_secs: u32) -> Result<InsertResult> {
        let mut buckets = self.buckets.write().await;
        let docs = buckets.entry(bucket.to_string()).or_default();
        if docs.contains_key(key) {
            return Ok(InsertResult {
                cas: Cas::NONE,
                mismatch: true,
            });
        }
        let cas = self.next_cas();
        docs.insert(key.to_string(), Doc { value, cas });
        Ok(InsertResult {
            cas: Cas(cas),
            mismatch: false,
        })
    }

    async fn replace(
        &self,
        bucket: &str,
        key: &str,
        value: String,
        cas: Cas,
        _expiry_secs: u32,
    ) -> Result<ReplaceResult> {
        let mut buckets = self.buckets.write().await;
        let docs = buckets.entry(bucket.to_string()).or_default();
        let Some(doc) = docs.get_mut(key) else {
            return Ok(ReplaceResult {
                cas: Cas::NONE,
                absent: true,
                mismatch: false,
            });
        };
        if !cas.is_none() && doc.cas != cas.0 {
            return Ok(ReplaceResult {
                cas: Cas::NONE,
                absent: false,
                mismatch: true,
            });
        }
        let new_cas = self.next_cas();
        doc.value = value;
        doc.cas = new_cas;
        Ok(ReplaceResult {
            cas: Cas(new_cas),
            absent: false,
            mismatch: false,
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<GetResult> {
        let buckets = self.buckets.read().await;
        match buckets.get(bucket).and_then(|docs| docs.get(key)) {
            Some(doc) => Ok(GetResult {
                cas: Cas(doc.cas),
                value: Some(doc.value.clone()),
            }),
            None => Ok(GetResult {
                cas: Cas::NONE,
                value: None,
            }),
        }
    }

    async fn remove(&self, bucket: &str, key: &str, cas: Cas) -> Result<RemoveResult> {
        let mut buckets = self.buckets.write().await;
        let docs = buckets.entry(bucket.to_string()).or_default();
        let Some(doc) = docs.get(key) else {
            return Ok(RemoveResult {
                cas: Cas::NONE,
                absent: true,
                mismatch: false,
            });
        };
        if !cas.is_none() && doc.cas != cas.0 {
            return Ok(RemoveResult {
                cas: Cas::NONE,
                absent: false,
                mismatch: true,
            });
        }
        let observed = Cas(doc.cas);
        docs.remove(key);
        Ok(RemoveResult {
            cas: observed,
            absent: false,
            mismatch: false,
        })
    }
}
