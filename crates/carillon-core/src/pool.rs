//! Process-wide KV client pool.
//!
//! Clients are shared by connection string: every subsystem asking for the
//! same connstr gets the same `Arc<dyn KvClient>`, already wrapped in the
//! retry decorator. Real cluster backends are registered at startup via
//! [`register`]; `memory://` connstrs are provisioned on demand with an
//! isolated [`MemoryKvClient`] per distinct string.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::PoisonError;
use std::sync::RwLock;

use snafu::Snafu;
use tracing::debug;

use crate::memory::MemoryKvClient;
use crate::retry::Retrying;
use crate::retry::RetryConfig;
use crate::traits::KvClient;

/// Scheme prefix that provisions an in-memory backend.
const MEMORY_SCHEME: &str = "memory://";

static POOL: LazyLock<RwLock<HashMap<String, Arc<dyn KvClient>>>> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// Errors from pool lookup.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PoolError {
    /// No client is registered for the connection string and its scheme is
    /// not auto-provisioned.
    #[snafu(display("no kv client registered for '{connstr}'"))]
    UnknownEndpoint {
        /// The unresolvable connection string.
        connstr: String,
    },
}

/// Register a client for a connection string, replacing any previous one.
///
/// The caller is responsible for the client's retry behavior; wrap it in
/// [`Retrying`] unless it already guarantees the retry-timeout contract.
pub fn register(connstr: impl Into<String>, client: Arc<dyn KvClient>) {
    let connstr = connstr.into();
    debug!(%connstr, "registering kv client");
    let mut pool = POOL.write().unwrap_or_else(PoisonError::into_inner);
    pool.insert(connstr, client);
}

/// Resolve the shared client for a connection string.
pub fn client(connstr: &str) -> Result<Arc<dyn KvClient>, PoolError> {
    {
        let pool = POOL.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = pool.get(connstr) {
            return Ok(Arc::clone(client));
        }
    }

    if !connstr.starts_with(MEMORY_SCHEME) {
        return UnknownEndpointSnafu { connstr }.fail();
    }

    let mut pool = POOL.write().unwrap_or_else(PoisonError::into_inner);
    // Double-check: another task may have provisioned while unlocked.
    let client = pool
        .entry(connstr.to_string())
        .or_insert_with(|| {
            debug!(%connstr, "provisioning in-memory kv client");
            Arc::new(Retrying::new(MemoryKvClient::default(), RetryConfig::default()))
        });
    Ok(Arc::clone(client))
}
