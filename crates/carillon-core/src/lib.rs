//! KV client seam for the carillon timer store.
//!
//! This crate defines the interface the timer subsystem consumes from an
//! external distributed key-value bucket:
//!
//! - [`KvClient`] - the six CAS-aware document operations
//! - [`Cas`] - the compare-and-swap token attached to every document
//! - [`pool`] - process-wide client directory keyed by connection string
//! - [`Retrying`] - decorator that reduces transient faults to
//!   [`KvError::RetryTimeout`], the only error callers ever observe
//! - [`MemoryKvClient`] - deterministic in-memory backend for tests and
//!   single-process embedders, provisioned under `memory://` connection
//!   strings
//!
//! Backends for real clusters are registered at startup through
//! [`pool::register`]; the rest of the system only ever sees
//! `Arc<dyn KvClient>`.

#![warn(missing_docs)]

mod error;
mod kv;
mod memory;
pub mod pool;
mod retry;
mod traits;

pub use error::KvError;
pub use error::Result;
pub use kv::Cas;
pub use kv::CounterResult;
pub use kv::GetResult;
pub use kv::InsertResult;
pub use kv::RemoveResult;
pub use kv::ReplaceResult;
pub use memory::MemoryKvClient;
pub use pool::PoolError;
pub use retry::Retrying;
pub use retry::RetryConfig;
pub use traits::KvClient;
