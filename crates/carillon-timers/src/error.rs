//! Error types for timer store operations.

use carillon_core::KvError;
use carillon_core::PoolError;
use snafu::Snafu;

/// Result type for timer store operations.
pub type Result<T, E = TimerError> = std::result::Result<T, E>;

/// Errors surfaced by the timer store.
///
/// The operational contract is narrow: KV faults reach callers only as
/// retry exhaustion (`Kv` wrapping [`KvError::RetryTimeout`]). `Corrupted`
/// reports an undecodable persisted record, and `Endpoint` can only occur
/// while opening a store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TimerError {
    /// A KV operation failed after exhausting its retry budget.
    #[snafu(display("kv operation failed: {source}"))]
    Kv {
        /// The underlying client error.
        source: KvError,
    },

    /// A persisted record could not be decoded.
    #[snafu(display("record at '{key}' is corrupted: {reason}"))]
    Corrupted {
        /// Key of the offending document.
        key: String,
        /// Decoder diagnostics.
        reason: String,
    },

    /// The store's connection string resolves to no registered client.
    #[snafu(display("cannot resolve kv endpoint: {source}"))]
    Endpoint {
        /// The pool lookup failure.
        source: PoolError,
    },
}

impl TimerError {
    /// Whether this error is KV retry exhaustion.
    pub fn is_retry_timeout(&self) -> bool {
        matches!(
            self,
            TimerError::Kv {
                source: KvError::RetryTimeout { .. }
            }
        )
    }
}
