//! Error types for KV operations.

use snafu::Snafu;

/// Result type for KV operations.
pub type Result<T, E = KvError> = std::result::Result<T, E>;

/// Errors surfaced by [`crate::KvClient`] implementations.
///
/// The public contract is deliberately narrow: callers behind the pool's
/// retry decorator only ever observe `RetryTimeout`. `Transient` exists for
/// backends to report recoverable faults to the retry layer and must not
/// escape it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum KvError {
    /// A recoverable backend fault. Consumed by [`crate::Retrying`].
    #[snafu(display("transient kv failure in {operation}: {reason}"))]
    Transient {
        /// Operation that failed.
        operation: &'static str,
        /// Backend-specific fault description.
        reason: String,
    },

    /// The retry budget for an operation was exhausted.
    #[snafu(display("kv operation {operation} gave up after {attempts} attempts"))]
    RetryTimeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

impl KvError {
    /// Whether this error is retry exhaustion.
    pub fn is_retry_timeout(&self) -> bool {
        matches!(self, KvError::RetryTimeout { .. })
    }
}
