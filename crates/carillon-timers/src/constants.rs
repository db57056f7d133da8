//! Fixed parameters of the timer data model.

/// Width of a time bucket in seconds. Every due time is rounded up to a
/// multiple of this; the scan walks rows in these steps.
pub const RESOLUTION_SECS: i64 = 7;

/// Initial value of a bucket's root counter. The first alarm allocated in a
/// bucket gets this sequence; the column scan probes `[INIT_SEQ ..= root]`.
pub const INIT_SEQ: i64 = 128;
