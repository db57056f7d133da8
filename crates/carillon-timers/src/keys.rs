//! Deterministic KV key derivation.
//!
//! All documents of a store live under the prefix `{uid}:tm:{partn}`:
//!
//! ```text
//! {uid}:tm:{partn}:rt:{dueBase36}        root counter for one bucket
//! {uid}:tm:{partn}:al:{dueBase36}:{seq}  alarm record
//! {uid}:tm:{partn}:cx:{hash27}           context record
//! {uid}:tm:{partn}:sp                    span record
//! ```
//!
//! The shapes are wire contracts: context keys must be identical across
//! every writer of a bucket, so both the base-36 time encoding and the
//! 27-character digest re-encoding are bit-exact and must not change.

use ripemd::Digest;
use ripemd::Ripemd160;

/// 64-symbol alphabet for digest re-encoding, 6 bits per symbol.
const DICT: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789*&";

/// Digit alphabet for base-36 time encoding.
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Key factory for one `(uid, partn)` store.
#[derive(Debug, Clone)]
pub(crate) struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    pub(crate) fn new(uid: &str, partn: u32) -> Self {
        Self {
            prefix: format!("{uid}:tm:{partn}"),
        }
    }

    /// Key of the root counter for the bucket at `due`.
    pub(crate) fn root(&self, due: i64) -> String {
        format!("{}:rt:{}", self.prefix, format_int(due))
    }

    /// Key of the alarm record at `(due, seq)`.
    pub(crate) fn alarm(&self, due: i64, seq: i64) -> String {
        format!("{}:al:{}:{}", self.prefix, format_int(due), seq)
    }

    /// Key of the context record for a caller-supplied reference.
    pub(crate) fn context(&self, reference: &str) -> String {
        format!("{}:cx:{}", self.prefix, hash_ref(reference))
    }

    /// Key of the store's span record.
    pub(crate) fn span(&self) -> String {
        format!("{}:sp", self.prefix)
    }
}

/// Encode a time value in lowercase base-36.
pub(crate) fn format_int(val: i64) -> String {
    if val == 0 {
        return "0".to_string();
    }
    let mut n = (val as i128).unsigned_abs();
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    if val < 0 {
        digits.push(b'-');
    }
    digits.iter().rev().map(|&b| b as char).collect()
}

/// Re-encode the RIPEMD-160 digest of `val` as 27 symbols of [`DICT`].
///
/// Bits are consumed low-to-high within each digest byte and packed
/// high-to-low into 6-bit symbols; the final symbol carries the 4
/// leftover bits. 160 bits -> 26 full symbols + 1 partial.
pub(crate) fn hash_ref(val: &str) -> String {
    let mut ripe = Ripemd160::new();
    ripe.update(val.as_bytes());
    let sum = ripe.finalize();

    let mut out = String::with_capacity(27);
    let mut symbol = 0usize;
    for pos in 0..160 {
        let bit = (sum[pos / 8] >> (pos % 8)) & 1;
        symbol = symbol << 1 | bit as usize;
        if pos % 6 == 5 {
            out.push(DICT[symbol] as char);
            symbol = 0;
        }
    }
    out.push(DICT[symbol] as char);
    out
}
