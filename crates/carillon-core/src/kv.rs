//! Operation result types for the KV seam.
//!
//! Every mutation returns the document's new [`Cas`] token; conditional
//! outcomes (`absent`, `mismatch`) are semantic facts, not errors.

use std::fmt;

/// Compare-and-swap token attached to every stored document.
///
/// A token of [`Cas::NONE`] passed to a conditional operation means "no
/// precondition".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cas(pub u64);

impl Cas {
    /// The absent / unconditional token.
    pub const NONE: Cas = Cas(0);

    /// Whether this token carries a precondition.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Result of an atomic counter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterResult {
    /// Counter value after the operation (the initial value on creation).
    pub value: i64,
    /// CAS of the counter document after the operation.
    pub cas: Cas,
}

/// Result of an insert (create-if-absent) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertResult {
    /// CAS of the created document; meaningless when `mismatch` is set.
    pub cas: Cas,
    /// Set when the document already existed.
    pub mismatch: bool,
}

/// Result of a CAS-guarded replace operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceResult {
    /// CAS of the replaced document; meaningless on `absent`/`mismatch`.
    pub cas: Cas,
    /// Set when no document existed at the key.
    pub absent: bool,
    /// Set when the document's CAS did not match the precondition.
    pub mismatch: bool,
}

/// Result of a get operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    /// CAS of the document at read time; [`Cas::NONE`] when absent.
    pub cas: Cas,
    /// The document body, or `None` when absent.
    pub value: Option<String>,
}

impl GetResult {
    /// Whether the document was absent.
    pub fn absent(&self) -> bool {
        self.value.is_none()
    }
}

/// Result of a remove operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveResult {
    /// CAS observed by the removal; [`Cas::NONE`] when nothing was removed.
    pub cas: Cas,
    /// Set when no document existed at the key.
    pub absent: bool,
    /// Set when the document's CAS did not match the precondition.
    pub mismatch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_cas_is_unconditional() {
        assert!(Cas::NONE.is_none());
        assert!(Cas::default().is_none());
        assert!(!Cas(42).is_none());
    }

    #[test]
    fn cas_displays_as_hex() {
        assert_eq!(Cas(255).to_string(), "0xff");
    }

    #[test]
    fn get_result_absent_tracks_value() {
        let hit = GetResult {
            cas: Cas(1),
            value: Some("{}".to_string()),
        };
        let miss = GetResult {
            cas: Cas::NONE,
            value: None,
        };
        assert!(!hit.absent());
        assert!(miss.absent());
    }
}
