//! Per-store observability counters.
//!
//! All counters are monotonic and contention-free; names in the exported
//! map match the `meta_*` stat surface of the wider system.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Increment a stat counter.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Counters tracked by one [`crate::TimerStore`].
#[derive(Debug, Default)]
pub(crate) struct TimerStats {
    pub cancel: AtomicU64,
    pub cancel_success: AtomicU64,
    pub del: AtomicU64,
    pub del_success: AtomicU64,
    pub set: AtomicU64,
    pub set_success: AtomicU64,
    pub timer_in_past: AtomicU64,
    pub timer_in_future_fired: AtomicU64,
    pub alarm_missing: AtomicU64,
    pub context_missing: AtomicU64,
    pub cancel_alarm_missing: AtomicU64,
    pub cancel_context_missing: AtomicU64,
    pub scan_due: AtomicU64,
    pub scan_row: AtomicU64,
    pub scan_row_lookup: AtomicU64,
    pub scan_column: AtomicU64,
    pub scan_column_lookup: AtomicU64,
    pub sync_span: AtomicU64,
    /// Declared for stats-surface compatibility; never incremented.
    pub external_span_change: AtomicU64,
    pub span_start_change: AtomicU64,
    pub span_stop_change: AtomicU64,
    pub span_cas_mismatch: AtomicU64,
}

impl TimerStats {
    /// Snapshot every counter under its exported name.
    pub(crate) fn to_map(&self) -> HashMap<&'static str, u64> {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        HashMap::from([
            ("meta_cancel", load(&self.cancel)),
            ("meta_cancel_success", load(&self.cancel_success)),
            ("meta_del", load(&self.del)),
            ("meta_del_success", load(&self.del_success)),
            ("meta_set", load(&self.set)),
            ("meta_set_success", load(&self.set_success)),
            ("meta_timer_in_past", load(&self.timer_in_past)),
            ("meta_timer_in_future_fired", load(&self.timer_in_future_fired)),
            ("meta_alarm_missing", load(&self.alarm_missing)),
            ("meta_context_missing", load(&self.context_missing)),
            ("meta_cancel_alarm_missing", load(&self.cancel_alarm_missing)),
            ("meta_cancel_context_missing", load(&self.cancel_context_missing)),
            ("meta_scan_due", load(&self.scan_due)),
            ("meta_scan_row", load(&self.scan_row)),
            ("meta_scan_row_lookup", load(&self.scan_row_lookup)),
            ("meta_scan_column", load(&self.scan_column)),
            ("meta_scan_column_lookup", load(&self.scan_column_lookup)),
            ("meta_sync_span", load(&self.sync_span)),
            ("meta_external_span_change", load(&self.external_span_change)),
            ("meta_span_start_change", load(&self.span_start_change)),
            ("meta_span_stop_change", load(&self.span_stop_change)),
            ("meta_span_cas_mismatch", load(&self.span_cas_mismatch)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_covers_every_counter() {
        let stats = TimerStats::default();
        bump(&stats.set);
        bump(&stats.set);
        bump(&stats.scan_due);
        let map = stats.to_map();
        assert_eq!(map.len(), 22);
        assert_eq!(map["meta_set"], 2);
        assert_eq!(map["meta_scan_due"], 1);
        assert_eq!(map["meta_cancel"], 0);
    }
}
