//! Scan iterator over due alarms.
//!
//! A two-level cursor: rows walk the time buckets in `[span.start,
//! min(now, span.stop)]`, columns walk the alarm sequences `[INIT_SEQ ..=
//! root]` within each bucket. The root counter read per row doubles as the
//! column upper bound, so no index of occupied columns is needed; holes
//! from cancellation and deletion are probed and skipped.
//!
//! The iterator holds no locks and no KV handles. Mutations concurrent
//! with a scan show up as skipped entries (cancel, supersede) or missed
//! entries (a set outside the row window after the scan started), both
//! fine under the at-least-once contract.

use carillon_core::Cas;
use carillon_core::KvClient;
use snafu::ResultExt;
use tracing::debug;
use tracing::trace;

use crate::clock::round_down;
use crate::constants::INIT_SEQ;
use crate::constants::RESOLUTION_SECS;
use crate::error::KvSnafu;
use crate::error::Result;
use crate::stats::bump;
use crate::store::TimerStore;
use crate::store::decode;
use crate::types::AlarmRecord;
use crate::types::ContextRecord;
use crate::types::TimerEntry;

/// Cursor over time buckets.
#[derive(Debug)]
struct RowIter {
    start: i64,
    stop: i64,
    current: i64,
}

/// Cursor over alarm sequences within one bucket.
#[derive(Debug)]
struct ColIter {
    stop: i64,
    current: i64,
    top_cas: Cas,
}

/// Iterator over alarms whose due time has passed.
///
/// Obtained from [`TimerStore::scan_due`]; advance with
/// [`TimerIter::scan_next`] until it yields `None`.
pub struct TimerIter<'a> {
    store: &'a TimerStore,
    row: RowIter,
    col: Option<ColIter>,
}

impl TimerStore {
    /// Begin a scan of alarms due by now.
    ///
    /// Returns `None` when the span lies entirely in the future, i.e.
    /// nothing can be due.
    pub async fn scan_due(&self) -> Option<TimerIter<'_>> {
        let span = self.span.read().await;
        let now = round_down(self.clock.now_unix());

        bump(&self.stats.scan_due);
        if span.start > now {
            return None;
        }

        let stop = now.min(span.stop);
        trace!(store = %self.log, start = span.start, stop, "created scan iterator");
        Some(TimerIter {
            store: self,
            row: RowIter {
                start: span.start,
                current: span.start,
                stop,
            },
            col: None,
        })
    }
}

impl TimerIter<'_> {
    /// Yield the next alive entry, in (bucket, sequence) order.
    ///
    /// Entries whose context was cancelled, rebound, or lost are skipped
    /// silently. `Ok(None)` means the scan window is exhausted.
    pub async fn scan_next(&mut self) -> Result<Option<TimerEntry>> {
        loop {
            if let Some(entry) = self.next_column().await? {
                if entry.alarm_due > self.store.clock.now_unix() {
                    bump(&self.store.stats.timer_in_future_fired);
                }
                return Ok(Some(entry));
            }
            if !self.next_row().await? {
                return Ok(None);
            }
        }
    }

    /// Advance to the next occupied bucket, priming the column cursor from
    /// its root counter. At window exhaustion the span start is advanced
    /// past the confirmed-empty range.
    async fn next_row(&mut self) -> Result<bool> {
        bump(&self.store.stats.scan_row);
        trace!(store = %self.store.log, start = self.row.start, current = self.row.current, "looking for next row");

        self.col = None;
        while self.row.current < self.row.stop {
            self.row.current += RESOLUTION_SECS;

            let pos = self.store.keys.root(self.row.current);
            bump(&self.store.stats.scan_row_lookup);
            let read = self.store.client.get(&self.store.bucket, &pos).await.context(KvSnafu)?;
            if let Some(raw) = read.value {
                let stop: i64 = decode(&pos, &raw)?;
                self.col = Some(ColIter {
                    stop,
                    current: INIT_SEQ,
                    top_cas: read.cas,
                });
                trace!(store = %self.store.log, row = self.row.current, "found row");
                return Ok(true);
            }
        }

        trace!(store = %self.store.log, stop = self.row.stop, "found no rows");
        self.store.span.shrink(self.row.stop - RESOLUTION_SECS).await;
        Ok(false)
    }

    /// Probe columns in the current row until an alive entry turns up.
    async fn next_column(&mut self) -> Result<Option<TimerEntry>> {
        bump(&self.store.stats.scan_column);
        trace!(store = %self.store.log, row = self.row.current, "looking for next column");

        let store = self.store;
        let Some(col) = self.col.as_mut() else {
            return Ok(None);
        };

        while col.current <= col.stop {
            let current = col.current;
            col.current += 1;

            let alarm_key = store.keys.alarm(self.row.current, current);
            bump(&store.stats.scan_column_lookup);
            let read = store.client.get(&store.bucket, &alarm_key).await.context(KvSnafu)?;
            let Some(raw) = read.value else {
                debug!(store = %store.log, key = %alarm_key, "skipping missing entry in chain");
                continue;
            };
            let alarm: AlarmRecord = decode(&alarm_key, &raw)?;

            bump(&store.stats.scan_column_lookup);
            let read = store.client.get(&store.bucket, &alarm.context_ref).await.context(KvSnafu)?;
            let ctx_cas = read.cas;
            let Some(raw) = read.value else {
                debug!(store = %store.log, key = %alarm_key, "alarm cancelled, skipping");
                continue;
            };
            let ctx: ContextRecord = decode(&alarm.context_ref, &raw)?;
            if ctx.alarm_ref != alarm_key {
                debug!(store = %store.log, key = %alarm_key, "alarm superseded, skipping");
                continue;
            }

            let entry = TimerEntry {
                alarm_due: alarm.alarm_due,
                alarm_ref: ctx.alarm_ref,
                context_ref: alarm.context_ref,
                context: ctx.context,
                alarm_seq: current,
                ctx_cas,
                // Only the reader of the last column may retire the root,
                // and only with the CAS it observed.
                top_cas: if current == col.stop { col.top_cas } else { Cas::NONE },
            };
            trace!(store = %store.log, due = entry.alarm_due, seq = current, "scan returning timer");
            return Ok(Some(entry));
        }

        trace!(store = %store.log, row = self.row.current, "column scan finished");
        Ok(None)
    }
}
