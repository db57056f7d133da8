//! The per-(uid, partition) timer store.
//!
//! A [`TimerStore`] schedules context-carrying alarms in a shared KV
//! bucket, using a bucketed temporal index: each `RESOLUTION_SECS`-wide
//! bucket owns a root counter that allocates alarm sequences at write time
//! and bounds the column scan at read time. Alarms persist as two
//! cross-linked records so cancellation and supersession resolve through
//! the caller's reference without touching the temporal index.

use std::collections::HashMap;
use std::sync::Arc;

use carillon_core::Cas;
use carillon_core::KvClient;
use carillon_core::pool;
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use tracing::debug;
use tracing::trace;

use crate::clock::SystemClock;
use crate::clock::TimeSource;
use crate::clock::round_down;
use crate::clock::round_up;
use crate::constants::INIT_SEQ;
use crate::constants::RESOLUTION_SECS;
use crate::error::CorruptedSnafu;
use crate::error::EndpointSnafu;
use crate::error::KvSnafu;
use crate::error::Result;
use crate::error::TimerError;
use crate::keys::KeyLayout;
use crate::span::SpanTracker;
use crate::stats::TimerStats;
use crate::stats::bump;
use crate::types::AlarmRecord;
use crate::types::ContextRecord;
use crate::types::Span;
use crate::types::TimerEntry;

/// Decode a persisted document, reporting the key on failure.
pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|error| {
        CorruptedSnafu {
            key,
            reason: error.to_string(),
        }
        .build()
    })
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|error| {
        CorruptedSnafu {
            key,
            reason: error.to_string(),
        }
        .build()
    })
}

/// Persistent timer store for one `(uid, partn)` pair.
///
/// All operations may run concurrently; see [`crate::TimerIter`] for what
/// concurrent mutation means for in-flight scans.
pub struct TimerStore {
    pub(crate) client: Arc<dyn KvClient>,
    pub(crate) bucket: String,
    uid: String,
    partn: u32,
    pub(crate) log: String,
    pub(crate) keys: KeyLayout,
    pub(crate) clock: Arc<dyn TimeSource>,
    pub(crate) span: SpanTracker,
    pub(crate) stats: TimerStats,
}

impl std::fmt::Debug for TimerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerStore")
            .field("uid", &self.uid)
            .field("partn", &self.partn)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl TimerStore {
    /// Open a store against the bucket behind `connstr`, loading (or
    /// creating) its persisted span. The store is not registered; use
    /// [`crate::create`] for registry-managed stores.
    pub async fn open(uid: &str, partn: u32, connstr: &str, bucket: &str) -> Result<Self> {
        Self::open_with_clock(uid, partn, connstr, bucket, Arc::new(SystemClock)).await
    }

    /// [`TimerStore::open`] with an explicit time source.
    pub async fn open_with_clock(
        uid: &str,
        partn: u32,
        connstr: &str,
        bucket: &str,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        let client = pool::client(connstr).context(EndpointSnafu)?;
        let store = Self {
            client,
            bucket: bucket.to_string(),
            uid: uid.to_string(),
            partn,
            log: format!("timerstore:{uid}:{partn}"),
            keys: KeyLayout::new(uid, partn),
            clock,
            span: SpanTracker::new(),
            stats: TimerStats::default(),
        };
        store.sync_span().await?;
        trace!(store = %store.log, "initialized timer store");
        Ok(store)
    }

    /// The store's uid.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The store's partition.
    pub fn partition(&self) -> u32 {
        self.partn
    }

    /// Snapshot the observability counters, keyed by exported stat name.
    pub fn stats(&self) -> HashMap<&'static str, u64> {
        self.stats.to_map()
    }

    /// Schedule (or rebind) the timer for `reference`.
    ///
    /// The alarm fires no earlier than `due`, rounded up to a bucket
    /// boundary; a due time closer than one resolution period is promoted
    /// to the next period. A prior binding of the same reference is
    /// superseded: its context record is overwritten and the orphaned
    /// alarm becomes invisible to scans.
    pub async fn set(&self, due: i64, reference: &str, context: serde_json::Value) -> Result<()> {
        let now = self.clock.now_unix();
        bump(&self.stats.set);

        let mut due = due;
        if due - now <= RESOLUTION_SECS {
            bump(&self.stats.timer_in_past);
            trace!(store = %self.log, due, "moving too close or past timer to next period");
            due = now + RESOLUTION_SECS;
        }
        let due = round_up(due);

        let root = self.keys.root(due);
        let allocated = self.client.counter(&self.bucket, &root, 1, INIT_SEQ, 0).await.context(KvSnafu)?;
        let seq = allocated.value;

        let alarm_key = self.keys.alarm(due, seq);
        let ctx_key = self.keys.context(reference);

        let alarm = AlarmRecord {
            alarm_due: due,
            context_ref: ctx_key.clone(),
        };
        self.client.upsert(&self.bucket, &alarm_key, encode(&alarm_key, &alarm)?, 0).await.context(KvSnafu)?;

        let ctx = ContextRecord {
            context,
            alarm_ref: alarm_key.clone(),
        };
        self.client.upsert(&self.bucket, &ctx_key, encode(&ctx_key, &ctx)?, 0).await.context(KvSnafu)?;

        trace!(store = %self.log, due, seq, reference, "created timer");
        self.span.expand(due).await;
        bump(&self.stats.set_success);
        Ok(())
    }

    /// Remove a fired entry obtained from [`crate::TimerIter::scan_next`].
    ///
    /// Idempotent with respect to concurrent cancellation or rebinding:
    /// a context CAS mismatch means someone else rebound the reference
    /// after the scan, and the entry is left to them.
    pub async fn delete(&self, entry: &TimerEntry) -> Result<()> {
        trace!(store = %self.log, due = entry.alarm_due, seq = entry.alarm_seq, "deleting timer");
        bump(&self.stats.del);

        let removed = self.client.remove(&self.bucket, &entry.alarm_ref, Cas::NONE).await.context(KvSnafu)?;
        if removed.absent {
            bump(&self.stats.alarm_missing);
            trace!(store = %self.log, due = entry.alarm_due, seq = entry.alarm_seq, "alarm already gone in delete");
        }

        let removed = self.client.remove(&self.bucket, &entry.context_ref, entry.ctx_cas).await.context(KvSnafu)?;
        if removed.absent {
            bump(&self.stats.context_missing);
        }
        if removed.mismatch {
            trace!(
                store = %self.log,
                due = entry.alarm_due,
                seq = entry.alarm_seq,
                "timer was cancelled or overridden after it fired"
            );
            return Ok(());
        }

        if entry.top_cas.is_none() {
            return Ok(());
        }

        // This entry was the last column the scan saw in its row; retire
        // the root counter, but only if no writer advanced it since.
        let root = self.keys.root(entry.alarm_due);
        debug!(store = %self.log, key = %root, "removing last entry, so removing counter");
        let removed = self.client.remove(&self.bucket, &root, entry.top_cas).await.context(KvSnafu)?;
        if removed.absent || removed.mismatch {
            bump(&self.stats.alarm_missing);
            trace!(
                store = %self.log,
                key = %root,
                absent = removed.absent,
                mismatch = removed.mismatch,
                "concurrent writer touched the root counter"
            );
        }

        self.span.shrink(entry.alarm_due).await;
        bump(&self.stats.del_success);
        Ok(())
    }

    /// Cancel the timer bound to `reference`, if any.
    ///
    /// Best-effort: missing records are counted and tolerated. Only KV
    /// retry exhaustion surfaces as an error.
    pub async fn cancel(&self, reference: &str) -> Result<()> {
        bump(&self.stats.cancel);
        trace!(store = %self.log, reference, "cancelling timer");

        let ctx_key = self.keys.context(reference);
        let read = self.client.get(&self.bucket, &ctx_key).await.context(KvSnafu)?;
        let Some(raw) = read.value else {
            bump(&self.stats.cancel_context_missing);
            trace!(store = %self.log, reference, "nothing to cancel, context does not exist");
            return Ok(());
        };
        let ctx: ContextRecord = decode(&ctx_key, &raw)?;

        let removed = self.client.remove(&self.bucket, &ctx.alarm_ref, Cas::NONE).await.context(KvSnafu)?;
        if removed.absent {
            bump(&self.stats.cancel_alarm_missing);
            trace!(store = %self.log, reference, alarm = %ctx.alarm_ref, "alarm to cancel does not exist");
        }

        let removed = self.client.remove(&self.bucket, &ctx_key, Cas::NONE).await.context(KvSnafu)?;
        if removed.absent {
            trace!(store = %self.log, reference, "context to cancel does not exist");
        }

        bump(&self.stats.cancel_success);
        Ok(())
    }

    /// Whether local span changes await persistence.
    pub(crate) fn span_dirty(&self) -> bool {
        self.span.is_dirty()
    }

    /// Persist the local span, merging with concurrent writers.
    ///
    /// The merge policy is a monotone union: on a CAS conflict the local
    /// envelope is widened to cover the external one, so all nodes
    /// converge to the envelope of their observations. On any failed
    /// write the span is re-marked dirty and the background sweep retries
    /// next tick.
    pub async fn sync_span(&self) -> Result<()> {
        bump(&self.stats.sync_span);
        trace!(store = %self.log, "span sync");

        let mut state = self.span.lock().await;
        if !self.span.is_dirty() && !state.empty {
            return Ok(());
        }
        self.span.clear_dirty();

        let pos = self.keys.span();
        let read = match self.client.get(&self.bucket, &pos).await {
            Ok(read) => read,
            Err(source) => {
                self.span.mark_dirty();
                return Err(TimerError::Kv { source });
            }
        };
        let rcas = read.cas;
        let external = match read.value {
            Some(raw) => match decode::<Span>(&pos, &raw) {
                Ok(span) => Some(span),
                Err(error) => {
                    self.span.mark_dirty();
                    return Err(error);
                }
            },
            None => None,
        };

        match (external, state.empty) {
            // New store: nothing persisted, nothing local.
            (None, true) => {
                let now = self.clock.now_unix();
                state.span = Span {
                    start: round_down(now),
                    stop: round_up(now),
                };
                let created = match self.client.insert(&self.bucket, &pos, encode(&pos, &state.span)?, 0).await {
                    Ok(created) => created,
                    Err(source) => return Err(TimerError::Kv { source }),
                };
                if created.mismatch {
                    trace!(store = %self.log, "lost the race initializing span");
                    return Ok(());
                }
                state.cas = created.cas;
                state.empty = false;
                trace!(store = %self.log, span = ?state.span, "span initialized");
                Ok(())
            }

            // Nothing persisted yet, but we have local data.
            (None, false) => {
                let created = match self.client.insert(&self.bucket, &pos, encode(&pos, &state.span)?, 0).await {
                    Ok(created) => created,
                    Err(source) => {
                        self.span.mark_dirty();
                        return Err(TimerError::Kv { source });
                    }
                };
                if created.mismatch {
                    self.span.mark_dirty();
                    trace!(store = %self.log, span = ?state.span, "lost the race creating span");
                    return Ok(());
                }
                state.cas = created.cas;
                trace!(store = %self.log, span = ?state.span, "span created");
                Ok(())
            }

            // We have no local data; adopt what was persisted earlier.
            (Some(external), true) => {
                state.empty = false;
                state.span = external;
                state.cas = rcas;
                trace!(store = %self.log, span = ?state.span, "span read and adopted");
                Ok(())
            }

            (Some(external), false) => {
                // Nothing moved on either side.
                if state.cas == rcas && state.span == external {
                    trace!(store = %self.log, span = ?state.span, "span unchanged");
                    return Ok(());
                }

                // Only local changes; no conflict with the persisted copy.
                if state.cas == rcas {
                    trace!(store = %self.log, span = ?state.span, "writing span, no conflict");
                    return self.replace_span(&mut state, &pos, rcas).await;
                }

                // External writer raced us; widen to the union and retry.
                bump(&self.stats.span_cas_mismatch);
                if state.span.start > external.start {
                    bump(&self.stats.span_start_change);
                    state.span.start = external.start;
                }
                if state.span.stop < external.stop {
                    bump(&self.stats.span_stop_change);
                    state.span.stop = external.stop;
                }
                trace!(store = %self.log, span = ?state.span, external = ?external, "merging span after conflict");
                self.replace_span(&mut state, &pos, rcas).await
            }
        }
    }

    async fn replace_span(&self, state: &mut crate::span::SpanState, pos: &str, rcas: Cas) -> Result<()> {
        let body = encode(pos, &state.span)?;
        let replaced = match self.client.replace(&self.bucket, pos, body, rcas, 0).await {
            Ok(replaced) => replaced,
            Err(source) => {
                self.span.mark_dirty();
                return Err(TimerError::Kv { source });
            }
        };
        if replaced.absent || replaced.mismatch {
            self.span.mark_dirty();
            trace!(
                store = %self.log,
                span = ?state.span,
                absent = replaced.absent,
                mismatch = replaced.mismatch,
                "overwriting span failed"
            );
            return Ok(());
        }
        state.cas = replaced.cas;
        trace!(store = %self.log, span = ?state.span, "span saved");
        Ok(())
    }
}
