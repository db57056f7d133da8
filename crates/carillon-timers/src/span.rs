//! Local span tracking.
//!
//! Each store keeps an in-memory copy of its persisted [`Span`] plus the
//! bookkeeping (`empty`, `dirty`, last seen CAS) that
//! [`crate::TimerStore::sync_span`] needs to merge against concurrent
//! writers. The mutex is held across KV I/O during a sync round; all other
//! accessors are short critical sections. `dirty` is an atomic so the
//! background sweep can poll it without taking the lock.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use carillon_core::Cas;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

use crate::types::Span;

/// Mutable span bookkeeping guarded by the tracker's mutex.
#[derive(Debug)]
pub(crate) struct SpanState {
    /// The local `[start, stop]` envelope.
    pub span: Span,
    /// Set until the first sync round adopts or creates a persisted span.
    pub empty: bool,
    /// CAS of the persisted span as of the last successful sync.
    pub cas: Cas,
}

/// The store's span plus its synchronization flags.
#[derive(Debug)]
pub(crate) struct SpanTracker {
    state: Mutex<SpanState>,
    dirty: AtomicBool,
}

impl SpanTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SpanState {
                span: Span::default(),
                empty: true,
                cas: Cas::NONE,
            }),
            dirty: AtomicBool::new(false),
        }
    }

    /// Snapshot the current envelope.
    pub(crate) async fn read(&self) -> Span {
        self.state.lock().await.span
    }

    /// Widen the envelope to include `point`.
    pub(crate) async fn expand(&self, point: i64) {
        let mut state = self.state.lock().await;
        if state.span.start > point {
            state.span.start = point;
            self.dirty.store(true, Ordering::Release);
        }
        if state.span.stop < point {
            state.span.stop = point;
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Advance the envelope's start; never moves it backwards.
    pub(crate) async fn shrink(&self, start: i64) {
        let mut state = self.state.lock().await;
        if state.span.start < start {
            state.span.start = start;
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Lock the bookkeeping for a sync round.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, SpanState> {
        self.state.lock().await
    }

    /// Whether local changes await persistence.
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expand_widens_both_ends_and_marks_dirty() {
        let tracker = SpanTracker::new();
        {
            let mut state = tracker.lock().await;
            state.span = Span { start: 700, stop: 700 };
            state.empty = false;
        }
        assert!(!tracker.is_dirty());

        tracker.expand(1400).await;
        assert_eq!(tracker.read().await, Span { start: 700, stop: 1400 });
        assert!(tracker.is_dirty());

        tracker.clear_dirty();
        tracker.expand(490).await;
        assert_eq!(tracker.read().await, Span { start: 490, stop: 1400 });
        assert!(tracker.is_dirty());

        tracker.clear_dirty();
        tracker.expand(1000).await;
        assert!(!tracker.is_dirty(), "interior points change nothing");
    }

    #[tokio::test]
    async fn shrink_only_advances_start() {
        let tracker = SpanTracker::new();
        {
            let mut state = tracker.lock().await;
            state.span = Span { start: 700, stop: 1400 };
            state.empty = false;
        }

        tracker.shrink(1050).await;
        assert_eq!(tracker.read().await, Span { start: 1050, stop: 1400 });
        assert!(tracker.is_dirty());

        tracker.clear_dirty();
        tracker.shrink(700).await;
        assert_eq!(tracker.read().await, Span { start: 1050, stop: 1400 });
        assert!(!tracker.is_dirty(), "start never moves backwards");
    }
}
