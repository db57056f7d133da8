//! Persistent, partitioned timer store over a CAS-capable KV bucket.
//!
//! Timers survive process restarts and migrate between nodes owning a
//! partition: everything lives in the shared bucket, keyed under
//! `{uid}:tm:{partn}`. The store offers at-least-once firing with strong
//! cancellation semantics.
//!
//! # Data model
//!
//! - Due times are discretized into 7-second buckets. Each occupied bucket
//!   owns a **root counter** that atomically allocates alarm sequences at
//!   write time and bounds the column scan at read time.
//! - An alarm is two cross-linked records: the **alarm record** in the
//!   temporal index and the **context record** under a stable hash of the
//!   caller's reference. Rebinding a reference overwrites the context
//!   record, silently superseding the old alarm; cancellation deletes it.
//! - A per-store **span** records the `[start, stop]` envelope of occupied
//!   buckets. Spans sync to the bucket under CAS with a monotone-union
//!   merge, so concurrent nodes converge to the envelope of their
//!   observations.
//!
//! # Example
//!
//! ```ignore
//! use carillon_timers as timers;
//!
//! timers::create("app1", 3, "memory://local", "meta").await?;
//! let store = timers::fetch("app1", 3).await.unwrap();
//!
//! store.set(due, "doc::42", serde_json::json!({"n": 1})).await?;
//!
//! if let Some(mut iter) = store.scan_due().await {
//!     while let Some(entry) = iter.scan_next().await? {
//!         fire(&entry);
//!         store.delete(&entry).await?;
//!     }
//! }
//! ```

#![warn(missing_docs)]

mod clock;
mod constants;
mod error;
mod keys;
mod registry;
mod scan;
mod span;
mod stats;
mod store;
mod types;

pub use clock::ManualClock;
pub use clock::SystemClock;
pub use clock::TimeSource;
pub use clock::round_down;
pub use clock::round_up;
pub use constants::INIT_SEQ;
pub use constants::RESOLUTION_SECS;
pub use error::Result;
pub use error::TimerError;
pub use registry::create;
pub use registry::fetch;
pub use scan::TimerIter;
pub use store::TimerStore;
pub use types::AlarmRecord;
pub use types::ContextRecord;
pub use types::Span;
pub use types::TimerEntry;
