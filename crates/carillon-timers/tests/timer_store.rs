//! End-to-end timer store scenarios over the in-memory backend.

use std::sync::Arc;

use carillon_core::KvClient;
use carillon_core::pool;
use carillon_timers::ManualClock;
use carillon_timers::TimerEntry;
use carillon_timers::TimerStore;
use serde_json::json;

async fn open(connstr: &str, now: i64) -> (TimerStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let store = TimerStore::open_with_clock("u", 0, connstr, "meta", clock.clone()).await.unwrap();
    (store, clock)
}

/// Drain a full scan pass into a vector.
async fn drain(store: &TimerStore) -> Vec<TimerEntry> {
    let mut out = Vec::new();
    if let Some(mut iter) = store.scan_due().await {
        while let Some(entry) = iter.scan_next().await.unwrap() {
            out.push(entry);
        }
    }
    out
}

async fn raw_doc(connstr: &str, key: &str) -> Option<serde_json::Value> {
    let kv = pool::client(connstr).unwrap();
    let read = kv.get("meta", key).await.unwrap();
    read.value.map(|raw| serde_json::from_str(&raw).unwrap())
}

#[tokio::test]
async fn happy_path_set_scan_delete() {
    let connstr = "memory://e2e-happy";
    let (store, clock) = open(connstr, 1_000).await;

    store.set(1_050, "r1", json!({"n": 1})).await.unwrap();

    clock.set(1_100);
    let mut iter = store.scan_due().await.expect("span is due");
    let entry = iter.scan_next().await.unwrap().expect("one live entry");
    assert_eq!(entry.alarm_due, 1_050);
    assert_eq!(entry.context, json!({"n": 1}));

    store.delete(&entry).await.unwrap();
    assert!(iter.scan_next().await.unwrap().is_none());

    // The bucket's root counter is gone and a fresh scan finds nothing.
    assert_eq!(raw_doc(connstr, "u:tm:0:rt:t6").await, None);
    assert!(drain(&store).await.is_empty());

    let stats = store.stats();
    assert_eq!(stats["meta_set_success"], 1);
    assert_eq!(stats["meta_del_success"], 1);
}

#[tokio::test]
async fn records_are_cross_linked() {
    let connstr = "memory://e2e-links";
    let (store, _clock) = open(connstr, 1_000).await;

    store.set(1_050, "r1", json!({"n": 1})).await.unwrap();

    // Context keys are a stable wire contract: 27-symbol digest encoding.
    let ctx_key = "u:tm:0:cx:MAR44j9pUAFSzKUJg7hoPOb5j9P";
    let alarm_key = "u:tm:0:al:t6:128";

    let alarm = raw_doc(connstr, alarm_key).await.expect("alarm record");
    assert_eq!(alarm, json!({"due": 1_050, "cxr": ctx_key}));

    let ctx = raw_doc(connstr, ctx_key).await.expect("context record");
    assert_eq!(ctx, json!({"ctx": {"n": 1}, "alr": alarm_key}));
}

#[tokio::test]
async fn near_past_due_is_promoted() {
    let connstr = "memory://e2e-promote";
    let (store, clock) = open(connstr, 1_000).await;

    store.set(1_001, "r2", serde_json::Value::Null).await.unwrap();
    assert_eq!(store.stats()["meta_timer_in_past"], 1);

    // Not yet visible right after the original due time.
    clock.set(1_002);
    assert!(drain(&store).await.is_empty());

    // Visible once the promoted bucket has passed.
    clock.set(1_009);
    let entries = drain(&store).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].alarm_due, 1_008);
    assert_eq!(entries[0].context, serde_json::Value::Null);
}

#[tokio::test]
async fn rebinding_supersedes_prior_alarm() {
    let connstr = "memory://e2e-supersede";
    let (store, clock) = open(connstr, 1_000).await;

    store.set(2_000, "r3", json!({"v": 1})).await.unwrap();
    store.set(2_100, "r3", json!({"v": 2})).await.unwrap();

    // The first alarm's bucket is still present, but its context no longer
    // points back at it. due=2000 rounds up to bucket 2002 ("1jm").
    assert!(raw_doc(connstr, "u:tm:0:rt:1jm").await.is_some());

    clock.set(2_200);
    let entries = drain(&store).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].alarm_due, 2_100);
    assert_eq!(entries[0].context, json!({"v": 2}));
}

#[tokio::test]
async fn cancelled_timer_never_fires() {
    let connstr = "memory://e2e-cancel";
    let (store, clock) = open(connstr, 1_000).await;

    store.set(1_050, "r4", json!("payload")).await.unwrap();
    clock.set(1_025);
    store.cancel("r4").await.unwrap();

    clock.set(1_100);
    assert!(drain(&store).await.is_empty());

    let stats = store.stats();
    assert_eq!(stats["meta_cancel_success"], 1);
    assert_eq!(stats["meta_cancel_alarm_missing"], 0);
}

#[tokio::test]
async fn scan_skips_holes_in_a_bucket() {
    let connstr = "memory://e2e-holes";
    let (store, clock) = open(connstr, 1_000).await;

    // Three alarms in the same bucket allocate seqs 128, 129, 130.
    store.set(1_050, "a", json!(1)).await.unwrap();
    store.set(1_050, "b", json!(2)).await.unwrap();
    store.set(1_050, "c", json!(3)).await.unwrap();
    store.cancel("b").await.unwrap();

    clock.set(1_100);
    let entries = drain(&store).await;
    assert_eq!(entries.len(), 2);
    assert!(entries[0].alarm_ref.ends_with(":128"));
    assert!(entries[1].alarm_ref.ends_with(":130"));
    assert_eq!(entries[0].context, json!(1));
    assert_eq!(entries[1].context, json!(3));
}

#[tokio::test]
async fn deleting_the_last_entry_retires_the_root() {
    let connstr = "memory://e2e-retire";
    let (store, clock) = open(connstr, 1_000).await;

    store.set(1_050, "a", json!(1)).await.unwrap();
    store.set(1_050, "b", json!(2)).await.unwrap();

    clock.set(1_100);
    let entries = drain(&store).await;
    assert_eq!(entries.len(), 2);

    // Deleting a non-final column leaves the root in place.
    store.delete(&entries[0]).await.unwrap();
    assert!(raw_doc(connstr, "u:tm:0:rt:t6").await.is_some());

    // Deleting the final column retires it.
    store.delete(&entries[1]).await.unwrap();
    assert_eq!(raw_doc(connstr, "u:tm:0:rt:t6").await, None);
    assert!(drain(&store).await.is_empty());
}

#[tokio::test]
async fn scan_is_empty_while_span_is_in_the_future() {
    let connstr = "memory://e2e-future-span";
    let (store, clock) = open(connstr, 1_000).await;

    // The span was initialized around t=1000; rewind the clock below it.
    clock.set(500);
    assert!(store.scan_due().await.is_none());
}

#[tokio::test]
async fn far_future_timer_fires_only_after_due() {
    let connstr = "memory://e2e-far";
    let (store, clock) = open(connstr, 1_000).await;

    // Bucket-aligned so the due time survives rounding untouched.
    let due = 1_120;
    assert_eq!(due % carillon_timers::RESOLUTION_SECS, 0);
    store.set(due, "far", json!(true)).await.unwrap();

    clock.set(due - 1);
    assert!(drain(&store).await.is_empty());

    clock.set(due);
    let entries = drain(&store).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].alarm_due, due);
}

#[tokio::test]
async fn delete_after_rebind_leaves_new_binding_alone() {
    let connstr = "memory://e2e-rebind-race";
    let (store, clock) = open(connstr, 1_000).await;

    store.set(1_050, "r", json!("old")).await.unwrap();
    clock.set(1_100);
    let entries = drain(&store).await;
    assert_eq!(entries.len(), 1);

    // The reference is rebound between scan and delete; the context CAS no
    // longer matches, so delete backs off after removing the fired alarm.
    store.set(2_000, "r", json!("new")).await.unwrap();
    store.delete(&entries[0]).await.unwrap();

    clock.set(2_100);
    let entries = drain(&store).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].context, json!("new"));
}
