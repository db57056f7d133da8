//! Span persistence and merge between stores sharing one bucket.

use std::sync::Arc;

use carillon_core::KvClient;
use carillon_core::pool;
use carillon_timers::ManualClock;
use carillon_timers::TimerStore;
use serde_json::json;

const CONNSTR: &str = "memory://e2e-span";
const SPAN_KEY: &str = "u:tm:0:sp";

async fn open(now: i64) -> TimerStore {
    let clock = Arc::new(ManualClock::new(now));
    TimerStore::open_with_clock("u", 0, CONNSTR, "meta", clock).await.unwrap()
}

async fn persisted_span() -> serde_json::Value {
    let kv = pool::client(CONNSTR).unwrap();
    let read = kv.get("meta", SPAN_KEY).await.unwrap();
    serde_json::from_str(&read.value.expect("span document")).unwrap()
}

#[tokio::test]
async fn concurrent_stores_converge_to_the_union() {
    // First store initializes the span around its clock.
    let node_a = open(1_000).await;
    assert_eq!(persisted_span().await, json!({"sta": 994, "stp": 1_001}));

    // Second store adopts the persisted copy instead of re-creating it.
    let node_b = open(1_000).await;

    // B extends the envelope and persists without conflict.
    node_b.set(1_799, "rb", serde_json::Value::Null).await.unwrap();
    node_b.sync_span().await.unwrap();
    assert_eq!(persisted_span().await, json!({"sta": 994, "stp": 1_799}));
    assert_eq!(node_b.stats()["meta_span_cas_mismatch"], 0);

    // A raced: its last-seen CAS is stale, so its sync merges first.
    node_a.set(2_499, "ra", serde_json::Value::Null).await.unwrap();
    node_a.sync_span().await.unwrap();
    assert_eq!(persisted_span().await, json!({"sta": 994, "stp": 2_499}));
    assert_eq!(node_a.stats()["meta_span_cas_mismatch"], 1);

    // An external writer moves start leftward; B widens rightward. One
    // sync round converges to the union of both.
    let kv = pool::client(CONNSTR).unwrap();
    kv.upsert("meta", SPAN_KEY, r#"{"sta":490,"stp":2499}"#.to_string(), 0).await.unwrap();

    node_b.set(2_800, "rb2", serde_json::Value::Null).await.unwrap();
    node_b.sync_span().await.unwrap();
    assert_eq!(persisted_span().await, json!({"sta": 490, "stp": 2_800}));

    let stats = node_b.stats();
    assert_eq!(stats["meta_span_cas_mismatch"], 1);
    assert_eq!(stats["meta_span_start_change"], 1);
    assert_eq!(stats["meta_span_stop_change"], 0);
}
