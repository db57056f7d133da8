//! Registry lifecycle: create, fetch, free.

use std::sync::Arc;

use carillon_timers::SystemClock;
use carillon_timers::TimeSource;
use serde_json::json;

const CONNSTR: &str = "memory://e2e-registry";

#[tokio::test]
async fn create_then_fetch_round_trips() {
    carillon_timers::create("reg-a", 3, CONNSTR, "meta").await.unwrap();

    let store = carillon_timers::fetch("reg-a", 3).await.expect("registered store");
    assert_eq!(store.uid(), "reg-a");
    assert_eq!(store.partition(), 3);
}

#[tokio::test]
async fn create_is_idempotent() {
    carillon_timers::create("reg-b", 0, CONNSTR, "meta").await.unwrap();
    carillon_timers::create("reg-b", 0, CONNSTR, "meta").await.unwrap();

    let first = carillon_timers::fetch("reg-b", 0).await.unwrap();
    let second = carillon_timers::fetch("reg-b", 0).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn fetch_of_unknown_store_is_none() {
    assert!(carillon_timers::fetch("reg-ghost", 9).await.is_none());
}

#[tokio::test]
async fn free_unregisters_and_allows_recreate() {
    carillon_timers::create("reg-c", 1, CONNSTR, "meta").await.unwrap();
    let store = carillon_timers::fetch("reg-c", 1).await.unwrap();

    store.free().await;
    assert!(carillon_timers::fetch("reg-c", 1).await.is_none());

    carillon_timers::create("reg-c", 1, CONNSTR, "meta").await.unwrap();
    assert!(carillon_timers::fetch("reg-c", 1).await.is_some());
}

#[tokio::test]
async fn registered_store_accepts_timers() {
    carillon_timers::create("reg-d", 2, CONNSTR, "meta").await.unwrap();
    let store = carillon_timers::fetch("reg-d", 2).await.unwrap();

    let due = SystemClock.now_unix() + 120;
    store.set(due, "job::1", json!({"kind": "ping"})).await.unwrap();

    let stats = store.stats();
    assert_eq!(stats["meta_set"], 1);
    assert_eq!(stats["meta_set_success"], 1);
}
