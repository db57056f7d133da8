//! Process-wide store registry and background span sync.
//!
//! Stores are registered under `{uid}:{partn}`. A single long-lived task,
//! spawned on first [`create`], sweeps the registry once per resolution
//! period and persists any dirty spans, bounding how long a local span
//! change stays invisible to other nodes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Once;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::info;
use tracing::warn;

use crate::constants::RESOLUTION_SECS;
use crate::error::Result;
use crate::store::TimerStore;

static STORES: LazyLock<RwLock<HashMap<String, Arc<TimerStore>>>> = LazyLock::new(|| RwLock::new(HashMap::new()));
static SYNC_LOOP: Once = Once::new();

fn map_locator(uid: &str, partn: u32) -> String {
    format!("{uid}:{partn}")
}

/// Create and register the store for `(uid, partn)`.
///
/// Idempotent: an already-registered pair is reused with a warning. Must
/// be called from within a tokio runtime; the first call spawns the
/// background span-sync task.
pub async fn create(uid: &str, partn: u32, connstr: &str, bucket: &str) -> Result<()> {
    SYNC_LOOP.call_once(|| {
        tokio::spawn(sync_loop());
    });

    let locator = map_locator(uid, partn);
    {
        let stores = STORES.read().await;
        if stores.contains_key(&locator) {
            warn!(uid, partn, "asked to create store which exists, reusing");
            return Ok(());
        }
    }

    let store = Arc::new(TimerStore::open(uid, partn, connstr, bucket).await?);

    let mut stores = STORES.write().await;
    if stores.contains_key(&locator) {
        // Lost a create race; keep the winner.
        warn!(uid, partn, "asked to create store which exists, reusing");
        return Ok(());
    }
    stores.insert(locator, store);
    Ok(())
}

/// Look up the registered store for `(uid, partn)`.
pub async fn fetch(uid: &str, partn: u32) -> Option<Arc<TimerStore>> {
    let stores = STORES.read().await;
    match stores.get(&map_locator(uid, partn)) {
        Some(store) => Some(Arc::clone(store)),
        None => {
            info!(uid, partn, "store not defined");
            None
        }
    }
}

impl TimerStore {
    /// Unregister this store and flush its span.
    pub async fn free(&self) {
        STORES.write().await.remove(&map_locator(self.uid(), self.partition()));
        if let Err(error) = self.sync_span().await {
            warn!(store = %self.log, %error, "final span sync failed");
        }
    }
}

async fn sync_loop() {
    loop {
        let dirty: Vec<Arc<TimerStore>> = {
            let stores = STORES.read().await;
            stores.values().filter(|store| store.span_dirty()).cloned().collect()
        };
        for store in dirty {
            if let Err(error) = store.sync_span().await {
                warn!(store = %store.log, %error, "background span sync failed");
            }
        }
        tokio::time::sleep(Duration::from_secs(RESOLUTION_SECS as u64)).await;
    }
}
