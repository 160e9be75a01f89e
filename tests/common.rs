//! Test utilities & fixtures.
//! Every harness gets its own temp sled directory; drop the harness to clean up.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use paragon_engine::growth::{
    CacheClient, EventEnvelope, EventSink, GrowthCache, GrowthEngine, GrowthError, GrowthRules,
    GrowthStore, GrowthStoreBuilder, MemoryCache,
};

/// Collects every published envelope in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.topic).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, envelope: &EventEnvelope) -> Result<(), GrowthError> {
        self.events.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// A broker that is always down.
pub struct FailingSink;

impl EventSink for FailingSink {
    fn publish(&self, _envelope: &EventEnvelope) -> Result<(), GrowthError> {
        Err(GrowthError::Publish("broker unreachable".into()))
    }
}

/// A cache that is always down.
pub struct FailingCache;

impl CacheClient for FailingCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, GrowthError> {
        Err(GrowthError::Cache("connection refused".into()))
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), GrowthError> {
        Err(GrowthError::Cache("connection refused".into()))
    }

    fn delete(&self, _key: &str) -> Result<(), GrowthError> {
        Err(GrowthError::Cache("connection refused".into()))
    }
}

/// In-memory cache whose next `set` after [`PausingCache::arm`] signals
/// `entered` and then blocks until something is sent on `release`.
pub struct PausingCache {
    inner: MemoryCache,
    armed: AtomicBool,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl PausingCache {
    /// Returns the cache, the `entered` receiver and the `release` sender.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let cache = Arc::new(Self {
            inner: MemoryCache::new(),
            armed: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (cache, entered_rx, release_tx)
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl CacheClient for PausingCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GrowthError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), GrowthError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
        }
        self.inner.set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), GrowthError> {
        self.inner.delete(key)
    }
}

pub struct Harness {
    _dir: TempDir,
    pub store: Arc<GrowthStore>,
    pub cache: Arc<MemoryCache>,
    pub sink: Arc<RecordingSink>,
    pub engine: GrowthEngine,
}

/// Engine over a fresh store, an in-memory cache and a recording sink.
pub fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(GrowthStoreBuilder::new(dir.path()).open().expect("store"));
    let cache = Arc::new(MemoryCache::new());
    let sink = Arc::new(RecordingSink::default());
    let engine = GrowthEngine::from_parts(
        store.clone(),
        GrowthCache::new(cache.clone()),
        sink.clone(),
        GrowthRules::default(),
    );
    Harness {
        _dir: dir,
        store,
        cache,
        sink,
        engine,
    }
}

/// Engine with caller-chosen cache and sink.
pub fn engine_with(cache: GrowthCache, sink: Arc<dyn EventSink>) -> (TempDir, Arc<GrowthStore>, GrowthEngine) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(GrowthStoreBuilder::new(dir.path()).open().expect("store"));
    let engine = GrowthEngine::from_parts(store.clone(), cache, sink, GrowthRules::default());
    (dir, store, engine)
}
