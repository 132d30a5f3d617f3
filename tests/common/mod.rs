#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use limit_req::codec::{self, BucketState};
use limit_req::config::{LimitRule, LogLevel};
use limit_req::error::{LimitError, LimitResult};
use limit_req::replication::Replicator;
use limit_req::{RateLimiter, StoreClient};

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub value: Vec<u8>,
    pub ttl_secs: u64,
}

type Data = Arc<Mutex<HashMap<String, Record>>>;

/// In-memory replica with failure injection. Replicas built with
/// [`MemoryStore::replica_of`] share the same data.
pub struct MemoryStore {
    name: String,
    data: Data,
    pub fail_connect: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_ping: AtomicBool,
    pub fail_set: AtomicBool,
    pub stall_get: AtomicBool,
    pub connects: AtomicUsize,
    pub gets: AtomicUsize,
    pub pings: AtomicUsize,
    pub sets: AtomicUsize,
    active: Arc<AtomicUsize>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_data(name, Arc::new(Mutex::new(HashMap::new())))
    }

    pub fn replica_of(primary: &MemoryStore, name: &str) -> Arc<Self> {
        Self::with_data(name, primary.data.clone())
    }

    fn with_data(name: &str, data: Data) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            data,
            fail_connect: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            fail_ping: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            stall_get: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn record(&self, key: &str) -> Option<Record> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn state(&self, key: &str) -> Option<BucketState> {
        self.record(key).map(|r| codec::decode(&r.value))
    }

    pub fn seed(&self, key: &str, state: BucketState) {
        self.seed_raw(key, &codec::encode(&state));
    }

    pub fn seed_raw(&self, key: &str, value: &[u8]) {
        self.data.lock().unwrap().insert(
            key.to_string(),
            Record {
                value: value.to_vec(),
                ttl_secs: 60,
            },
        );
    }

    /// Simulate TTL expiry of a record.
    pub fn expire(&self, key: &str) {
        self.data.lock().unwrap().remove(key);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    fn failure(&self, flag: &AtomicBool, op: &str) -> Option<LimitError> {
        if flag.load(Ordering::SeqCst) {
            Some(LimitError::Store(format!("{} failed on {}", op, self.name)))
        } else {
            None
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> LimitResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure(&self.fail_connect, "connect") {
            return Err(LimitError::Setup {
                replica: self.name.clone(),
                message: err.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> LimitResult<Option<Vec<u8>>> {
        let _guard = ActiveGuard::enter(&self.active);
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.stall_get.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.failure(&self.fail_get, "GET") {
            return Err(LimitError::Read {
                replica: self.name.clone(),
                message: err.to_string(),
            });
        }
        Ok(self.record(key).map(|r| r.value))
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> LimitResult<()> {
        if let Some(err) = self.failure(&self.fail_set, "SETEX") {
            return Err(err);
        }
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.data.lock().unwrap().insert(
            key.to_string(),
            Record {
                value: value.to_vec(),
                ttl_secs,
            },
        );
        Ok(())
    }

    async fn ping(&self) -> LimitResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure(&self.fail_ping, "PING") {
            return Err(LimitError::Probe {
                replica: self.name.clone(),
                message: err.to_string(),
            });
        }
        Ok(())
    }
}

/// A primary/secondary pair of writers and a reader replicating the first.
pub struct Cluster {
    pub reader: Arc<MemoryStore>,
    pub primary: Arc<MemoryStore>,
    pub secondary: Arc<MemoryStore>,
}

impl Cluster {
    pub fn new() -> Self {
        let primary = MemoryStore::new("primary");
        let reader = MemoryStore::replica_of(&primary, "reader");
        let secondary = MemoryStore::new("secondary");
        Self {
            reader,
            primary,
            secondary,
        }
    }

    pub fn replicator(&self) -> Replicator {
        Replicator::new(
            self.reader.clone(),
            vec![
                self.primary.clone() as Arc<dyn StoreClient>,
                self.secondary.clone(),
            ],
        )
        .unwrap()
    }

    pub fn limiter(&self, rule: LimitRule) -> RateLimiter {
        RateLimiter::new(self.replicator(), rule, LogLevel::Debug)
    }

    pub fn total_sets(&self) -> usize {
        self.primary.set_count() + self.secondary.set_count()
    }
}

pub fn rule(rate: &str, burst: f64, interval: u64) -> LimitRule {
    LimitRule {
        rate: rate.to_string(),
        burst,
        interval,
        ..LimitRule::default()
    }
}
