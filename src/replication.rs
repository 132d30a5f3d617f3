//! Read-from-one / write-to-many replication of bucket state.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec::{self, BucketState};
use crate::error::{LimitError, LimitResult};
use crate::store::StoreClient;

/// TTL of an ordinary bucket record, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 60;

/// What a request persists after its decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketUpdate {
    pub state: BucketState,
    pub ttl_secs: u64,
}

impl BucketUpdate {
    pub fn admitted(excess: f64, now_ms: u64) -> Self {
        Self {
            state: BucketState::new(excess, now_ms, false),
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    pub fn forbidden(excess: f64, now_ms: u64, interval_secs: u64) -> Self {
        Self {
            state: BucketState::new(excess, now_ms, true),
            ttl_secs: interval_secs,
        }
    }
}

/// Storage key of a bucket.
pub fn bucket_key(zone: &str, key: &str) -> String {
    format!("{}:{}", zone, key)
}

pub struct Replicator {
    reader: Arc<dyn StoreClient>,
    writers: Vec<Arc<dyn StoreClient>>,
}

impl Replicator {
    pub fn new(
        reader: Arc<dyn StoreClient>,
        writers: Vec<Arc<dyn StoreClient>>,
    ) -> LimitResult<Self> {
        if writers.is_empty() {
            return Err(LimitError::Config(
                "at least one writer replica is required".to_string(),
            ));
        }
        Ok(Self { reader, writers })
    }

    pub fn reader(&self) -> &Arc<dyn StoreClient> {
        &self.reader
    }

    pub fn writers(&self) -> &[Arc<dyn StoreClient>] {
        &self.writers
    }

    /// Establish connections to the reader and then every writer, in order.
    pub async fn connect_all(&self) -> LimitResult<()> {
        self.reader.connect().await?;
        for writer in &self.writers {
            writer.connect().await?;
        }
        Ok(())
    }

    /// Fetch the current bucket from the reader. An absent or corrupt record
    /// is a fresh bucket; only transport failures are errors.
    pub async fn read_state(&self, zone: &str, key: &str) -> LimitResult<BucketState> {
        let storage_key = bucket_key(zone, key);
        let raw = self.reader.get(&storage_key).await?;
        Ok(match raw {
            Some(bytes) => codec::decode(&bytes),
            None => {
                debug!(key = %storage_key, "No bucket stored, starting fresh");
                BucketState::fresh()
            }
        })
    }

    /// Ping every writer. The first failure in writer order is returned.
    pub async fn probe_writers(&self) -> LimitResult<()> {
        let probes = join_all(self.writers.iter().map(|writer| writer.ping())).await;
        for (writer, probe) in self.writers.iter().zip(probes) {
            if let Err(err) = probe {
                warn!(replica = %writer.name(), error = %err, "Writer failed liveness probe");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Send the same record to every writer and aggregate their results.
    pub async fn broadcast_write(
        &self,
        zone: &str,
        key: &str,
        update: &BucketUpdate,
    ) -> LimitResult<()> {
        let storage_key = bucket_key(zone, key);
        let payload = codec::encode(&update.state);

        let results = join_all(
            self.writers
                .iter()
                .map(|writer| writer.set_ex(&storage_key, &payload, update.ttl_secs)),
        )
        .await;

        let mut failed = 0;
        for (writer, result) in self.writers.iter().zip(results) {
            if let Err(err) = result {
                warn!(
                    replica = %writer.name(),
                    key = %storage_key,
                    error = %err,
                    "Writer rejected bucket update"
                );
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(LimitError::PartialWrite {
                failed,
                total: self.writers.len(),
            });
        }
        Ok(())
    }
}
