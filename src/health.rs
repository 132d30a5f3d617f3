use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::rate_limiter::RateLimiter;
use crate::store::StoreClient;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub reader: ReplicaStatus,
    pub writers: Vec<ReplicaStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub name: String,
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl ReplicaStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    rate_limiter: Arc<RateLimiter>,
}

impl HealthChecker {
    /// Built once at startup; uptime is counted from here.
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        std::sync::LazyLock::force(&START_TIME);
        Self { rate_limiter }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        let replicator = self.rate_limiter.replicator();
        let reader = check_replica(replicator.reader().as_ref()).await;
        let writers = futures::future::join_all(
            replicator
                .writers()
                .iter()
                .map(|writer| check_replica(writer.as_ref())),
        )
        .await;

        // The limiter admits everything while replicas are down, so this is
        // reported as degraded rather than unhealthy.
        let overall_status = if reader.is_healthy() && writers.iter().all(ReplicaStatus::is_healthy) {
            "healthy"
        } else {
            "degraded"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            reader,
            writers,
        }
    }
}

async fn check_replica(store: &dyn StoreClient) -> ReplicaStatus {
    let start = Instant::now();
    let result = store.ping().await;
    let response_time_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(()) => ReplicaStatus {
            name: store.name().to_string(),
            status: "healthy".to_string(),
            response_time_ms,
            error: None,
        },
        Err(err) => ReplicaStatus {
            name: store.name().to_string(),
            status: "unavailable".to_string(),
            response_time_ms,
            error: Some(err.to_string()),
        },
    }
}
