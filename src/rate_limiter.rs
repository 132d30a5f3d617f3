use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::config::{Config, LimitRule, LogLevel};
use crate::engine::{self, Verdict};
use crate::error::{LimitError, LimitResult};
use crate::replication::{BucketUpdate, Replicator};
use crate::store::{RedisStore, StoreClient};

/// Entry point invoked once per request.
///
/// Every infrastructure failure degrades to [`Verdict::Admit`]: an
/// unreachable store must never turn the limiter into an outage.
pub struct RateLimiter {
    replicator: Replicator,
    default_rule: LimitRule,
    log_level: LogLevel,
}

impl RateLimiter {
    pub fn new(replicator: Replicator, default_rule: LimitRule, log_level: LogLevel) -> Self {
        Self {
            replicator,
            default_rule,
            log_level,
        }
    }

    /// Build a limiter talking to the Redis replicas named in `config`.
    pub fn from_config(config: &Config) -> LimitResult<Self> {
        let reader: Arc<dyn StoreClient> = Arc::new(RedisStore::new(&config.store.reader)?);
        let writers = config
            .store
            .writers
            .iter()
            .map(|endpoint| Ok(Arc::new(RedisStore::new(endpoint)?) as Arc<dyn StoreClient>))
            .collect::<LimitResult<Vec<_>>>()?;

        let replicator = Replicator::new(reader, writers)?;
        Ok(Self::new(replicator, config.rule.clone(), config.log_level))
    }

    pub fn default_rule(&self) -> &LimitRule {
        &self.default_rule
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    pub async fn limit(&self, rule: &LimitRule, remote_addr: &str) -> Verdict {
        self.limit_at(rule, remote_addr, now_ms()).await
    }

    /// Same as [`limit`](Self::limit) with an explicit clock reading.
    pub async fn limit_at(&self, rule: &LimitRule, remote_addr: &str, now_ms: u64) -> Verdict {
        let spec = rule.rate_spec();
        let zone = rule.zone.as_str();
        let key = rule.resolve_key(remote_addr);

        if let Err(err) = self.replicator.connect_all().await {
            self.fail_open(zone, key, &err);
            return Verdict::Admit;
        }

        let previous = match self.replicator.read_state(zone, key).await {
            Ok(state) => state,
            Err(err) => {
                self.fail_open(zone, key, &err);
                return Verdict::Admit;
            }
        };

        let evaluation = engine::evaluate(&previous, now_ms, spec.rate, spec.burst);
        let (verdict, update) = match evaluation.verdict {
            // Leave the record alone so the penalty window is not extended.
            Verdict::Forbidden => {
                debug!(zone, key, "Key is forbidden");
                return Verdict::Forbidden;
            }
            Verdict::Busy if spec.forbids_on_exceed() => {
                info!(
                    zone,
                    key,
                    excess = evaluation.excess,
                    interval_secs = spec.interval_secs,
                    "Burst exceeded, forbidding key"
                );
                (
                    Verdict::Forbidden,
                    BucketUpdate::forbidden(evaluation.excess, now_ms, spec.interval_secs),
                )
            }
            verdict => (verdict, BucketUpdate::admitted(evaluation.excess, now_ms)),
        };

        if let Err(err) = self.replicator.probe_writers().await {
            self.fail_open(zone, key, &err);
            return Verdict::Admit;
        }

        if let Err(err) = self.replicator.broadcast_write(zone, key, &update).await {
            self.fail_open(zone, key, &err);
            return Verdict::Admit;
        }

        debug!(
            zone,
            key,
            verdict = %verdict,
            excess = evaluation.excess,
            "Limit evaluated"
        );
        verdict
    }

    fn fail_open(&self, zone: &str, key: &str, err: &LimitError) {
        match self.log_level {
            LogLevel::Error => error!(zone, key, error = %err, "Limiter failing open"),
            LogLevel::Warn => warn!(zone, key, error = %err, "Limiter failing open"),
            LogLevel::Info => info!(zone, key, error = %err, "Limiter failing open"),
            LogLevel::Debug => debug!(zone, key, error = %err, "Limiter failing open"),
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
