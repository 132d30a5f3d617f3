//! Key/value store access.
//!
//! [`StoreClient`] is the seam between the limiter and a single replica.
//! [`RedisStore`] implements it over a kept-alive multiplexed connection.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Endpoint;
use crate::error::{LimitError, LimitResult};

#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Name of the replica, used in diagnostics.
    fn name(&self) -> &str;

    /// Make sure a usable connection exists, establishing it if needed.
    async fn connect(&self) -> LimitResult<()>;

    async fn get(&self, key: &str) -> LimitResult<Option<Vec<u8>>>;

    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> LimitResult<()>;

    async fn ping(&self) -> LimitResult<()>;
}

pub struct RedisStore {
    name: String,
    client: Client,
    timeout: Duration,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn new(endpoint: &Endpoint) -> LimitResult<Self> {
        let client = Client::open(endpoint.connection_info()?).map_err(|e| {
            LimitError::Config(format!(
                "Invalid Redis endpoint {}: {}",
                endpoint.label(),
                e
            ))
        })?;

        Ok(Self {
            name: endpoint.label(),
            client,
            timeout: endpoint.timeout,
            connection: Mutex::new(None),
        })
    }

    /// Hand out a handle to the kept-alive connection, connecting first when
    /// there is none. The slot lock is not held while connecting, so a dead
    /// replica costs each concurrent request one timeout at most. The handle
    /// is dropped by the caller once its command finishes, cancellation
    /// included.
    async fn checkout(&self) -> LimitResult<MultiplexedConnection> {
        if let Some(conn) = self.connection.lock().await.as_ref() {
            return Ok(conn.clone());
        }

        debug!(replica = %self.name, "Connecting to Redis");
        let conn = self
            .bounded("connect", self.client.get_multiplexed_tokio_connection())
            .await
            .map_err(|e| LimitError::Setup {
                replica: self.name.clone(),
                message: e.to_string(),
            })?;

        // Another request may have connected meanwhile; keep the first one.
        let mut slot = self.connection.lock().await;
        Ok(slot.get_or_insert(conn).clone())
    }

    /// Drop the cached connection so the next checkout reconnects.
    async fn discard(&self) {
        let mut slot = self.connection.lock().await;
        if slot.take().is_some() {
            debug!(replica = %self.name, "Discarding Redis connection");
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> LimitResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(LimitError::from),
            Err(_) => Err(LimitError::Timeout {
                operation,
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn run<T: redis::FromRedisValue + Send>(
        &self,
        operation: &'static str,
        cmd: redis::Cmd,
    ) -> LimitResult<T> {
        let mut conn = self.checkout().await?;
        let result = self.bounded(operation, cmd.query_async::<_, T>(&mut conn)).await;
        if result.is_err() {
            self.discard().await;
        }
        result
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> LimitResult<()> {
        self.checkout().await.map(|_| ())
    }

    async fn get(&self, key: &str) -> LimitResult<Option<Vec<u8>>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run("GET", cmd).await.map_err(|e| LimitError::Read {
            replica: self.name.clone(),
            message: e.to_string(),
        })
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> LimitResult<()> {
        let mut cmd = redis::cmd("SETEX");
        cmd.arg(key).arg(ttl_secs).arg(value);
        self.run::<()>("SETEX", cmd).await
    }

    async fn ping(&self) -> LimitResult<()> {
        let reply: String = self
            .run("PING", redis::cmd("PING"))
            .await
            .map_err(|e| LimitError::Probe {
                replica: self.name.clone(),
                message: e.to_string(),
            })?;
        if reply != "PONG" {
            return Err(LimitError::Probe {
                replica: self.name.clone(),
                message: format!("unexpected reply {}", reply),
            });
        }
        Ok(())
    }
}
