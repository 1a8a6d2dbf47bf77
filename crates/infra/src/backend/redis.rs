//! Redis cache backend
//!
//! One multiplexed connection is opened up front and shared by every
//! caller. Each command runs under the configured operation timeout; the
//! infallible trait methods log failures and degrade to absent / no-op.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use recordcache_core::CacheBackend;
use recordcache_domain::{BackendConfig, RecordCacheError, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::errors::InfraError;

/// Redis-backed [`CacheBackend`] with an explicit open/close lifecycle.
pub struct RedisCacheBackend {
    connection: RwLock<Option<MultiplexedConnection>>,
    operation_timeout: Duration,
    scan_batch: usize,
}

impl RedisCacheBackend {
    /// Connect and verify the server answers `PING`.
    ///
    /// # Errors
    /// `Backend` when the URL is invalid or the server cannot be reached
    /// within the connect timeout.
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn open(config: &BackendConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(InfraError::from)?;

        let connect_timeout = config.connect_timeout();
        let connection =
            tokio::time::timeout(connect_timeout, client.get_multiplexed_async_connection())
                .await
                .map_err(|_| {
                    RecordCacheError::Backend(format!(
                        "redis connect timed out after {}ms",
                        connect_timeout.as_millis()
                    ))
                })?
                .map_err(InfraError::from)?;

        let backend = Self {
            connection: RwLock::new(Some(connection)),
            operation_timeout: config.operation_timeout(),
            scan_batch: config.scan_batch.max(1),
        };
        backend.ping().await?;

        info!("redis cache backend connected");
        Ok(backend)
    }

    /// Drop the connection. Later calls behave as if the backend were down.
    pub async fn close(&self) {
        if self.connection.write().await.take().is_some() {
            info!("redis cache backend closed");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.connection.read().await.is_some()
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| RecordCacheError::Backend("redis backend is closed".into()))
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result.map_err(|err| InfraError::from(err).into()),
            Err(_) => Err(RecordCacheError::Backend(format!(
                "redis {op} timed out after {}ms",
                self.operation_timeout.as_millis()
            ))),
        }
    }
}

fn degrade<T>(op: &'static str, key: &str, result: Result<T>, fallback: T) -> T {
    result.unwrap_or_else(|err| {
        warn!(op, key, error = %err, "cache backend call failed, degrading");
        fallback
    })
}

/// Redis `PSETEX` rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result: Result<Option<Vec<u8>>> = async {
            let mut conn = self.connection().await?;
            self.bounded("GET", conn.get::<_, Option<Vec<u8>>>(key)).await
        }
        .await;
        degrade("GET", key, result, None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) {
        let result: Result<()> = async {
            let mut conn = self.connection().await?;
            self.bounded("PSETEX", conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))).await
        }
        .await;
        degrade("PSETEX", key, result, ());
    }

    async fn delete(&self, key: &str) {
        let result: Result<()> = async {
            let mut conn = self.connection().await?;
            self.bounded("DEL", conn.del::<_, ()>(key)).await
        }
        .await;
        degrade("DEL", key, result, ());
    }

    async fn exists(&self, key: &str) -> bool {
        let result: Result<bool> = async {
            let mut conn = self.connection().await?;
            self.bounded("EXISTS", conn.exists::<_, bool>(key)).await
        }
        .await;
        degrade("EXISTS", key, result, false)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(self.scan_batch);
            let (next, keys): (u64, Vec<String>) =
                self.bounded("SCAN", cmd.query_async(&mut conn)).await?;

            found.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        found.sort();
        found.dedup();
        debug!(pattern, count = found.len(), "scanned keys");
        Ok(found)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let cmd = redis::cmd("PING");
        let _: String = self.bounded("PING", cmd.query_async(&mut conn)).await?;
        Ok(())
    }
}
