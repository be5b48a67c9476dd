//! Redis-backed cache.
//!
//! The connection may point at Redis directly or at the latency proxy in
//! front of it; only the proxy understands `FAULT.START` / `FAULT.STOP`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use faultbox_config::CacheConfig;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::backend::CacheClient;
use crate::error::{TransportError, TransportResult};

const BACKEND: &str = "redis";

pub struct RedisCache {
    connection: MultiplexedConnection,
    connected: AtomicBool,
}

impl RedisCache {
    /// Connects and verifies the link with a `PING`.
    pub async fn connect(config: &CacheConfig) -> TransportResult<Self> {
        let connect_error = |message: String| TransportError::Connect {
            backend: BACKEND,
            message,
        };

        let client =
            redis::Client::open(config.url.as_str()).map_err(|e| connect_error(e.to_string()))?;

        let mut connection = tokio::time::timeout(
            config.connect_timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            connect_error(format!(
                "timed out after {}ms",
                config.connect_timeout_ms
            ))
        })?
        .map_err(|e| connect_error(e.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        tracing::info!(reply = %pong, "Redis cache connected");

        Ok(Self {
            connection,
            connected: AtomicBool::new(true),
        })
    }

    fn command_error(&self, err: &redis::RedisError) -> TransportError {
        if err.is_connection_dropped() || err.is_io_error() {
            self.connected.store(false, Ordering::Release);
        }
        TransportError::Command {
            backend: BACKEND,
            message: err.to_string(),
        }
    }

    fn connection(&self) -> TransportResult<MultiplexedConnection> {
        if self.is_connected() {
            Ok(self.connection.clone())
        } else {
            Err(TransportError::Disconnected { backend: BACKEND })
        }
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn get(&self, key: &str) -> TransportResult<Option<String>> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.get(key).await.map_err(|e| self.command_error(&e))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> TransportResult<()> {
        let mut conn = self.connection()?;
        let result: redis::RedisResult<()> = match ttl {
            Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await,
            None => conn.set(key, value).await,
        };
        result.map_err(|e| self.command_error(&e))
    }

    async fn send_control(&self, args: &[String]) -> TransportResult<String> {
        let Some((name, rest)) = args.split_first() else {
            return Err(TransportError::Command {
                backend: BACKEND,
                message: "empty control command".to_string(),
            });
        };

        let mut conn = self.connection()?;
        let mut cmd = redis::cmd(name);
        for arg in rest {
            cmd.arg(arg);
        }
        let reply: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| self.command_error(&e))?;
        Ok(reply)
    }

    async fn close(&self) {
        // Dropping the last clone of the multiplexed connection tears it down;
        // until then, refuse further commands.
        self.connected.store(false, Ordering::Release);
        tracing::info!("Redis cache closed");
    }
}
