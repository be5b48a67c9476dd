//! Cache-path latency fault.
//!
//! The cache is reached through a latency proxy that accepts two extra
//! commands on the cache connection: `FAULT.START <ms>` and `FAULT.STOP`.
//! With no live cache the fault only flips its own state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use faultbox_config::DownstreamFaultConfig;
use faultbox_store::{Backend, CacheBackend};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{FaultError, Result};
use crate::fault::{Fault, FaultName, FaultParams};

pub const START_COMMAND: &str = "FAULT.START";
pub const STOP_COMMAND: &str = "FAULT.STOP";

/// Delays every cache round-trip by a fixed amount.
///
/// Unlike the other faults, starting with a different delay while active
/// re-issues the command with the new value.
pub struct DownstreamLatencyFault {
    config: DownstreamFaultConfig,
    cache: CacheBackend,
    transition: Mutex<()>,
    active: AtomicBool,
    delay_ms: AtomicU64,
}

impl DownstreamLatencyFault {
    pub fn new(config: DownstreamFaultConfig, cache: CacheBackend) -> Self {
        Self {
            config,
            cache,
            transition: Mutex::new(()),
            active: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    /// Delay currently applied, if active.
    pub fn current_delay_ms(&self) -> Option<u64> {
        self.is_active()
            .then(|| self.delay_ms.load(Ordering::Acquire))
    }

    /// Whether commands actually reach a cache or are only simulated.
    pub fn is_simulated(&self) -> bool {
        self.cache.is_mock()
    }
}

#[async_trait]
impl Fault for DownstreamLatencyFault {
    fn name(&self) -> FaultName {
        FaultName::RedisLatency
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    async fn start(&self, params: FaultParams) -> Result<()> {
        let _guard = self.transition.lock().await;
        let delay_ms =
            params.resolve_clamped(self.config.default_delay_ms, self.config.max_delay_ms);

        if self.current_delay_ms() == Some(delay_ms) {
            debug!(delay_ms, "cache latency already at requested delay");
            return Ok(());
        }

        match &self.cache {
            Backend::Live(client) => {
                let args = [START_COMMAND.to_string(), delay_ms.to_string()];
                client
                    .send_control(&args)
                    .await
                    .map_err(|e| FaultError::start(FaultName::RedisLatency, e))?;
                info!(delay_ms, "cache latency injected");
            }
            Backend::Mock => info!(delay_ms, "cache latency simulated (no cache backend)"),
        }

        self.delay_ms.store(delay_ms, Ordering::Release);
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        if !self.is_active() {
            return Ok(());
        }

        match &self.cache {
            Backend::Live(client) => {
                client
                    .send_control(&[STOP_COMMAND.to_string()])
                    .await
                    .map_err(|e| FaultError::stop(FaultName::RedisLatency, e))?;
                info!("cache latency removed");
            }
            Backend::Mock => info!("simulated cache latency cleared"),
        }

        self.active.store(false, Ordering::Release);
        self.delay_ms.store(0, Ordering::Release);
        Ok(())
    }
}
