//! Host network latency fault.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use faultbox_config::LatencyFaultConfig;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{FaultError, Result};
use crate::fault::{Fault, FaultName, FaultParams};
use crate::tc::TrafficControl;

/// Adds a fixed egress delay to the configured interface via `tc netem`.
///
/// The rule persists until `stop`; the requested delay is clamped to
/// `max_delay_ms`.
pub struct NetworkLatencyFault {
    config: LatencyFaultConfig,
    tc: Arc<dyn TrafficControl>,
    /// Held across the `tc` calls so a concurrent start cannot install twice.
    transition: Mutex<()>,
    active: AtomicBool,
    delay_ms: AtomicU64,
}

impl NetworkLatencyFault {
    pub fn new(config: LatencyFaultConfig, tc: Arc<dyn TrafficControl>) -> Self {
        Self {
            config,
            tc,
            transition: Mutex::new(()),
            active: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    /// Delay currently installed, if active.
    pub fn current_delay_ms(&self) -> Option<u64> {
        self.is_active()
            .then(|| self.delay_ms.load(Ordering::Acquire))
    }

    pub fn interface(&self) -> &str {
        &self.config.interface
    }
}

#[async_trait]
impl Fault for NetworkLatencyFault {
    fn name(&self) -> FaultName {
        FaultName::Latency
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    async fn start(&self, params: FaultParams) -> Result<()> {
        let _guard = self.transition.lock().await;
        if self.is_active() {
            debug!("network latency already active");
            return Ok(());
        }

        let delay_ms =
            params.resolve_clamped(self.config.default_delay_ms, self.config.max_delay_ms);
        let interface = self.config.interface.as_str();

        self.tc
            .clear_delay(interface)
            .await
            .map_err(|e| FaultError::start(FaultName::Latency, e))?;
        self.tc
            .install_delay(interface, delay_ms)
            .await
            .map_err(|e| FaultError::start(FaultName::Latency, e))?;

        self.delay_ms.store(delay_ms, Ordering::Release);
        self.active.store(true, Ordering::Release);
        info!(interface, delay_ms, "network latency injected");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        if !self.is_active() {
            return Ok(());
        }

        self.tc
            .clear_delay(&self.config.interface)
            .await
            .map_err(|e| FaultError::stop(FaultName::Latency, e))?;

        self.active.store(false, Ordering::Release);
        self.delay_ms.store(0, Ordering::Release);
        info!(interface = %self.config.interface, "network latency removed");
        Ok(())
    }
}
