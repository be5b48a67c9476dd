//! Fault injection for Faultbox.
//!
//! Provides the pluggable failure injectors and the registry that drives them:
//! - `cpu`: saturates a core with recursive Fibonacci for a bounded time
//! - `latency`: adds egress delay on a host interface with `tc netem`
//! - `redis_latency`: asks the cache-side proxy to delay every round-trip
//!
//! Every fault is idempotent to start and stop, and the manager's stop-all
//! never fails as a whole.

pub mod cpu;
pub mod downstream;
pub mod error;
pub mod fault;
pub mod manager;
pub mod network;
pub mod tc;

pub use cpu::CpuBurnFault;
pub use downstream::DownstreamLatencyFault;
pub use error::{CommandError, FaultCause, FaultError, Result};
pub use fault::{Fault, FaultName, FaultParams, FaultStatus, UnknownFault};
pub use manager::FaultManager;
pub use network::NetworkLatencyFault;
pub use tc::{DryRunTrafficControl, TcCommand, TrafficControl};

use std::sync::Arc;

use faultbox_config::{FaultsConfig, LatencyFaultConfig};
use faultbox_store::CacheBackend;

/// Chooses the traffic-control implementation the latency fault should use.
pub fn traffic_control(config: &LatencyFaultConfig) -> Arc<dyn TrafficControl> {
    if config.dry_run {
        Arc::new(DryRunTrafficControl::new())
    } else {
        Arc::new(TcCommand::new(config.tc_binary.clone()))
    }
}

/// Builds a manager with the three standard faults registered.
pub fn standard_faults(
    config: &FaultsConfig,
    cache: CacheBackend,
    tc: Arc<dyn TrafficControl>,
) -> Result<FaultManager> {
    let mut manager = FaultManager::new();
    manager.register(Arc::new(CpuBurnFault::new(config.cpu.clone())))?;
    manager.register(Arc::new(NetworkLatencyFault::new(
        config.latency.clone(),
        tc,
    )))?;
    manager.register(Arc::new(DownstreamLatencyFault::new(
        config.downstream.clone(),
        cache,
    )))?;
    Ok(manager)
}
