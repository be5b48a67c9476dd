//! The fault contract shared by every injector.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stable identifier of a fault kind.
///
/// These strings are the selector values accepted by the HTTP layer and the
/// keys of the status map, so they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultName {
    Cpu,
    Latency,
    RedisLatency,
}

impl FaultName {
    pub const ALL: [FaultName; 3] = [FaultName::Cpu, FaultName::Latency, FaultName::RedisLatency];

    pub fn as_str(self) -> &'static str {
        match self {
            FaultName::Cpu => "cpu",
            FaultName::Latency => "latency",
            FaultName::RedisLatency => "redis_latency",
        }
    }
}

impl fmt::Display for FaultName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known fault kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fault name: {0}")]
pub struct UnknownFault(pub String);

impl FromStr for FaultName {
    type Err = UnknownFault;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FaultName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownFault(s.to_string()))
    }
}

/// Parameters for a single activation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultParams {
    /// Milliseconds. Absent or zero selects the fault's default.
    pub duration: Option<u64>,
}

impl FaultParams {
    pub fn with_duration(duration_ms: u64) -> Self {
        Self {
            duration: Some(duration_ms),
        }
    }

    /// The requested duration, or `default_ms` when none was given.
    pub fn resolve(&self, default_ms: u64) -> u64 {
        match self.duration {
            Some(ms) if ms > 0 => ms,
            _ => default_ms,
        }
    }

    /// Like [`resolve`](Self::resolve) but never above `max_ms`.
    pub fn resolve_clamped(&self, default_ms: u64, max_ms: u64) -> u64 {
        self.resolve(default_ms).min(max_ms)
    }
}

/// Point-in-time view of one registered fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultStatus {
    pub name: FaultName,
    pub active: bool,
}

/// A pluggable failure injector.
///
/// `start` and `stop` are idempotent: starting an active fault and stopping an
/// inactive one both succeed without side effects. `is_active` reflects the
/// last successful transition.
#[async_trait]
pub trait Fault: Send + Sync {
    fn name(&self) -> FaultName;

    fn is_active(&self) -> bool;

    async fn start(&self, params: FaultParams) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    fn status(&self) -> FaultStatus {
        FaultStatus {
            name: self.name(),
            active: self.is_active(),
        }
    }
}
