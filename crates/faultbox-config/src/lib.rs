//! Configuration management for Faultbox
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (FAULTBOX_* prefix, `__` between sections)
//! 2. faultbox.local.toml (gitignored, local overrides)
//! 3. faultbox.toml (git-tracked, project config)
//! 4. ~/.config/faultbox/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The resolved [`FaultboxConfig`] is built once at startup and handed by
//! reference to the store, the fault constructors and the HTTP layer.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Faultbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultboxConfig {
    pub server: ServerConfig,
    pub primary: PrimaryConfig,
    pub cache: CacheConfig,
    pub data: DataConfig,
    pub faults: FaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3500".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Durable record store (MySQL).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    pub enabled: bool,
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "mysql://root@localhost:3306/sandbox".to_string(),
            max_connections: 10,
            connect_timeout_ms: 3_000,
        }
    }
}

impl PrimaryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Fast, lossy store (Redis, or the latency proxy in front of it).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub url: String,
    /// Entry expiry in seconds; 0 keeps entries until evicted.
    pub ttl_secs: u64,
    pub connect_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://localhost:6379/0".to_string(),
            ttl_secs: 0,
            connect_timeout_ms: 1_000,
        }
    }
}

impl CacheConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Number of records synthesized whenever real data is missing.
    pub mock_count: usize,
    /// Artificial delay standing in for an external fetch when no cache is available.
    pub simulated_fetch_delay_ms: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            mock_count: 10,
            simulated_fetch_delay_ms: 10,
        }
    }
}

impl DataConfig {
    pub fn simulated_fetch_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_fetch_delay_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultsConfig {
    pub cpu: CpuFaultConfig,
    pub latency: LatencyFaultConfig,
    pub downstream: DownstreamFaultConfig,
}

/// Deepest Fibonacci argument a burn may use. Anything deeper makes a single
/// iteration outlast a stop request.
pub const MAX_BURN_DEPTH: u32 = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuFaultConfig {
    pub default_duration_ms: u64,
    /// Argument of the recursive Fibonacci evaluated on every burn iteration.
    pub burn_depth: u32,
}

impl Default for CpuFaultConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: 200,
            burn_depth: 38,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyFaultConfig {
    pub default_delay_ms: u64,
    pub max_delay_ms: u64,
    pub interface: String,
    pub tc_binary: String,
    /// Log the `tc` invocations instead of running them.
    pub dry_run: bool,
}

impl Default for LatencyFaultConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 200,
            max_delay_ms: 5_000,
            interface: "eth0".to_string(),
            tc_binary: "tc".to_string(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamFaultConfig {
    pub default_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DownstreamFaultConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

impl FaultboxConfig {
    /// Load configuration rooted at the current directory
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration rooted at `project_dir`
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Create a configuration that never touches a real MySQL, Redis or
    /// network interface.
    pub fn development() -> Self {
        let mut faults = FaultsConfig::default();
        faults.latency.dry_run = true;
        Self {
            primary: PrimaryConfig {
                enabled: false,
                ..Default::default()
            },
            cache: CacheConfig {
                enabled: false,
                ..Default::default()
            },
            faults,
            ..Default::default()
        }
    }

    /// Reject settings the fault and data layers cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.mock_count == 0 {
            return Err(ConfigError::ValidationError(
                "data.mock_count must be at least 1".to_string(),
            ));
        }

        let cpu = &self.faults.cpu;
        if cpu.burn_depth > MAX_BURN_DEPTH {
            return Err(ConfigError::ValidationError(format!(
                "faults.cpu.burn_depth ({}) exceeds {MAX_BURN_DEPTH}",
                cpu.burn_depth
            )));
        }

        let latency = &self.faults.latency;
        if latency.default_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "faults.latency.default_delay_ms must be at least 1".to_string(),
            ));
        }
        if latency.max_delay_ms < latency.default_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "faults.latency.max_delay_ms ({}) is below default_delay_ms ({})",
                latency.max_delay_ms, latency.default_delay_ms
            )));
        }
        if latency.interface.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "faults.latency.interface must not be empty".to_string(),
            ));
        }

        let downstream = &self.faults.downstream;
        if downstream.default_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "faults.downstream.default_delay_ms must be at least 1".to_string(),
            ));
        }
        if downstream.max_delay_ms < downstream.default_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "faults.downstream.max_delay_ms ({}) is below default_delay_ms ({})",
                downstream.max_delay_ms, downstream.default_delay_ms
            )));
        }

        Ok(())
    }
}
