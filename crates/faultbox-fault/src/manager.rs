//! Registry that owns every fault and routes lifecycle commands to them.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::{FaultError, Result};
use crate::fault::{Fault, FaultName, FaultParams, FaultStatus};

/// Registry of named faults.
///
/// Faults are registered once at startup; afterwards the manager is shared
/// read-only and each fault handles its own concurrency.
#[derive(Default)]
pub struct FaultManager {
    /// Registered faults, in registration order.
    faults: Vec<Arc<dyn Fault>>,
}

impl FaultManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fault. Names are unique; a second registration is rejected.
    pub fn register(&mut self, fault: Arc<dyn Fault>) -> Result<()> {
        let name = fault.name();
        if self.faults.iter().any(|existing| existing.name() == name) {
            return Err(FaultError::AlreadyRegistered(name));
        }
        self.faults.push(fault);
        Ok(())
    }

    /// Looks up a fault by its selector string.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn Fault>> {
        let parsed: Option<FaultName> = name.parse().ok();
        parsed
            .and_then(|parsed| self.faults.iter().find(|fault| fault.name() == parsed))
            .ok_or_else(|| FaultError::NotFound(name.to_string()))
    }

    /// Names of all registered faults, in registration order.
    pub fn names(&self) -> Vec<FaultName> {
        self.faults.iter().map(|fault| fault.name()).collect()
    }

    /// Starts the named fault.
    pub async fn start_fault(&self, name: &str, params: FaultParams) -> Result<()> {
        let fault = self.get(name)?;
        fault.start(params).await?;
        info!(fault = %fault.name(), duration = ?params.duration, "fault started");
        Ok(())
    }

    /// Stops the named fault.
    pub async fn stop_fault(&self, name: &str) -> Result<()> {
        let fault = self.get(name)?;
        fault.stop().await?;
        info!(fault = %fault.name(), "fault stopped");
        Ok(())
    }

    /// Stops every registered fault concurrently.
    ///
    /// Never fails: individual stop errors are logged and handed back so the
    /// caller can report them, and every fault gets its stop attempt.
    pub async fn stop_all_faults(&self) -> Vec<(FaultName, FaultError)> {
        let results = join_all(self.faults.iter().map(|fault| async move {
            (fault.name(), fault.stop().await)
        }))
        .await;

        let failures: Vec<_> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e)))
            .collect();

        for (name, e) in &failures {
            warn!(fault = %name, error = %e, "failed to stop fault");
        }
        info!(
            faults = self.faults.len(),
            failed = failures.len(),
            "stop-all completed"
        );
        failures
    }

    /// Current activity of every registered fault.
    pub fn status(&self) -> BTreeMap<FaultName, FaultStatus> {
        self.faults
            .iter()
            .map(|fault| (fault.name(), fault.status()))
            .collect()
    }

    /// Names of the faults that are active right now.
    pub fn list_active(&self) -> Vec<FaultName> {
        self.faults
            .iter()
            .filter(|fault| fault.is_active())
            .map(|fault| fault.name())
            .collect()
    }
}
