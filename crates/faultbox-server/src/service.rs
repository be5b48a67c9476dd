//! Request orchestration: apply the requested chaos, then serve user data.

use faultbox_fault::{FaultManager, FaultName, FaultParams};
use faultbox_store::{Store, StoreError, User};
use tracing::{info, warn};

/// What a data request asks the fault layer to do before serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultSelector {
    /// Clear every active fault.
    StopAll,
    /// Start the fault with this name.
    Start(String),
}

impl FaultSelector {
    /// Interprets the `chaos` query parameter. Absent, blank and `none` all
    /// mean "stop everything".
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("" | "none") => FaultSelector::StopAll,
            Some(name) => FaultSelector::Start(name.to_string()),
        }
    }
}

/// The store and fault registry behind every HTTP handler.
pub struct Sandbox {
    store: Store,
    faults: FaultManager,
}

impl Sandbox {
    pub fn new(store: Store, faults: FaultManager) -> Self {
        Self { store, faults }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn faults(&self) -> &FaultManager {
        &self.faults
    }

    /// Applies `selector` and returns the user records.
    ///
    /// Fault failures are logged and never block serving. The cache path is
    /// always exercised so that downstream latency shows up in the request,
    /// but the response is the primary store's view.
    pub async fn get_users(
        &self,
        selector: &FaultSelector,
        params: FaultParams,
    ) -> Result<Vec<User>, StoreError> {
        match selector {
            FaultSelector::StopAll => {
                let failures = self.faults.stop_all_faults().await;
                if !failures.is_empty() {
                    warn!(failed = failures.len(), "some faults did not stop");
                }
            }
            FaultSelector::Start(name) => {
                if let Err(e) = self.faults.start_fault(name, params).await {
                    warn!(fault = %name, error = %e, "requested fault did not start");
                }
            }
        }

        let cached = self.store.query_users_from_cache().await;
        let users = self.store.query_users_from_primary().await?;
        info!(
            cached = cached.len(),
            served = users.len(),
            "users served"
        );
        Ok(users)
    }

    /// Clears every fault, then closes the store.
    ///
    /// Returns the faults that could not be stopped.
    pub async fn shutdown(&self) -> Vec<FaultName> {
        let failures = self.faults.stop_all_faults().await;
        self.store.close().await;
        info!(failed = failures.len(), "sandbox shut down");
        failures.into_iter().map(|(name, _)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(None, FaultSelector::StopAll ; "absent")]
    #[test_case(Some(""), FaultSelector::StopAll ; "empty")]
    #[test_case(Some("  "), FaultSelector::StopAll ; "blank")]
    #[test_case(Some("none"), FaultSelector::StopAll ; "none keyword")]
    #[test_case(Some("cpu"), FaultSelector::Start("cpu".to_string()) ; "named fault")]
    #[test_case(Some("bogus"), FaultSelector::Start("bogus".to_string()) ; "unknown name is still a start")]
    fn test_selector_from_query(value: Option<&str>, expected: FaultSelector) {
        assert_eq!(FaultSelector::from_query(value), expected);
    }
}
