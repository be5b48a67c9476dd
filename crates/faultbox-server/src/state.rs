//! Shared state for the HTTP handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::service::Sandbox;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Store and fault registry.
    pub sandbox: Arc<Sandbox>,

    /// When this server instance came up.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self {
            sandbox,
            started_at: Utc::now(),
        }
    }
}
