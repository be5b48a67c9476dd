//! Data endpoint and liveness probe.

use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use faultbox_fault::FaultParams;
use faultbox_store::User;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::service::FaultSelector;
use crate::state::AppState;

/// Query string of `GET /api/users`.
///
/// `duration` is kept as text so a malformed value produces our JSON error
/// instead of the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    pub chaos: Option<String>,
    pub duration: Option<String>,
}

impl UsersQuery {
    pub fn params(&self) -> Result<FaultParams, ApiError> {
        let duration = match self.duration.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                ApiError::BadRequest(format!(
                    "duration must be a non-negative integer number of milliseconds, got {raw:?}"
                ))
            })?),
        };
        Ok(FaultParams { duration })
    }
}

/// Applies the requested chaos, then returns the user list.
///
/// GET /api/users?chaos=<name>&duration=<ms>
pub async fn get_users(
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let params = query.params()?;
    let selector = FaultSelector::from_query(query.chaos.as_deref());
    let users = state.sandbox.get_users(&selector, params).await?;
    Ok(Json(users))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}
