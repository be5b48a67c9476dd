//! Fault control endpoints.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Json;
use faultbox_fault::{Fault, FaultName, FaultParams, FaultStatus};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Result of a single start or stop.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaultResponse {
    pub fault: FaultName,
    pub active: bool,
}

/// A fault that refused to stop during stop-all.
#[derive(Debug, Serialize, Deserialize)]
pub struct StopFailure {
    pub fault: FaultName,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopAllResponse {
    pub failed: Vec<StopFailure>,
}

/// An empty body means default parameters.
fn parse_params(body: &Bytes) -> Result<FaultParams, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FaultParams::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid fault parameters: {e}")))
}

/// GET /faults/status
pub async fn status(State(state): State<AppState>) -> Json<BTreeMap<FaultName, FaultStatus>> {
    Json(state.sandbox.faults().status())
}

/// GET /faults/active
pub async fn active(State(state): State<AppState>) -> Json<Vec<FaultName>> {
    Json(state.sandbox.faults().list_active())
}

/// POST /faults/{name}/start
pub async fn start(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<FaultResponse>, ApiError> {
    let params = parse_params(&body)?;
    let faults = state.sandbox.faults();
    faults.start_fault(&name, params).await?;

    let fault = faults.get(&name)?;
    Ok(Json(FaultResponse {
        fault: fault.name(),
        active: fault.is_active(),
    }))
}

/// POST /faults/{name}/stop
pub async fn stop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FaultResponse>, ApiError> {
    let faults = state.sandbox.faults();
    faults.stop_fault(&name).await?;

    let fault = faults.get(&name)?;
    Ok(Json(FaultResponse {
        fault: fault.name(),
        active: fault.is_active(),
    }))
}

/// POST /faults/stop-all
pub async fn stop_all(State(state): State<AppState>) -> Json<StopAllResponse> {
    let failed = state
        .sandbox
        .faults()
        .stop_all_faults()
        .await
        .into_iter()
        .map(|(fault, e)| StopFailure {
            fault,
            error: e.to_string(),
        })
        .collect();
    Json(StopAllResponse { failed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_uses_defaults() {
        assert_eq!(
            parse_params(&Bytes::new()).unwrap(),
            FaultParams::default()
        );
        assert_eq!(
            parse_params(&Bytes::from_static(b"  \n")).unwrap(),
            FaultParams::default()
        );
    }

    #[test]
    fn test_body_duration_parsed() {
        let params = parse_params(&Bytes::from_static(br#"{"duration": 300}"#)).unwrap();
        assert_eq!(params.duration, Some(300));
    }

    #[test]
    fn test_malformed_body_rejected() {
        assert!(matches!(
            parse_params(&Bytes::from_static(br#"{"duration": -1}"#)),
            Err(ApiError::BadRequest(_))
        ));
    }
}
