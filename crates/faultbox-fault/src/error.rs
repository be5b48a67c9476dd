//! Error types for fault management.

use faultbox_store::TransportError;
use thiserror::Error;

use crate::FaultName;

/// Failure of an external command such as `tc`.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be launched at all.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{command}` exited with {status}: {output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },
}

/// Underlying reason a fault could not change state.
#[derive(Error, Debug)]
pub enum FaultCause {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The blocking burn worker panicked or was cancelled by the runtime.
    #[error("burn worker failed: {0}")]
    Worker(String),
}

/// Fault management errors.
#[derive(Error, Debug)]
pub enum FaultError {
    /// No registered fault answers to this name.
    #[error("fault {0} not found")]
    NotFound(String),

    /// A fault with this name is already registered.
    #[error("fault {0} is already registered")]
    AlreadyRegistered(FaultName),

    /// Activation failed; the fault stays inactive.
    #[error("failed to start {fault} fault: {source}")]
    Start {
        fault: FaultName,
        #[source]
        source: FaultCause,
    },

    /// Deactivation failed; the fault stays active.
    #[error("failed to stop {fault} fault: {source}")]
    Stop {
        fault: FaultName,
        #[source]
        source: FaultCause,
    },
}

impl FaultError {
    pub(crate) fn start(fault: FaultName, cause: impl Into<FaultCause>) -> Self {
        Self::Start {
            fault,
            source: cause.into(),
        }
    }

    pub(crate) fn stop(fault: FaultName, cause: impl Into<FaultCause>) -> Self {
        Self::Stop {
            fault,
            source: cause.into(),
        }
    }
}

/// Result type for fault operations.
pub type Result<T> = std::result::Result<T, FaultError>;
