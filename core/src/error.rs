use thiserror::Error;

use crate::lifecycle::BridgePhase;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("surface container '{container_id}' not found")]
    Attach { container_id: String },

    #[error("geometry runtime failed to initialize: {reason}")]
    RuntimeInit { reason: String },

    #[error("failed to read '{name}': {reason}")]
    FileRead { name: String, reason: String },

    #[error("failed to transfer '{name}' into the runtime: {reason}")]
    RuntimeTransfer { name: String, reason: String },

    #[error("runtime is not ready (phase: {phase})")]
    NotReady { phase: BridgePhase },

    #[error("a load is already in flight (phase: {phase})")]
    Busy { phase: BridgePhase },

    #[error("viewer has been disposed")]
    Disposed,
}

impl BridgeError {
    /// Stable identifier reported to the boot overlay.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Attach { .. } => "attach",
            BridgeError::RuntimeInit { .. } => "runtime_init",
            BridgeError::FileRead { .. } => "file_read",
            BridgeError::RuntimeTransfer { .. } => "runtime_transfer",
            BridgeError::NotReady { .. } => "not_ready",
            BridgeError::Busy { .. } => "busy",
            BridgeError::Disposed => "disposed",
        }
    }

    /// Fatal errors end the session; the rest leave the viewer usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Attach { .. } | BridgeError::RuntimeInit { .. }
        )
    }

    pub fn hint(&self) -> &'static str {
        match self {
            BridgeError::Attach { .. } | BridgeError::RuntimeInit { .. } => "Reload the page to retry.",
            BridgeError::FileRead { .. } => "Pick the file again.",
            BridgeError::RuntimeTransfer { .. } => {
                "The file may be too large or the viewer state corrupted."
            }
            BridgeError::NotReady { .. } | BridgeError::Busy { .. } => {
                "Wait for the current load to finish."
            }
            BridgeError::Disposed => "",
        }
    }
}
