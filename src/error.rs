use serde::Serialize;
use thiserror::Error;

/// Failure categories shared by the gateway and every sync subsystem.
///
/// Each variant renders as a distinct, human-readable message; the
/// subsystems decide per category whether a loop keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SyncError {
    /// Network or connectivity failure. Retried by the next scheduled tick.
    #[error("data source unreachable: {0}")]
    Transport(String),

    /// The remote refused access to the requested identifier.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The response did not have the expected shape.
    #[error("unexpected response from data source: {0}")]
    Protocol(String),

    /// Rejected locally before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The local cache could not commit a write.
    #[error("cache commit failed: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "transport",
            SyncError::PermissionDenied(_) => "permission_denied",
            SyncError::Protocol(_) => "protocol",
            SyncError::Validation(_) => "validation",
            SyncError::Storage(_) => "storage",
        }
    }
}

/// Reject blank identifiers before they reach the network.
pub fn require_id(field: &str, value: &str) -> Result<String, SyncError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}
