//! IRIS error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during IRIS loop execution
#[derive(Debug, Error)]
pub enum IrisError {
    #[error("ERR_ENFORCEMENT_VIOLATION: MUST_READ_FIRST - file {file} is not in read state")]
    EnforcementViolation { file: String },

    #[error("Context not initialized at {0} (run `init` first)")]
    NotInitialized(PathBuf),

    #[error("Verification failed for {file}: {reason}")]
    VerifyFailed { file: String, reason: String },

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Edit rejected for {file}")]
    EditRejected { file: String },

    #[error("Lock error on {path}: {reason}")]
    Lock { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IrisError {
    /// Check if this error is an enforcement violation
    pub fn is_enforcement_violation(&self) -> bool {
        matches!(self, IrisError::EnforcementViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enforcement_violation_message() {
        let err = IrisError::EnforcementViolation {
            file: "src/lib.rs".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.starts_with("ERR_ENFORCEMENT_VIOLATION"));
        assert!(msg.contains("src/lib.rs"));
        assert!(err.is_enforcement_violation());
    }

    #[test]
    fn test_verify_failed_message() {
        let err = IrisError::VerifyFailed {
            file: "config.json".to_string(),
            reason: "trailing comma".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("config.json"));
        assert!(msg.contains("trailing comma"));
        assert!(!err.is_enforcement_violation());
    }
}
