use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("hardware is not currently supported")]
    UnsupportedHardware,

    #[error("a driver switch is already in progress")]
    SwitchInProgress,

    #[error("solution '{id}' is not available for the detected hardware")]
    InvalidSolution { id: String },

    #[error("solution '{id}' is already active")]
    AlreadyActive { id: String },

    #[error("installing {solution} failed: {reason}")]
    InstallFailed { solution: String, reason: String },

    #[error("disk sync failed: {0}")]
    SyncFailed(String),

    #[error("disk sync cancelled before reboot")]
    SyncCancelled,

    #[error("rollback to {solution} failed: {reason}; manual intervention required")]
    RollbackFailed { solution: String, reason: String },

    #[error("state file error: {0}")]
    State(String),

    #[error("sysfs read failed: {path}: {source}")]
    SysfsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error for {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("not running as root (required for {operation})")]
    NotRoot { operation: String },

    #[error("bootloader config error: {0}")]
    Bootloader(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SwitchInProgress)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_switch_in_progress_is_retryable() {
        assert!(Error::SwitchInProgress.is_retryable());
        assert!(!Error::UnsupportedHardware.is_retryable());
        assert!(
            !Error::InstallFailed {
                solution: "x".to_string(),
                reason: "y".to_string()
            }
            .is_retryable()
        );
        assert!(
            !Error::InvalidSolution {
                id: "x".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_rollback_failure_mentions_manual_intervention() {
        let err = Error::RollbackFailed {
            solution: "NVIDIA Default Driver".to_string(),
            reason: "hook exited with status 1".to_string(),
        };
        assert!(err.to_string().contains("manual intervention"));
    }
}
