use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStatus {
    /// Installed and synced, waiting for the reboot. Owned by the orchestrator.
    Pending,
    /// Post-reboot confirmation running. Owned by the verification controller.
    Verifying,
    Committed,
    RolledBack,
    Failed,
}

impl SwitchStatus {
    /// Pending and Verifying block any new switch.
    pub fn is_in_flight(self) -> bool {
        matches!(self, SwitchStatus::Pending | SwitchStatus::Verifying)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_in_flight()
    }
}

impl fmt::Display for SwitchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchStatus::Pending => write!(f, "pending"),
            SwitchStatus::Verifying => write!(f, "verifying"),
            SwitchStatus::Committed => write!(f, "committed"),
            SwitchStatus::RolledBack => write!(f, "rolled back"),
            SwitchStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    /// User-requested; verified after reboot.
    #[default]
    Forward,
    /// Reverse of a rejected switch; committed at boot without verification.
    Rollback,
}

/// The durable handoff across the reboot boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub id: Uuid,
    pub previous_solution_id: String,
    pub target_solution_id: String,
    /// RFC 3339, UTC.
    pub requested_at: String,
    pub status: SwitchStatus,
    #[serde(default)]
    pub kind: SwitchKind,
    /// Why the record ended in Failed or RolledBack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SwitchRecord {
    pub fn new(previous: &str, target: &str, kind: SwitchKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            previous_solution_id: previous.to_string(),
            target_solution_id: target.to_string(),
            requested_at: chrono::Utc::now().to_rfc3339(),
            status: SwitchStatus::Pending,
            kind,
            reason: None,
        }
    }

    pub fn with_status(mut self, status: SwitchStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
