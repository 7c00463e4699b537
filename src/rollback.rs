use crate::catalog;
use crate::error::{Error, Result};
use crate::notify::{Notifier, NotifyEvent};
use crate::orchestrator::{SwitchGuard, SwitchOrchestrator};
use crate::record::{SwitchKind, SwitchRecord, SwitchStatus};
use crate::store::StateStore;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// A reverse switch was started; it is Pending and a reboot was requested.
    Reversed(SwitchRecord),
    /// The record had already been rolled back. Nothing was done.
    AlreadyRolledBack,
}

/// Undoes a rejected switch by driving a reverse switch to the previous
/// solution. Safe to call more than once for the same record.
#[derive(Clone)]
pub struct RollbackManager {
    orchestrator: Arc<SwitchOrchestrator>,
    store: StateStore,
}

impl RollbackManager {
    pub fn new(orchestrator: Arc<SwitchOrchestrator>, store: StateStore) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    fn notifier(&self) -> &Arc<dyn Notifier> {
        self.orchestrator.notifier()
    }

    /// Mark `record` RolledBack and start the reverse switch.
    ///
    /// A no-op when `record` is already RolledBack or is no longer the
    /// in-flight record. A failed reverse is reported and returned as
    /// `RollbackFailed`; it is never retried.
    pub async fn rollback(
        &self,
        guard: &SwitchGuard<'_>,
        record: &SwitchRecord,
        reason: &str,
    ) -> Result<RollbackOutcome> {
        if record.status == SwitchStatus::RolledBack {
            tracing::debug!(record = %record.id, "already rolled back");
            return Ok(RollbackOutcome::AlreadyRolledBack);
        }

        let stored = match self.store.load_record()? {
            Some(stored) if stored.id == record.id && stored.status.is_in_flight() => stored,
            _ => {
                tracing::debug!(record = %record.id, "record no longer in flight; nothing to roll back");
                return Ok(RollbackOutcome::AlreadyRolledBack);
            }
        };

        tracing::warn!(
            record = %stored.id,
            solution = %stored.target_solution_id,
            reason,
            "rolling back"
        );
        let rolled_back = stored.with_status(SwitchStatus::RolledBack).with_reason(reason);
        let previous_name = display_name(&rolled_back.previous_solution_id);

        match self.orchestrator.reverse(guard, &rolled_back).await {
            Ok(reverse) => Ok(RollbackOutcome::Reversed(reverse)),
            Err(e) => {
                let reason = match e {
                    Error::InstallFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                tracing::error!(
                    record = %rolled_back.id,
                    solution = %previous_name,
                    reason = %reason,
                    "rollback failed"
                );
                self.notifier()
                    .notify(NotifyEvent::RollbackFailed, &previous_name);
                Err(Error::RollbackFailed {
                    solution: previous_name,
                    reason,
                })
            }
        }
    }

    /// Commit a reverse switch found Pending at boot. The previous solution
    /// was known good, so there is nothing to verify.
    pub fn complete(&self, record: &SwitchRecord) -> Result<SwitchRecord> {
        if record.kind != SwitchKind::Rollback || record.status != SwitchStatus::Pending {
            return Err(Error::State(format!(
                "record {} is not a pending rollback",
                record.id
            )));
        }

        let committed = record.clone().with_status(SwitchStatus::Committed);
        self.store
            .set_current_solution(&committed.target_solution_id)?;
        self.store.finish(&committed)?;

        let restored = display_name(&committed.target_solution_id);
        tracing::info!(record = %committed.id, solution = %restored, "rollback completed");
        self.notifier().notify(
            NotifyEvent::RolledBack {
                abandoned: display_name(&committed.previous_solution_id),
            },
            &restored,
        );
        Ok(committed)
    }
}

fn display_name(id: &str) -> String {
    catalog::find(id)
        .map(|s| s.name.to_string())
        .unwrap_or_else(|| id.to_string())
}
