//! The engine as a whole: what the CLI talks to.
//!
//! `resume` is the boot-time entry point. Whatever the last boot left in
//! the record slot decides what happens next:
//!
//! | slot                     | action                                   |
//! |--------------------------|------------------------------------------|
//! | empty                    | nothing                                  |
//! | Pending, forward         | verify the new driver                    |
//! | Verifying                | verification never finished: roll back   |
//! | Pending, rollback        | commit the restored driver               |

use crate::catalog::{self, Solution};
use crate::error::{Error, Result};
use crate::orchestrator::SwitchOrchestrator;
use crate::record::{SwitchKind, SwitchRecord, SwitchStatus};
use crate::rollback::{RollbackManager, RollbackOutcome};
use crate::status;
use crate::store::StateStore;
use crate::sync::SyncControl;
use crate::verify::{Presenter, VerificationController, VerificationOutcome};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupAction {
    Idle,
    Verified(VerificationOutcome),
    RollbackCompleted(SwitchRecord),
}

pub struct Engine {
    store: StateStore,
    orchestrator: Arc<SwitchOrchestrator>,
    rollback: RollbackManager,
    controller: VerificationController,
}

impl Engine {
    pub fn new(
        store: StateStore,
        orchestrator: SwitchOrchestrator,
        presenter: Arc<dyn Presenter>,
        verify_timeout: Duration,
    ) -> Self {
        let orchestrator = Arc::new(orchestrator);
        let rollback = RollbackManager::new(orchestrator.clone(), store.clone());
        let controller = VerificationController::new(
            store.clone(),
            presenter,
            rollback.clone(),
            orchestrator.notifier().clone(),
            verify_timeout,
        );
        Self {
            store,
            orchestrator,
            rollback,
            controller,
        }
    }

    pub fn orchestrator(&self) -> &SwitchOrchestrator {
        &self.orchestrator
    }

    pub fn controller(&self) -> &VerificationController {
        &self.controller
    }

    pub fn list_solutions(&self) -> Result<Vec<&'static Solution>> {
        catalog::solutions_for(self.orchestrator.profile())
    }

    pub fn active_solution(&self) -> Result<&'static Solution> {
        self.orchestrator.active_solution()
    }

    /// Switch to the solution with the given id.
    pub async fn request_switch(
        &self,
        id: &str,
        control: &mut SyncControl,
    ) -> Result<SwitchRecord> {
        let target = catalog::find(id).ok_or_else(|| Error::InvalidSolution {
            id: id.to_string(),
        })?;
        self.orchestrator.request_switch(target, control).await
    }

    pub fn current_status(&self) -> Result<Option<SwitchRecord>> {
        status::current_status(&self.store)
    }

    /// Roll back the given record. A no-op if it already was.
    pub async fn rollback(&self, record: &SwitchRecord, reason: &str) -> Result<RollbackOutcome> {
        let guard = self.orchestrator.exclusive()?;
        self.rollback.rollback(&guard, record, reason).await
    }

    /// Resolve whatever the previous boot left behind.
    ///
    /// The switch lock is held from the first read of the slot until the
    /// outcome is persisted, so a second `resume` (or a switch request)
    /// gets `SwitchInProgress` instead of acting on a live record.
    pub async fn resume(&mut self) -> Result<StartupAction> {
        let guard = self.orchestrator.exclusive()?;

        let Some(record) = self.store.load_record()? else {
            tracing::debug!("no switch in flight");
            return Ok(StartupAction::Idle);
        };

        match (record.status, record.kind) {
            (SwitchStatus::Pending, SwitchKind::Forward) => {
                let outcome = self.controller.verify(&guard, record).await?;
                Ok(StartupAction::Verified(outcome))
            }
            (SwitchStatus::Pending, SwitchKind::Rollback) => {
                let committed = self.rollback.complete(&record)?;
                Ok(StartupAction::RollbackCompleted(committed))
            }
            (SwitchStatus::Verifying, _) => {
                tracing::warn!(record = %record.id, "found interrupted verification");
                let outcome = self.controller.resolve_interrupted(&guard, record).await?;
                Ok(StartupAction::Verified(outcome))
            }
            (status, _) => {
                // A terminal record was left in the slot; archive it.
                tracing::warn!(record = %record.id, %status, "archiving finished record");
                self.store.finish(&record)?;
                Ok(StartupAction::Idle)
            }
        }
    }
}
