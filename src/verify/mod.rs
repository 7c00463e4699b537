//! Post-reboot confirmation of a fresh switch.
//!
//! The user gets a fixed window to look at the new driver and say Apply.
//! Anything else (Cancel, silence, a presenter that never starts, a crash
//! halfway through) ends in rollback. The deadline runs on tokio's
//! monotonic clock, so wall-clock jumps at boot cannot shorten or stretch it.

pub mod presenter;

pub use presenter::{CommandPresenter, Presenter, TerminalPresenter};

use crate::catalog::{self, Solution};
use crate::error::{Error, Result};
use crate::notify::{Notifier, NotifyEvent};
use crate::orchestrator::SwitchGuard;
use crate::record::{SwitchKind, SwitchRecord, SwitchStatus};
use crate::rollback::{RollbackManager, RollbackOutcome};
use crate::store::StateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserResponse {
    /// Apply: the new driver works.
    Confirmed,
    /// Cancel: go back.
    Rejected,
}

/// Given to the presenter so it can answer. Dropping every handle without
/// answering leaves the decision to the deadline.
#[derive(Debug, Clone)]
pub struct VerificationHandle {
    tx: mpsc::Sender<UserResponse>,
}

impl VerificationHandle {
    pub fn apply(&self) {
        let _ = self.tx.try_send(UserResponse::Confirmed);
    }

    pub fn cancel(&self) {
        let _ = self.tx.try_send(UserResponse::Rejected);
    }
}

/// One confirmation window. Only exists while the record is Verifying.
#[derive(Debug)]
pub struct VerificationSession {
    record_id: Uuid,
    deadline: Instant,
    response: Option<UserResponse>,
    rx: mpsc::Receiver<UserResponse>,
}

impl VerificationSession {
    pub fn start(record_id: Uuid, timeout: Duration) -> (Self, VerificationHandle) {
        let (tx, rx) = mpsc::channel(4);
        let session = Self {
            record_id,
            deadline: Instant::now() + timeout,
            response: None,
            rx,
        };
        (session, VerificationHandle { tx })
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// None while unset.
    pub fn response(&self) -> Option<UserResponse> {
        self.response
    }

    /// Wait for the first explicit answer or the deadline, whichever comes
    /// first. Returns None on timeout. An answer already queued when the
    /// deadline fires still counts.
    pub async fn wait(&mut self) -> Option<UserResponse> {
        let deadline = tokio::time::sleep_until(self.deadline);
        tokio::pin!(deadline);
        let mut open = true;

        loop {
            tokio::select! {
                biased;

                received = self.rx.recv(), if open => match received {
                    Some(response) => {
                        self.response = Some(response);
                        return Some(response);
                    }
                    // Presenter went away without answering.
                    None => open = false,
                },
                _ = &mut deadline => return None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Verifying,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackCause {
    Rejected,
    Timeout,
    /// A previous boot was verifying and never concluded.
    Interrupted,
}

impl RollbackCause {
    fn reason(self) -> &'static str {
        match self {
            RollbackCause::Rejected => "rejected by user",
            RollbackCause::Timeout => "verification timed out",
            RollbackCause::Interrupted => "verification interrupted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Committed(SwitchRecord),
    RolledBack {
        cause: RollbackCause,
        rollback: RollbackOutcome,
    },
}

pub struct VerificationController {
    store: StateStore,
    presenter: Arc<dyn Presenter>,
    rollback: RollbackManager,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    state: ControllerState,
}

impl VerificationController {
    pub fn new(
        store: StateStore,
        presenter: Arc<dyn Presenter>,
        rollback: RollbackManager,
        notifier: Arc<dyn Notifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            presenter,
            rollback,
            notifier,
            timeout,
            state: ControllerState::Idle,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Verify a forward switch found Pending after the reboot. `guard` is
    /// held until the outcome is on disk.
    pub async fn verify(
        &mut self,
        guard: &SwitchGuard<'_>,
        record: SwitchRecord,
    ) -> Result<VerificationOutcome> {
        if record.status != SwitchStatus::Pending || record.kind != SwitchKind::Forward {
            return Err(Error::State(format!(
                "record {} ({}, {:?}) cannot be verified",
                record.id, record.status, record.kind
            )));
        }

        let verifying = record.with_status(SwitchStatus::Verifying);
        self.store.save_record(&verifying)?;
        self.state = ControllerState::Verifying;
        tracing::info!(
            record = %verifying.id,
            solution = %verifying.target_solution_id,
            "verifying switch"
        );

        let Some(target) = catalog::find(&verifying.target_solution_id) else {
            tracing::error!(solution = %verifying.target_solution_id, "unknown target solution");
            return self
                .roll_back(guard, &verifying, RollbackCause::Interrupted)
                .await;
        };

        let (mut session, handle) = VerificationSession::start(verifying.id, self.timeout);
        let presenter = self.presenter.clone();
        let deadline = session.deadline();
        let presenting =
            tokio::spawn(async move { presenter.present(target, deadline, handle).await });

        let response = session.wait().await;
        presenting.abort();

        match response {
            Some(UserResponse::Confirmed) => self
                .commit(verifying, target)
                .map(VerificationOutcome::Committed),
            Some(UserResponse::Rejected) => {
                self.roll_back(guard, &verifying, RollbackCause::Rejected)
                    .await
            }
            None => {
                tracing::warn!(record = %verifying.id, "no confirmation before deadline");
                self.roll_back(guard, &verifying, RollbackCause::Timeout)
                    .await
            }
        }
    }

    /// Roll back a record a previous boot left in Verifying.
    pub async fn resolve_interrupted(
        &mut self,
        guard: &SwitchGuard<'_>,
        record: SwitchRecord,
    ) -> Result<VerificationOutcome> {
        if record.status != SwitchStatus::Verifying {
            return Err(Error::State(format!(
                "record {} is {}, not verifying",
                record.id, record.status
            )));
        }
        self.state = ControllerState::Verifying;
        self.roll_back(guard, &record, RollbackCause::Interrupted)
            .await
    }

    fn commit(&mut self, verifying: SwitchRecord, target: &Solution) -> Result<SwitchRecord> {
        match self.store.load_record()? {
            Some(stored)
                if stored.id == verifying.id && stored.status == SwitchStatus::Verifying => {}
            _ => {
                return Err(Error::State(format!(
                    "record {} is no longer verifying; not committing",
                    verifying.id
                )));
            }
        }

        let committed = verifying.with_status(SwitchStatus::Committed);
        // Current first: a crash before the archive leaves Verifying behind,
        // which the next boot rolls back and rewrites current anyway.
        self.store.set_current_solution(target.id)?;
        self.store.finish(&committed)?;
        self.state = ControllerState::Committed;

        tracing::info!(record = %committed.id, solution = target.id, "switch committed");
        self.notifier.notify(NotifyEvent::Committed, target.name);
        Ok(committed)
    }

    async fn roll_back(
        &mut self,
        guard: &SwitchGuard<'_>,
        verifying: &SwitchRecord,
        cause: RollbackCause,
    ) -> Result<VerificationOutcome> {
        self.state = ControllerState::RolledBack;
        let rollback = self
            .rollback
            .rollback(guard, verifying, cause.reason())
            .await?;
        Ok(VerificationOutcome::RolledBack { cause, rollback })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_without_answer_is_timeout() {
        let (mut session, _handle) =
            VerificationSession::start(Uuid::new_v4(), Duration::from_secs(60));
        let started = Instant::now();

        assert_eq!(session.wait().await, None);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(session.response(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_before_deadline() {
        let (mut session, handle) =
            VerificationSession::start(Uuid::new_v4(), Duration::from_secs(60));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            handle.apply();
        });

        assert_eq!(session.wait().await, Some(UserResponse::Confirmed));
        assert_eq!(session.response(), Some(UserResponse::Confirmed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_deadline() {
        let (mut session, handle) =
            VerificationSession::start(Uuid::new_v4(), Duration::from_secs(60));
        handle.cancel();
        assert_eq!(session.wait().await, Some(UserResponse::Rejected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_still_waits_for_deadline() {
        let (mut session, handle) =
            VerificationSession::start(Uuid::new_v4(), Duration::from_secs(30));
        drop(handle);
        let started = Instant::now();

        assert_eq!(session.wait().await, None);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_answer_wins() {
        let (mut session, handle) =
            VerificationSession::start(Uuid::new_v4(), Duration::from_secs(60));
        handle.cancel();
        handle.apply();
        assert_eq!(session.wait().await, Some(UserResponse::Rejected));
    }
}
