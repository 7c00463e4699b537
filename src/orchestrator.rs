//! Drives a switch from request to reboot.
//!
//! `request_switch` and `reverse` share one path: persist the record,
//! install, sync, reboot. The record is written before anything else
//! touches the system, so whatever happens afterwards the next boot finds
//! it. Only one switch may run at a time; a second request is refused,
//! never queued.

use crate::catalog::{self, Solution};
use crate::detect::HardwareProfile;
use crate::error::{Error, Result};
use crate::install::Installer;
use crate::lock::SwitchLock;
use crate::notify::{Notifier, NotifyEvent};
use crate::reboot::Rebooter;
use crate::record::{SwitchKind, SwitchRecord, SwitchStatus};
use crate::store::StateStore;
use crate::sync::{self, DiskSync, SyncControl};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// The external side effects a switch needs.
#[derive(Clone)]
pub struct Collaborators {
    pub installer: Arc<dyn Installer>,
    pub sync: Arc<dyn DiskSync>,
    pub rebooter: Arc<dyn Rebooter>,
    pub notifier: Arc<dyn Notifier>,
}

/// Held while one caller owns the record slot: the in-process guard plus
/// the lock file, when one is configured. Both are released on drop.
pub struct SwitchGuard<'a> {
    _busy: MutexGuard<'a, ()>,
    _lock: Option<SwitchLock>,
}

pub struct SwitchOrchestrator {
    store: StateStore,
    profile: HardwareProfile,
    collaborators: Collaborators,
    lock_dir: Option<PathBuf>,
    sync_interval: Duration,
    busy: Mutex<()>,
}

impl SwitchOrchestrator {
    pub fn new(store: StateStore, profile: HardwareProfile, collaborators: Collaborators) -> Self {
        Self {
            store,
            profile,
            collaborators,
            lock_dir: None,
            sync_interval: Duration::from_secs(1),
            busy: Mutex::new(()),
        }
    }

    /// Also hold a lock file under `dir` while switching, so two processes
    /// cannot switch at once.
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.profile
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.collaborators.notifier
    }

    /// The solution of record, or the profile's default fallback if none
    /// has ever been committed.
    pub fn active_solution(&self) -> Result<&'static Solution> {
        if let Some(current) = self.store.current_solution()? {
            match catalog::find(&current.solution_id) {
                Some(solution) => return Ok(solution),
                None => tracing::warn!(
                    solution = %current.solution_id,
                    "recorded solution is not in the catalog; assuming default"
                ),
            }
        }
        catalog::default_fallback(&self.profile)
    }

    /// Take ownership of the record slot, or fail with `SwitchInProgress`
    /// if a switch or a boot-time resolution already holds it.
    pub fn exclusive(&self) -> Result<SwitchGuard<'_>> {
        let busy = self.busy.try_lock().map_err(|_| Error::SwitchInProgress)?;
        let lock = match &self.lock_dir {
            Some(dir) => Some(SwitchLock::acquire(dir).ok_or(Error::SwitchInProgress)?),
            None => None,
        };
        Ok(SwitchGuard {
            _busy: busy,
            _lock: lock,
        })
    }

    /// Switch to `target`. On success the record is Pending, synced to
    /// disk and a reboot has been requested.
    ///
    /// Failures before the sync completes never reboot and never change
    /// the solution of record. A cancelled sync leaves the record Pending:
    /// the driver is already installed, so the next boot verifies it.
    pub async fn request_switch(
        &self,
        target: &Solution,
        control: &mut SyncControl,
    ) -> Result<SwitchRecord> {
        let _guard = self.exclusive()?;

        if let Some(existing) = self.store.load_record()? {
            if existing.status.is_in_flight() {
                tracing::info!(record = %existing.id, status = %existing.status, "switch refused");
                return Err(Error::SwitchInProgress);
            }
            // Left behind between archive and clear.
            tracing::warn!(
                record = %existing.id,
                status = %existing.status,
                "archiving finished record"
            );
            self.store.finish(&existing)?;
        }

        let target = catalog::solutions_for(&self.profile)?
            .into_iter()
            .find(|s| s.id == target.id)
            .ok_or_else(|| Error::InvalidSolution {
                id: target.id.to_string(),
            })?;

        let previous = self.active_solution()?;
        if previous.id == target.id {
            return Err(Error::AlreadyActive {
                id: target.id.to_string(),
            });
        }

        let record = SwitchRecord::new(previous.id, target.id, SwitchKind::Forward);
        self.store.save_record(&record)?;
        tracing::info!(
            record = %record.id,
            from = previous.id,
            to = target.id,
            "switch requested"
        );

        match self.drive(record, target, control).await {
            Err(e @ Error::InstallFailed { .. }) | Err(e @ Error::SyncFailed(_)) => {
                self.collaborators
                    .notifier
                    .notify(NotifyEvent::Failed, target.name);
                Err(e)
            }
            other => other,
        }
    }

    /// Switch back to `rolled_back.previous_solution_id`. The record must be
    /// the in-flight one, already marked RolledBack by the caller; it is
    /// archived and replaced by a new Pending record of kind Rollback in a
    /// single step. The previous solution is trusted as-is: it was working
    /// before the switch.
    ///
    /// Runs under the caller's `guard`, taken for the whole resolution.
    pub async fn reverse(
        &self,
        _guard: &SwitchGuard<'_>,
        rolled_back: &SwitchRecord,
    ) -> Result<SwitchRecord> {

        if rolled_back.status != SwitchStatus::RolledBack {
            return Err(Error::State(format!(
                "cannot reverse record {} in status {}",
                rolled_back.id, rolled_back.status
            )));
        }
        match self.store.load_record()? {
            Some(stored) if stored.id == rolled_back.id => {}
            _ => {
                return Err(Error::State(format!(
                    "record {} is no longer in flight",
                    rolled_back.id
                )));
            }
        }

        let target = catalog::find(&rolled_back.previous_solution_id).ok_or_else(|| {
            Error::InvalidSolution {
                id: rolled_back.previous_solution_id.clone(),
            }
        })?;

        let record = SwitchRecord::new(
            &rolled_back.target_solution_id,
            target.id,
            SwitchKind::Rollback,
        );
        self.store.replace(rolled_back, &record)?;
        tracing::warn!(
            record = %record.id,
            from = %rolled_back.target_solution_id,
            to = target.id,
            "reversing switch"
        );

        // Recovery is automatic; nobody is there to cancel it.
        self.drive(record, target, &mut SyncControl::detached())
            .await
    }

    /// install -> sync -> reboot for a record already persisted as Pending.
    async fn drive(
        &self,
        record: SwitchRecord,
        target: &'static Solution,
        control: &mut SyncControl,
    ) -> Result<SwitchRecord> {
        if let Err(e) = self.collaborators.installer.install(target).await {
            let reason = match e {
                Error::InstallFailed { reason, .. } => reason,
                other => other.to_string(),
            };
            self.fail(&record, &reason)?;
            return Err(Error::InstallFailed {
                solution: target.name.to_string(),
                reason,
            });
        }

        match sync::run(self.collaborators.sync.clone(), self.sync_interval, control).await {
            Ok(()) => {}
            Err(Error::SyncCancelled) => {
                tracing::warn!(record = %record.id, "reboot not requested; record stays pending");
                return Err(Error::SyncCancelled);
            }
            Err(e) => {
                let reason = match e {
                    Error::SyncFailed(reason) => reason,
                    other => other.to_string(),
                };
                self.fail(&record, &reason)?;
                return Err(Error::SyncFailed(reason));
            }
        }

        // Past this point the switch is committed to a reboot.
        self.collaborators.rebooter.request_reboot();
        tracing::info!(record = %record.id, "reboot requested");
        Ok(record)
    }

    fn fail(&self, record: &SwitchRecord, reason: &str) -> Result<()> {
        tracing::error!(record = %record.id, reason, "switch failed");
        let failed = record
            .clone()
            .with_status(SwitchStatus::Failed)
            .with_reason(reason);
        self.store.finish(&failed)
    }
}
