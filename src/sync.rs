//! Flushing the switch to durable storage before the reboot.
//!
//! `sync(2)` can block for minutes on a machine with a lot of dirty pages,
//! so it runs on the blocking pool while this side publishes elapsed time
//! and listens for cancellation. Cancelling only stops us from rebooting:
//! once the flush has completed the caller reboots unconditionally.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Flushes filesystem buffers. Blocking.
pub trait DiskSync: Send + Sync {
    fn sync(&self) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSync;

impl DiskSync for SystemSync {
    fn sync(&self) -> Result<()> {
        nix::unistd::sync();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProgress {
    Idle,
    Running { elapsed: Duration },
    Finished { elapsed: Duration },
}

/// Engine side of a sync: publishes progress, observes cancellation.
#[derive(Debug)]
pub struct SyncControl {
    progress: watch::Sender<SyncProgress>,
    cancel: watch::Receiver<bool>,
}

/// Caller side of a sync: watches progress, may cancel.
#[derive(Debug, Clone)]
pub struct SyncMonitor {
    progress: watch::Receiver<SyncProgress>,
    cancel: Arc<watch::Sender<bool>>,
}

pub fn channel() -> (SyncControl, SyncMonitor) {
    let (progress_tx, progress_rx) = watch::channel(SyncProgress::Idle);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    (
        SyncControl {
            progress: progress_tx,
            cancel: cancel_rx,
        },
        SyncMonitor {
            progress: progress_rx,
            cancel: Arc::new(cancel_tx),
        },
    )
}

impl SyncControl {
    /// A control nobody watches or cancels.
    pub fn detached() -> Self {
        channel().0
    }
}

impl SyncMonitor {
    pub fn progress(&self) -> SyncProgress {
        *self.progress.borrow()
    }

    /// Wait for the next progress update. Returns None once the sync side is gone.
    pub async fn changed(&mut self) -> Option<SyncProgress> {
        self.progress.changed().await.ok()?;
        Some(*self.progress.borrow_and_update())
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

/// Run `sync` to completion, publishing elapsed time every `interval`.
/// Returns `SyncCancelled` if cancelled before the flush completed.
pub async fn run(
    sync: Arc<dyn DiskSync>,
    interval: Duration,
    control: &mut SyncControl,
) -> Result<()> {
    if *control.cancel.borrow() {
        return Err(Error::SyncCancelled);
    }

    let started = Instant::now();
    let mut task = tokio::task::spawn_blocking(move || sync.sync());
    let mut ticker = tokio::time::interval(interval);
    let mut cancel_open = true;

    tracing::info!("syncing filesystems before reboot");
    loop {
        tokio::select! {
            biased;

            joined = &mut task => {
                joined.map_err(|e| Error::SyncFailed(e.to_string()))??;
                let elapsed = started.elapsed();
                control.progress.send_replace(SyncProgress::Finished { elapsed });
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "sync finished");
                return Ok(());
            }
            changed = control.cancel.changed(), if cancel_open => {
                match changed {
                    Ok(()) if *control.cancel.borrow() => {
                        tracing::warn!("sync cancelled before reboot");
                        return Err(Error::SyncCancelled);
                    }
                    Ok(()) => {}
                    Err(_) => cancel_open = false,
                }
            }
            _ = ticker.tick() => {
                control.progress.send_replace(SyncProgress::Running {
                    elapsed: started.elapsed(),
                });
            }
        }
    }
}
