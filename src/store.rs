//! Durable state that survives the reboot between a switch and its
//! verification.
//!
//! Three files live under the state directory:
//!
//! - `switch.json`: the single in-flight `SwitchRecord` (write-ahead entry)
//! - `current.json`: the solution of record
//! - `archive.jsonl`: terminal records, one per line
//!
//! Every write goes to a temp file, is fsynced, renamed into place and the
//! directory fsynced, so a power cut leaves either the old or the new file.
//! Reading touches nothing but plain files.

use crate::error::{Error, Result};
use crate::record::SwitchRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_DIR: &str = "/var/lib/gpuswitch";

const RECORD_FILE: &str = "switch.json";
const CURRENT_FILE: &str = "current.json";
const ARCHIVE_FILE: &str = "archive.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSolution {
    pub solution_id: String,
    pub since: String,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// The in-flight record, if any.
    pub fn load_record(&self) -> Result<Option<SwitchRecord>> {
        read_json(&self.file(RECORD_FILE))
    }

    /// Durably persist `record` as the in-flight record.
    pub fn save_record(&self, record: &SwitchRecord) -> Result<()> {
        self.write_durable(RECORD_FILE, record)?;
        tracing::info!(
            record = %record.id,
            status = %record.status,
            target = %record.target_solution_id,
            "switch record persisted"
        );
        Ok(())
    }

    /// Archive a terminal record and empty the in-flight slot.
    pub fn finish(&self, record: &SwitchRecord) -> Result<()> {
        if !record.status.is_terminal() {
            return Err(Error::State(format!(
                "refusing to archive record {} in status {}",
                record.id, record.status
            )));
        }
        self.append_archive(record)?;
        self.clear_record()
    }

    /// Archive a terminal record and put `next` in the slot in its place.
    /// If interrupted between the two steps the slot still holds the old
    /// in-flight record, which startup resolves again.
    pub fn replace(&self, finished: &SwitchRecord, next: &SwitchRecord) -> Result<()> {
        if !finished.status.is_terminal() {
            return Err(Error::State(format!(
                "refusing to archive record {} in status {}",
                finished.id, finished.status
            )));
        }
        self.append_archive(finished)?;
        self.save_record(next)
    }

    fn clear_record(&self) -> Result<()> {
        let path = self.file(RECORD_FILE);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::State(format!("failed to remove {}: {}", path.display(), e)))?;
            self.sync_dir()?;
        }
        Ok(())
    }

    pub fn current_solution(&self) -> Result<Option<CurrentSolution>> {
        read_json(&self.file(CURRENT_FILE))
    }

    pub fn set_current_solution(&self, solution_id: &str) -> Result<()> {
        let current = CurrentSolution {
            solution_id: solution_id.to_string(),
            since: chrono::Utc::now().to_rfc3339(),
        };
        self.write_durable(CURRENT_FILE, &current)
    }

    /// Archived records, oldest first. Unparseable lines are skipped.
    pub fn history(&self) -> Result<Vec<SwitchRecord>> {
        let path = self.file(ARCHIVE_FILE);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::State(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(data
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping corrupt archive line");
                    None
                }
            })
            .collect())
    }

    pub fn last_archived(&self) -> Result<Option<SwitchRecord>> {
        Ok(self.history()?.pop())
    }

    fn append_archive(&self, record: &SwitchRecord) -> Result<()> {
        self.ensure_dir()?;
        let path = self.file(ARCHIVE_FILE);
        let line = serde_json::to_string(record)
            .map_err(|e| Error::State(format!("failed to serialize record: {}", e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::State(format!("failed to open {}: {}", path.display(), e)))?;
        writeln!(file, "{}", line)
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::State(format!("failed to append {}: {}", path.display(), e)))?;
        tracing::info!(record = %record.id, status = %record.status, "switch record archived");
        Ok(())
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::State(format!(
                "failed to create state dir {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    fn sync_dir(&self) -> Result<()> {
        File::open(&self.dir)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| Error::State(format!("failed to sync {}: {}", self.dir.display(), e)))
    }

    fn write_durable<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let data = serde_json::to_string_pretty(value)
            .map_err(|e| Error::State(format!("failed to serialize {}: {}", name, e)))?;

        let target = self.file(name);
        let tmp = self.file(&format!("{}.tmp", name));
        let mut file = File::create(&tmp)
            .map_err(|e| Error::State(format!("failed to create {}: {}", tmp.display(), e)))?;
        file.write_all(data.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::State(format!("failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &target)
            .map_err(|e| Error::State(format!("failed to replace {}: {}", target.display(), e)))?;
        self.sync_dir()
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .map_err(|e| Error::State(format!("failed to read {}: {}", path.display(), e)))?;
    let value = serde_json::from_str(&data)
        .map_err(|e| Error::State(format!("failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(value))
}
