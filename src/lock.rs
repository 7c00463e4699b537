use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOCK_DIR: &str = "/run/gpuswitch";
const LOCK_FILE: &str = "switch.lock";

/// Cross-process switch lock; the lock file is removed on drop.
#[derive(Debug)]
pub struct SwitchLock {
    path: PathBuf,
}

impl Drop for SwitchLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl SwitchLock {
    /// Try to take the lock. Returns None if another live process holds it.
    /// A lock left behind by a dead process is reclaimed.
    pub fn acquire(lock_dir: &Path) -> Option<Self> {
        if !lock_dir.exists() && fs::create_dir_all(lock_dir).is_err() {
            return None;
        }
        let path = lock_dir.join(LOCK_FILE);

        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Some(Self { path });
                }
                Err(_) => {
                    if !holder_is_dead(&path) {
                        return None;
                    }
                    tracing::warn!(path = %path.display(), "removing stale switch lock");
                    let _ = fs::remove_file(&path);
                }
            }
        }
        None
    }
}

fn holder_is_dead(path: &Path) -> bool {
    let Ok(contents) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(pid) = contents.trim().parse::<u32>() else {
        return false;
    };
    !Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let tmp = TempDir::new().unwrap();
        let first = SwitchLock::acquire(tmp.path());
        assert!(first.is_some());
        assert!(SwitchLock::acquire(tmp.path()).is_none());

        drop(first);
        assert!(SwitchLock::acquire(tmp.path()).is_some());
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        // PIDs are capped well below u32::MAX, so this one cannot be alive.
        fs::write(tmp.path().join(LOCK_FILE), "4294967295").unwrap();

        assert!(SwitchLock::acquire(tmp.path()).is_some());
    }
}
