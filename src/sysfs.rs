use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Root of the sysfs/procfs tree that hardware detection reads.
/// `/` on a live system, a temp directory in tests.
#[derive(Debug, Clone)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl SysfsRoot {
    pub fn system() -> Self {
        Self::default()
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a path relative to this root,
    /// e.g. `path("sys/bus/pci/devices")`.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Read a file, trimming surrounding whitespace.
    pub fn read(&self, relative: impl AsRef<Path>) -> Result<String> {
        let path = self.path(relative);
        std::fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|source| Error::SysfsRead { path, source })
    }

    /// Read a file, returning None if it is missing or unreadable.
    pub fn read_optional(&self, relative: impl AsRef<Path>) -> Result<Option<String>> {
        let path = self.path(relative);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Ok(None),
            Err(source) => Err(Error::SysfsRead { path, source }),
        }
    }

    /// Parse a hex attribute such as a PCI `vendor` or `class` (`0x10de`).
    pub fn read_hex(&self, relative: impl AsRef<Path>) -> Result<u32> {
        let relative = relative.as_ref();
        let value = self.read(relative)?;
        let digits = value.trim_start_matches("0x").trim_start_matches("0X");
        u32::from_str_radix(digits, 16).map_err(|e| Error::Parse {
            path: self.path(relative),
            detail: format!("failed to parse '{}' as hex: {}", value, e),
        })
    }

    /// File name of a symlink target, e.g. the bound driver of a device
    /// (`.../driver -> ../../bus/pci/drivers/nvidia` yields `nvidia`).
    pub fn link_name(&self, relative: impl AsRef<Path>) -> Option<String> {
        std::fs::read_link(self.path(relative))
            .ok()
            .and_then(|target| target.file_name().map(|n| n.to_string_lossy().into_owned()))
    }

    /// List entries in a directory, sorted by name.
    pub fn list_dir(&self, relative: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = self.path(relative);
        let entries = std::fs::read_dir(&path).map_err(|source| Error::SysfsRead {
            path: path.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::SysfsRead {
                path: path.clone(),
                source,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.path(relative).exists()
    }
}
