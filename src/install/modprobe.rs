use crate::catalog::Solution;
use crate::error::{Error, Result};
use std::path::Path;

fn render(solution: &Solution) -> String {
    let mut content = format!("# Managed by gpuswitch ({}), do not edit\n", solution.id);
    for module in solution.blacklist_modules {
        content.push_str(&format!("blacklist {}\n", module));
    }
    content
}

/// Write the solution's module blacklist. Returns the previous file content
/// (None if the file did not exist) so a later failure can put it back.
pub fn write_blacklist(path: &Path, solution: &Solution) -> Result<Option<String>> {
    let previous = std::fs::read_to_string(path).ok();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Other(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, render(solution))
        .map_err(|e| Error::Other(format!("failed to write {}: {}", path.display(), e)))?;
    Ok(previous)
}

pub fn restore(path: &Path, previous: Option<&str>) -> Result<()> {
    let result = match previous {
        Some(content) => std::fs::write(path, content),
        None if path.exists() => std::fs::remove_file(path),
        None => Ok(()),
    };
    result.map_err(|e| Error::Other(format!("failed to restore {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use tempfile::TempDir;

    #[test]
    fn test_closed_driver_blacklists_nouveau() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("modprobe.d/gpuswitch.conf");
        let closed = catalog::find("nvidia-closed").unwrap();

        let previous = write_blacklist(&path, closed).unwrap();
        assert_eq!(previous, None);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("blacklist nouveau\n"));
        assert!(!content.contains("blacklist nvidia"));
    }

    #[test]
    fn test_restore_previous_content_or_remove() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gpuswitch.conf");
        std::fs::write(&path, "blacklist nouveau\n").unwrap();

        let previous = write_blacklist(&path, catalog::find("nvidia-open").unwrap()).unwrap();
        restore(&path, previous.as_deref()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "blacklist nouveau\n");

        restore(&path, None).unwrap();
        assert!(!path.exists());
    }
}
