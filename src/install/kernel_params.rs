use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A systemd-boot entry as it was before it was edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KernelParamBackup {
    pub path: String,
    pub original_content: String,
}

/// Rewrite the `options` line of every `*.conf` entry in `entries_dir`:
/// parameters named in `remove` are dropped, then `add` is applied
/// (replacing an existing value of the same name in place).
///
/// Returns a backup of every entry that changed. If any write fails the
/// entries already written are restored before the error is returned.
pub fn update_kernel_params(
    entries_dir: &Path,
    add: &[&str],
    remove: &[&str],
) -> Result<Vec<KernelParamBackup>> {
    if !entries_dir.exists() {
        if add.is_empty() {
            return Ok(Vec::new());
        }
        return Err(Error::Bootloader(format!(
            "systemd-boot entries directory not found at {}",
            entries_dir.display()
        )));
    }

    let entries = list_entry_files(entries_dir)?;
    if entries.is_empty() && !add.is_empty() {
        return Err(Error::Bootloader(format!(
            "no .conf files found in {}",
            entries_dir.display()
        )));
    }

    let remove_names: Vec<&str> = remove
        .iter()
        .map(|p| param_name(p))
        .filter(|name| !add.iter().any(|a| param_name(a) == *name))
        .collect();

    let mut backups = Vec::new();
    for path in &entries {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Bootloader(format!("failed to read {}: {}", path.display(), e)))?;

        let new_content = rewrite_entry(&content, path, add, &remove_names)?;
        if new_content == content {
            continue;
        }

        backups.push(KernelParamBackup {
            path: path.display().to_string(),
            original_content: content,
        });
        if let Err(e) = std::fs::write(path, new_content) {
            let _ = restore_kernel_param_backups(&backups);
            return Err(Error::Bootloader(format!(
                "failed to write {}: {}",
                path.display(),
                e
            )));
        }
        tracing::debug!(entry = %path.display(), "updated boot entry options");
    }

    Ok(backups)
}

/// Put edited entries back exactly as captured. Every backup is attempted
/// even if some fail; all failures are reported together.
pub fn restore_kernel_param_backups(backups: &[KernelParamBackup]) -> Result<()> {
    let errors: Vec<String> = backups
        .iter()
        .filter_map(|backup| {
            std::fs::write(&backup.path, &backup.original_content)
                .err()
                .map(|e| format!("{}: {}", backup.path, e))
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Bootloader(format!(
            "failed to restore {} of {} entries: {}",
            errors.len(),
            backups.len(),
            errors.join("; ")
        )))
    }
}

fn list_entry_files(entries_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(entries_dir)
        .map_err(|e| Error::Bootloader(format!("failed to read entries dir: {}", e)))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "conf"))
        .collect();
    entries.sort();
    Ok(entries)
}

fn param_name(param: &str) -> &str {
    param.split('=').next().unwrap_or(param)
}

fn rewrite_entry(content: &str, path: &Path, add: &[&str], remove: &[&str]) -> Result<String> {
    let mut options_found = false;
    let lines: Vec<String> = content
        .lines()
        .map(|line| {
            if line.starts_with("options") {
                options_found = true;
                let stripped = remove_params(line, remove);
                add_params(&stripped, add)
            } else {
                line.to_string()
            }
        })
        .collect();

    if !options_found && !add.is_empty() {
        return Err(Error::Bootloader(format!(
            "no 'options' line found in {}",
            path.display()
        )));
    }

    let joined = lines.join("\n");
    if content.ends_with('\n') {
        Ok(format!("{}\n", joined))
    } else {
        Ok(joined)
    }
}

fn add_params(line: &str, params: &[&str]) -> String {
    let mut words: Vec<String> = line.split_whitespace().map(String::from).collect();

    for param in params {
        if words.iter().any(|w| w == param) {
            continue;
        }
        let name = param_name(param);
        match words.iter().skip(1).position(|w| param_name(w) == name) {
            Some(i) => words[i + 1] = param.to_string(),
            None => words.push(param.to_string()),
        }
    }

    words.join(" ")
}

fn remove_params(line: &str, names: &[&str]) -> String {
    line.split_whitespace()
        .enumerate()
        .filter(|(i, word)| *i == 0 || !names.contains(&param_name(word)))
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}
