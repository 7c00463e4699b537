pub mod kernel_params;
pub mod modprobe;

use crate::catalog::{self, Solution};
use crate::config::InstallConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Makes a solution the one the next boot will use. Opaque to the engine:
/// may download packages, may take minutes, succeeds or fails.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, solution: &'static Solution) -> Result<()>;
}

/// Installs a solution on the live system: runs the package hook, writes
/// the module blacklist and updates the boot entries' kernel parameters.
#[derive(Debug, Clone)]
pub struct SystemInstaller {
    hook: Vec<String>,
    modprobe_file: PathBuf,
    boot_entries_dir: Option<PathBuf>,
}

impl SystemInstaller {
    pub fn from_config(config: &InstallConfig) -> Self {
        Self {
            hook: config.hook.clone(),
            modprobe_file: config.modprobe_file.clone(),
            boot_entries_dir: config
                .manage_kernel_params
                .then(|| config.boot_entries_dir.clone()),
        }
    }

    async fn run_hook(&self, solution: &Solution) -> Result<()> {
        let Some((program, args)) = self.hook.split_first() else {
            return Ok(());
        };

        tracing::info!(hook = %program, solution = solution.id, "running install hook");
        let output = tokio::process::Command::new(program)
            .args(args)
            .arg(solution.id)
            .output()
            .await
            .map_err(|e| failed(solution, format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(failed(
                solution,
                format!("{} exited with {}: {}", program, output.status, last_line),
            ));
        }
        Ok(())
    }
}

fn failed(solution: &Solution, reason: impl Into<String>) -> Error {
    Error::InstallFailed {
        solution: solution.name.to_string(),
        reason: reason.into(),
    }
}

/// Kernel parameters some other solution owns and `target` does not want.
fn foreign_params(target: &Solution) -> Vec<&'static str> {
    let mut params: Vec<&'static str> = catalog::all()
        .iter()
        .filter(|s| s.id != target.id)
        .flat_map(|s| s.kernel_params.iter().copied())
        .filter(|p| !target.kernel_params.contains(p))
        .collect();
    params.sort_unstable();
    params.dedup();
    params
}

#[async_trait]
impl Installer for SystemInstaller {
    async fn install(&self, solution: &'static Solution) -> Result<()> {
        self.run_hook(solution).await?;

        let previous_blacklist = modprobe::write_blacklist(&self.modprobe_file, solution)
            .map_err(|e| failed(solution, e.to_string()))?;

        if let Some(entries_dir) = &self.boot_entries_dir {
            let remove = foreign_params(solution);
            if let Err(e) =
                kernel_params::update_kernel_params(entries_dir, solution.kernel_params, &remove)
            {
                if let Err(restore_err) =
                    modprobe::restore(&self.modprobe_file, previous_blacklist.as_deref())
                {
                    tracing::error!(error = %restore_err, "failed to restore module blacklist");
                }
                return Err(failed(solution, e.to_string()));
            }
        }

        tracing::info!(solution = solution.id, "driver configuration written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn installer(tmp: &TempDir, hook: Vec<String>) -> SystemInstaller {
        SystemInstaller {
            hook,
            modprobe_file: tmp.path().join("modprobe.d/gpuswitch.conf"),
            boot_entries_dir: Some(tmp.path().join("entries")),
        }
    }

    fn write_entry(tmp: &TempDir, content: &str) -> PathBuf {
        let entries = tmp.path().join("entries");
        fs::create_dir_all(&entries).unwrap();
        let entry = entries.join("linux.conf");
        fs::write(&entry, content).unwrap();
        entry
    }

    #[test]
    fn test_foreign_params_excludes_own() {
        let closed = catalog::find("nvidia-closed").unwrap();
        assert!(foreign_params(closed).is_empty());

        let open = catalog::find("nvidia-open").unwrap();
        assert_eq!(foreign_params(open), vec!["nvidia-drm.modeset=1"]);
    }

    #[tokio::test]
    async fn test_install_closed_driver_writes_config() {
        let tmp = TempDir::new().unwrap();
        let entry = write_entry(&tmp, "options root=UUID=abc quiet\n");
        let installer = installer(&tmp, vec!["true".to_string()]);

        installer
            .install(catalog::find("nvidia-closed").unwrap())
            .await
            .unwrap();

        assert!(
            fs::read_to_string(&entry)
                .unwrap()
                .contains("nvidia-drm.modeset=1")
        );
        assert!(
            fs::read_to_string(tmp.path().join("modprobe.d/gpuswitch.conf"))
                .unwrap()
                .contains("blacklist nouveau")
        );
    }

    #[tokio::test]
    async fn test_switching_back_removes_closed_driver_params() {
        let tmp = TempDir::new().unwrap();
        let entry = write_entry(&tmp, "options root=UUID=abc nvidia-drm.modeset=1 quiet\n");
        let installer = installer(&tmp, Vec::new());

        installer
            .install(catalog::find("nvidia-default").unwrap())
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(&entry).unwrap(),
            "options root=UUID=abc quiet\n"
        );
    }

    #[tokio::test]
    async fn test_failing_hook_is_install_failed_and_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let content = "options root=UUID=abc quiet\n";
        let entry = write_entry(&tmp, content);
        let installer = installer(&tmp, vec!["false".to_string()]);

        let err = installer
            .install(catalog::find("nvidia-closed").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InstallFailed { .. }));
        assert_eq!(fs::read_to_string(&entry).unwrap(), content);
        assert!(!tmp.path().join("modprobe.d/gpuswitch.conf").exists());
    }

    #[tokio::test]
    async fn test_boot_entry_failure_restores_blacklist() {
        let tmp = TempDir::new().unwrap();
        // entries dir exists but has no options line, so adding params fails
        write_entry(&tmp, "title Linux\n");
        let modprobe = tmp.path().join("modprobe.d/gpuswitch.conf");
        fs::create_dir_all(modprobe.parent().unwrap()).unwrap();
        fs::write(&modprobe, "blacklist nvidia\n").unwrap();
        let installer = installer(&tmp, Vec::new());

        let err = installer
            .install(catalog::find("prime").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InstallFailed { .. }));
        assert_eq!(fs::read_to_string(&modprobe).unwrap(), "blacklist nvidia\n");
    }
}
