use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level gpuswitch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the switch record, current solution and archive live.
    pub state_dir: PathBuf,
    /// Where the cross-process switch lock lives (tmpfs).
    pub lock_dir: PathBuf,
    pub verify: VerifyConfig,
    pub install: InstallConfig,
    pub sync: SyncConfig,
    pub reboot: RebootConfig,
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(crate::store::DEFAULT_STATE_DIR),
            lock_dir: PathBuf::from(crate::lock::DEFAULT_LOCK_DIR),
            verify: VerifyConfig::default(),
            install: InstallConfig::default(),
            sync: SyncConfig::default(),
            reboot: RebootConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Seconds the user has to confirm the new driver before rollback.
    pub timeout_secs: u64,
    pub presenter: PresenterKind,
    /// Rendering test program; exit status 0 means Apply.
    pub presenter_command: Vec<String>,
}

impl VerifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            presenter: PresenterKind::Command,
            presenter_command: vec!["/usr/lib/gpuswitch/gltest".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenterKind {
    /// Prompt on the controlling terminal.
    Terminal,
    /// Run `presenter_command` and map its exit status.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Package installation hook; the solution id is appended as last argument.
    pub hook: Vec<String>,
    pub modprobe_file: PathBuf,
    pub boot_entries_dir: PathBuf,
    /// Edit systemd-boot entries for solutions that need kernel parameters.
    pub manage_kernel_params: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            hook: vec!["/usr/lib/gpuswitch/install-solution".to_string()],
            modprobe_file: PathBuf::from("/etc/modprobe.d/gpuswitch.conf"),
            boot_entries_dir: PathBuf::from("/boot/loader/entries"),
            manage_kernel_params: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How often elapsed-time progress is published while syncing.
    pub progress_interval_ms: u64,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebootConfig {
    pub command: Vec<String>,
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            command: vec!["systemctl".to_string(), "reboot".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub on_commit: bool,
    pub on_rollback: bool,
    pub on_failure: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_commit: true,
            on_rollback: true,
            on_failure: true,
        }
    }
}

const SYSTEM_CONFIG: &str = "/etc/gpuswitch/config.toml";

fn load_system() -> Option<toml::Value> {
    let content = std::fs::read_to_string(SYSTEM_CONFIG).ok()?;
    toml::from_str(&content).ok()
}

/// Load the user config file (~/.config/gpuswitch/config.toml) if it exists.
fn load_user() -> Option<toml::Value> {
    let path = dirs::config_dir()?.join("gpuswitch").join("config.toml");
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Recursively merge two TOML values. Tables merge key by key;
/// anything else in `overlay` replaces `base`.
fn merge_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_values(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

fn load_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config");
            Config::default()
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config");
            Config::default()
        }
    }
}

/// Load the merged config: system file, then user overrides.
/// An explicit `override_path` replaces both.
pub fn load(override_path: Option<&PathBuf>) -> Config {
    if let Some(path) = override_path {
        return load_from_path(path);
    }

    let merged = match (load_system(), load_user()) {
        (Some(s), Some(u)) => Some(merge_values(s, u)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    };

    match merged {
        Some(value) => value.try_into().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to deserialize config");
            Config::default()
        }),
        None => Config::default(),
    }
}
