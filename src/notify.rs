use crate::config::NotificationConfig;

/// Outcome of a switch, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    Committed,
    /// `abandoned` is the display name of the solution that was rejected.
    RolledBack { abandoned: String },
    Failed,
    /// The reverse switch itself failed; nothing further is attempted.
    RollbackFailed,
}

impl NotifyEvent {
    /// Notification body for `solution_name`.
    pub fn message(&self, solution_name: &str) -> String {
        match self {
            NotifyEvent::Committed => {
                format!("Congratulations, you have switched to {}.", solution_name)
            }
            NotifyEvent::RolledBack { abandoned } => format!(
                "Auto restore to {} after failed to switch to {}",
                solution_name, abandoned
            ),
            NotifyEvent::Failed => {
                format!("Sorry, switch failed. {} was not installed.", solution_name)
            }
            NotifyEvent::RollbackFailed => format!(
                "Restoring {} failed. Manual intervention is required.",
                solution_name
            ),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotifyEvent, solution_name: &str);
}

/// Desktop notifications through the first active graphical session.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    config: NotificationConfig,
}

impl DesktopNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    fn wanted(&self, event: &NotifyEvent) -> bool {
        self.config.enabled
            && match event {
                NotifyEvent::Committed => self.config.on_commit,
                NotifyEvent::RolledBack { .. } => self.config.on_rollback,
                NotifyEvent::Failed | NotifyEvent::RollbackFailed => self.config.on_failure,
            }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, event: NotifyEvent, solution_name: &str) {
        if !self.wanted(&event) {
            return;
        }
        let body = event.message(solution_name);
        if let Err(e) = send("Graphics Driver", &body) {
            tracing::warn!(error = %e, "failed to send desktop notification");
        }
    }
}

/// Find the active graphical session and run notify-send as its user with
/// their D-Bus session address. No graphical session is not an error.
fn send(title: &str, body: &str) -> std::io::Result<()> {
    let output = std::process::Command::new("loginctl")
        .args(["list-sessions", "--no-legend", "--no-pager"])
        .output()?;

    if !output.status.success() {
        return Ok(());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [session_id, uid, user, ..] = fields[..] else {
            continue;
        };

        let session_type = match std::process::Command::new("loginctl")
            .args(["show-session", session_id, "--property=Type", "--value"])
            .output()
        {
            Ok(o) => String::from_utf8_lossy(&o.stdout).trim().to_string(),
            Err(_) => continue,
        };
        if session_type != "wayland" && session_type != "x11" {
            continue;
        }

        let dbus_addr = format!("unix:path=/run/user/{}/bus", uid);
        let _ = std::process::Command::new("runuser")
            .args(["-u", user, "--", "notify-send", title, body])
            .env("DBUS_SESSION_BUS_ADDRESS", &dbus_addr)
            .status();

        return Ok(());
    }

    tracing::debug!("no graphical session to notify");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            NotifyEvent::Committed.message("NVIDIA Closed Source Driver"),
            "Congratulations, you have switched to NVIDIA Closed Source Driver."
        );
        assert_eq!(
            NotifyEvent::RolledBack {
                abandoned: "NVIDIA Closed Source Driver".to_string()
            }
            .message("NVIDIA Default Driver"),
            "Auto restore to NVIDIA Default Driver after failed to switch to NVIDIA Closed Source Driver"
        );
        assert!(
            NotifyEvent::RollbackFailed
                .message("NVIDIA Default Driver")
                .contains("Manual intervention")
        );
    }

    #[test]
    fn test_config_filters_events() {
        let notifier = DesktopNotifier::new(NotificationConfig {
            enabled: true,
            on_commit: false,
            on_rollback: true,
            on_failure: true,
        });
        assert!(!notifier.wanted(&NotifyEvent::Committed));
        assert!(notifier.wanted(&NotifyEvent::RollbackFailed));

        let disabled = DesktopNotifier::new(NotificationConfig {
            enabled: false,
            ..NotificationConfig::default()
        });
        assert!(!disabled.wanted(&NotifyEvent::Failed));
    }
}
