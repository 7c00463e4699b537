/// Asks the OS to reboot. Fire-and-forget: the engine never waits on it.
pub trait Rebooter: Send + Sync {
    fn request_reboot(&self);
}

/// Runs the configured reboot command (default `systemctl reboot`).
#[derive(Debug, Clone)]
pub struct SystemRebooter {
    command: Vec<String>,
}

impl SystemRebooter {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Rebooter for SystemRebooter {
    fn request_reboot(&self) {
        let Some((program, args)) = self.command.split_first() else {
            tracing::error!("no reboot command configured");
            return;
        };
        tracing::info!(command = %program, "requesting reboot");
        match std::process::Command::new(program).args(args).spawn() {
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "failed to request reboot"),
        }
    }
}
