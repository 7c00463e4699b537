use super::VerificationHandle;
use crate::catalog::Solution;
use async_trait::async_trait;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};
use std::io::BufRead;
use std::time::Duration;
use tokio::time::Instant;

/// Shows the new driver to the user and reports their answer through the
/// handle. The controller aborts the presenter once the session is decided,
/// so implementations may run until `deadline` or beyond.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn present(
        &self,
        solution: &'static Solution,
        deadline: Instant,
        handle: VerificationHandle,
    );
}

/// Runs an external rendering test (by default `gltest`). Exit status 0 is
/// Apply, anything else is Cancel. A test that cannot be started gives no
/// answer at all.
#[derive(Debug, Clone)]
pub struct CommandPresenter {
    command: Vec<String>,
}

impl CommandPresenter {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Presenter for CommandPresenter {
    async fn present(
        &self,
        solution: &'static Solution,
        _deadline: Instant,
        handle: VerificationHandle,
    ) {
        let Some((program, args)) = self.command.split_first() else {
            tracing::warn!("no presenter command configured");
            return;
        };

        let status = tokio::process::Command::new(program)
            .args(args)
            .env("GPUSWITCH_SOLUTION", solution.id)
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => handle.apply(),
            Ok(status) => {
                tracing::info!(%status, "rendering test rejected the driver");
                handle.cancel();
            }
            Err(e) => {
                tracing::warn!(command = %program, error = %e, "could not start rendering test")
            }
        }
    }
}

/// Asks on the controlling terminal, with a countdown to the deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPresenter;

#[async_trait]
impl Presenter for TerminalPresenter {
    async fn present(
        &self,
        solution: &'static Solution,
        deadline: Instant,
        handle: VerificationHandle,
    ) {
        println!();
        println!("  {} {}", "Switched to".bold(), solution.name.cyan());
        println!(
            "  If the display looks right, type {} and press Enter. Type {} or wait to restore the previous driver.",
            "apply".green(),
            "cancel".yellow()
        );

        // stdin cannot be cancelled; a detached thread dies with the process.
        std::thread::spawn(move || {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => {}
                Ok(_) => match line.trim().to_ascii_lowercase().as_str() {
                    "apply" | "a" | "y" | "yes" => handle.apply(),
                    _ => handle.cancel(),
                },
            }
        });

        countdown(deadline).await;
    }
}

async fn countdown(deadline: Instant) {
    let total = deadline.saturating_duration_since(Instant::now());
    let style = ProgressStyle::with_template("  {bar:30.cyan/blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    let bar = ProgressBar::new(total.as_secs())
        .with_style(style)
        .with_finish(ProgressFinish::AndClear);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let left = deadline.saturating_duration_since(Instant::now());
        bar.set_position(total.saturating_sub(left).as_secs());
        bar.set_message(format!("restoring in {}s", left.as_secs()));
        if left.is_zero() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::verify::{UserResponse, VerificationSession};
    use uuid::Uuid;

    async fn run_command(command: &[&str]) -> Option<UserResponse> {
        let (mut session, handle) =
            VerificationSession::start(Uuid::new_v4(), Duration::from_secs(5));
        let presenter = CommandPresenter::new(command.iter().map(|s| s.to_string()).collect());
        let solution = catalog::find("nvidia-closed").unwrap();
        let deadline = session.deadline();
        tokio::spawn(async move { presenter.present(solution, deadline, handle).await });
        session.wait().await
    }

    #[tokio::test]
    async fn test_command_success_is_apply() {
        assert_eq!(run_command(&["true"]).await, Some(UserResponse::Confirmed));
    }

    #[tokio::test]
    async fn test_command_failure_is_cancel() {
        assert_eq!(run_command(&["false"]).await, Some(UserResponse::Rejected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_command_leaves_it_to_the_deadline() {
        assert_eq!(run_command(&["/nonexistent/gpuswitch-gltest"]).await, None);
    }
}
