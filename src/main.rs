use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use gpuswitch::cli::{Cli, Command};
use gpuswitch::config::{Config, PresenterKind};
use gpuswitch::detect::{HardwareInfo, HardwareProfile};
use gpuswitch::engine::{Engine, StartupAction};
use gpuswitch::error::Error;
use gpuswitch::install::SystemInstaller;
use gpuswitch::notify::DesktopNotifier;
use gpuswitch::orchestrator::{Collaborators, SwitchOrchestrator};
use gpuswitch::reboot::SystemRebooter;
use gpuswitch::rollback::RollbackOutcome;
use gpuswitch::store::StateStore;
use gpuswitch::sync::{self, SyncMonitor, SyncProgress, SystemSync};
use gpuswitch::sysfs::SysfsRoot;
use gpuswitch::verify::{
    CommandPresenter, Presenter, RollbackCause, TerminalPresenter, VerificationOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

const UNSUPPORTED: &str =
    "Your hardware is not supported currently, please wait for future version.";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on engine diagnostics without knowing target names.
    if cli.verbose > 0
        && let Ok(parsed) = "gpuswitch=debug".parse()
    {
        env_filter = env_filter.add_directive(parsed);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = gpuswitch::config::load(cli.config.as_ref());

    match cli.command {
        Command::Detect => cmd_detect(cli.json),
        Command::List => cmd_list(&config, cli.json),
        Command::Switch { solution, yes } => cmd_switch(&config, &solution, yes).await,
        Command::Resume => cmd_resume(&config, cli.json).await,
        Command::Status => cmd_status(&config, cli.json),
        Command::Completions { shell } => {
            gpuswitch::cli::print_completions(shell);
            Ok(())
        }
    }
}

fn detect_profile() -> HardwareProfile {
    HardwareInfo::detect(&SysfsRoot::system()).profile()
}

fn build_engine(config: &Config, profile: HardwareProfile) -> Engine {
    let store = StateStore::new(&config.state_dir);
    let collaborators = Collaborators {
        installer: Arc::new(SystemInstaller::from_config(&config.install)),
        sync: Arc::new(SystemSync),
        rebooter: Arc::new(SystemRebooter::new(config.reboot.command.clone())),
        notifier: Arc::new(DesktopNotifier::new(config.notifications.clone())),
    };
    let orchestrator = SwitchOrchestrator::new(store.clone(), profile, collaborators)
        .with_lock_dir(&config.lock_dir)
        .with_sync_interval(config.sync.interval());

    let presenter: Arc<dyn Presenter> = match config.verify.presenter {
        PresenterKind::Terminal => Arc::new(TerminalPresenter),
        PresenterKind::Command => {
            Arc::new(CommandPresenter::new(config.verify.presenter_command.clone()))
        }
    };

    Engine::new(store, orchestrator, presenter, config.verify.timeout())
}

fn require_root(command: &str) -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("Must run as root: sudo gpuswitch {}", command);
    }
    Ok(())
}

fn cmd_detect(json: bool) -> Result<()> {
    let hw = HardwareInfo::detect(&SysfsRoot::system());
    if json {
        gpuswitch::output::print_hardware_json(&hw);
    } else {
        gpuswitch::output::print_hardware_summary(&hw);
    }
    Ok(())
}

fn cmd_list(config: &Config, json: bool) -> Result<()> {
    let profile = detect_profile();
    let engine = build_engine(config, profile);

    let solutions = match engine.list_solutions() {
        Ok(solutions) => solutions,
        Err(Error::UnsupportedHardware) => {
            println!("{}", UNSUPPORTED.yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let active = engine.active_solution()?;

    if json {
        gpuswitch::output::print_solutions_json(&solutions, active, &profile);
    } else {
        gpuswitch::output::print_solutions(&solutions, active, &profile);
        println!("  Run {} to switch.", "sudo gpuswitch switch <id>".cyan());
    }
    Ok(())
}

async fn cmd_switch(config: &Config, id: &str, yes: bool) -> Result<()> {
    require_root(&format!("switch {}", id))?;

    let profile = detect_profile();
    let engine = build_engine(config, profile);

    let Some(target) = gpuswitch::catalog::find(id) else {
        anyhow::bail!(
            "Unknown solution '{}'. Run `gpuswitch list` to see the options.",
            id
        );
    };

    println!("{} {}", "Switching to".bold(), target.name.cyan());
    if let Some(note) = target.risk_note {
        println!("  {}", note.yellow());
    }
    println!("  The system reboots when the switch is ready. After the reboot you will be asked");
    println!("  to confirm the new driver; without confirmation the previous one is restored.");

    if !yes {
        print!("Continue? [y/N] ");
        std::io::Write::flush(&mut std::io::stdout())?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let (mut control, monitor) = sync::channel();
    let spinner = tokio::spawn(show_sync_progress(monitor.clone()));
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            monitor.cancel();
        }
    });

    let result = engine.request_switch(id, &mut control).await;
    interrupt.abort();
    drop(control);
    let _ = spinner.await;

    match result {
        Ok(_) => {
            println!("{}", "Sync finished. Rebooting...".green().bold());
            Ok(())
        }
        Err(Error::SyncCancelled) => {
            println!(
                "{}",
                "Sync cancelled. No reboot was requested; the new driver will be verified after the next reboot."
                    .yellow()
            );
            Ok(())
        }
        Err(Error::UnsupportedHardware) => {
            println!("{}", UNSUPPORTED.yellow());
            Ok(())
        }
        Err(e @ Error::InstallFailed { .. }) => {
            eprintln!("{} {}", "Sorry, switch failed.".red().bold(), e);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// Spinner with elapsed time until the sync side goes away.
async fn show_sync_progress(mut monitor: SyncMonitor) {
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::new_spinner().with_style(style).with_message(
        "Syncing data to disk, taking about 5 to 10 minutes, when finished it will auto reboot.",
    );

    while let Some(progress) = monitor.changed().await {
        match progress {
            SyncProgress::Idle => {}
            SyncProgress::Running { .. } => bar.tick(),
            SyncProgress::Finished { .. } => break,
        }
    }
    bar.finish_and_clear();
}

async fn cmd_resume(config: &Config, json: bool) -> Result<()> {
    require_root("resume")?;

    let profile = detect_profile();
    let mut engine = build_engine(config, profile);
    let action = match engine.resume().await {
        Ok(action) => action,
        Err(Error::SwitchInProgress) => {
            println!("{}", "Another gpuswitch is already handling this switch.".yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        let output = match &action {
            StartupAction::Idle => serde_json::json!({ "action": "idle" }),
            StartupAction::Verified(VerificationOutcome::Committed(record)) => {
                serde_json::json!({ "action": "committed", "record": record })
            }
            StartupAction::Verified(VerificationOutcome::RolledBack { cause, rollback }) => {
                serde_json::json!({
                    "action": "rolled_back",
                    "cause": format!("{:?}", cause).to_lowercase(),
                    "reverse": match rollback {
                        RollbackOutcome::Reversed(record) => Some(record),
                        RollbackOutcome::AlreadyRolledBack => None,
                    },
                })
            }
            StartupAction::RollbackCompleted(record) => {
                serde_json::json!({ "action": "rollback_completed", "record": record })
            }
        };
        gpuswitch::output::print_json(&output);
        return Ok(());
    }

    match action {
        StartupAction::Idle => println!("{}", "No switch in progress.".dimmed()),
        StartupAction::Verified(VerificationOutcome::Committed(record)) => {
            println!("{}", "Switch confirmed.".green().bold());
            gpuswitch::output::print_record(&record);
        }
        StartupAction::Verified(VerificationOutcome::RolledBack { cause, rollback }) => {
            let why = match cause {
                RollbackCause::Rejected => "Switch cancelled.",
                RollbackCause::Timeout => "No confirmation received.",
                RollbackCause::Interrupted => "Previous verification did not finish.",
            };
            println!("{} Restoring the previous driver.", why.yellow().bold());
            if let RollbackOutcome::Reversed(record) = rollback {
                gpuswitch::output::print_record(&record);
            }
        }
        StartupAction::RollbackCompleted(record) => {
            println!("{}", "Previous driver restored.".green().bold());
            gpuswitch::output::print_record(&record);
        }
    }
    Ok(())
}

fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let store = StateStore::new(&config.state_dir);
    let report = gpuswitch::status::check(&store)?;

    if json {
        gpuswitch::output::print_status_json(&report);
    } else {
        gpuswitch::output::print_status(&report);
    }
    Ok(())
}
