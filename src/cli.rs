use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gpuswitch",
    about = "Graphics driver switching with post-reboot verification and automatic rollback",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output as JSON instead of formatted tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Read configuration from this file instead of the system and user config
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log engine diagnostics to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show detected graphics hardware
    Detect,

    /// List the driver solutions available for this machine
    List,

    /// Switch to another driver solution and reboot
    Switch {
        /// Solution id, as shown by `gpuswitch list`
        solution: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Resolve a pending switch after reboot (run at boot)
    Resume,

    /// Show the current solution and the last switch
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (auto-detected if omitted)
        shell: Option<Shell>,
    },
}

/// Print shell completions to stdout.
pub fn print_completions(shell: Option<Shell>) {
    let shell = shell.or_else(Shell::from_env).unwrap_or_else(|| {
        eprintln!(
            "Could not detect shell. Specify one: gpuswitch completions bash|zsh|fish|elvish|powershell"
        );
        std::process::exit(1);
    });
    clap_complete::generate(
        shell,
        &mut Cli::command(),
        "gpuswitch",
        &mut std::io::stdout(),
    );
}
