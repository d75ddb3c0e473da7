use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gitswitch::account::handle_account_command;
use gitswitch::cli::{Cli, Commands};
use gitswitch::config::handle_config_command;
use gitswitch::hook::handle_hook_command;
use gitswitch::pattern::handle_pattern_command;
use gitswitch::project::{
    handle_clone_command, handle_context_command, handle_project_command, handle_status_command,
};
use gitswitch::version::{handle_doctor, show_version};

/// Environment variable holding the log filter (e.g. `GITSWITCH_LOG=debug`)
const LOG_ENV: &str = "GITSWITCH_LOG";

fn init_tracing() {
    // stdout carries command output (and `--json`), logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Account { action }) => handle_account_command(action),
        Some(Commands::Project { action }) => handle_project_command(action),
        Some(Commands::Context { action }) => handle_context_command(action),
        Some(Commands::Pattern { action }) => handle_pattern_command(action),
        Some(Commands::Clone { url, dir }) => handle_clone_command(url, dir),
        Some(Commands::Hook { action }) => handle_hook_command(action),
        Some(Commands::Config {
            enforcement,
            recency_days,
            auto_learn,
        }) => handle_config_command(enforcement, recency_days, auto_learn),
        Some(Commands::Status) => handle_status_command(),
        Some(Commands::Version) => {
            show_version();
            Ok(())
        }
        Some(Commands::Doctor) => handle_doctor(),
        None => {
            // If no args, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
