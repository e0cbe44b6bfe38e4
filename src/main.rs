use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use db_sentinel::commands::{check, self_update, status};
use db_sentinel::errors::{MonitorError, EXIT_GENERIC};
use db_sentinel::logging;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "db-sentinel")]
#[command(about = "Cron-driven MySQL liveness monitor with Telegram alerting", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full monitoring pass (the cron entrypoint)
    Check,

    /// Show the last failure snapshot and recent restart history
    Status,

    /// Check the release location for a newer version and install it
    SelfUpdate,

    /// Generate shell completion script
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> ExitCode {
    logging::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check => check::execute(),
        Commands::Status => status::execute(),
        Commands::SelfUpdate => self_update::execute(),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "db-sentinel", &mut std::io::stdout());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            let code = err
                .downcast_ref::<MonitorError>()
                .map(MonitorError::exit_code)
                .unwrap_or(EXIT_GENERIC);
            ExitCode::from(code)
        }
    }
}
