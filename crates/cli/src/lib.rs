pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kommo_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "kommo",
    about = "Kommo agent operator CLI",
    long_about = "Inspect configuration, check readiness and list the tool catalog served to agents.",
    after_help = "Examples:\n  kommo doctor --json\n  kommo config\n  kommo tools"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read settings from this TOML file instead of kommo.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check CRM, spreadsheet and auth readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the tools exposed over MCP and HTTP")]
    Tools {
        #[arg(long, help = "Emit definitions with input schemas as JSON")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
        Command::Tools { json } => commands::tools::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
